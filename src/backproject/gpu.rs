//! Backprojection on a GPU via wgpu compute shaders.
//!
//! The tomogram lives in a device storage buffer for the whole
//! reconstruction. For each angle the (host-filtered) projection and the
//! rotation are uploaded and one thread per voxel adds its contribution; the
//! result is copied back once, at the end. Every device operation runs inside
//! an error scope, and any failure is reported as `Error::Device`.

use wgpu::util::DeviceExt;

use crate::error::{Error, Result};
use crate::geometry::{projection_angle, ConeBeam, Geometry};
use crate::index::BoxDim_u;
use crate::volume::Volume;

use super::Backprojector;

const SHADER: &str = include_str!("backproject.wgsl");
const WORKGROUP: [u32; 3] = [8, 8, 4];

/// Uniform block of `backproject.wgsl`: every member is 16 bytes wide.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Params {
    volume: [u32; 4],
    detector: [u32; 4],
    pixel: [f32; 4],
    centre: [f32; 4],
    source: [f32; 4],
}

impl Params {
    fn new(cb: &ConeBeam, [nx, ny, nz]: BoxDim_u, [w, h]: [usize; 2], theta: f32) -> Self {
        let (sin, cos) = theta.sin_cos();
        let [cx, cy, cz] = cb.centre;
        Self {
            volume:   [nx as u32, ny as u32, nz as u32, 0],
            detector: [w as u32, h as u32, 0, 0],
            pixel:    [cb.pixel_size[0], cb.pixel_size[1], cb.detector[0], cb.detector[1]],
            centre:   [cx, cy, cz, cb.voxel_size],
            source:   [cb.sod, cb.sdd, cos, sin],
        }
    }
}

pub struct Gpu {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

pub struct Accumulator {
    tomogram: wgpu::Buffer,
    projection: wgpu::Buffer,
    params: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    size: BoxDim_u,
    detector: [usize; 2],
    cone_beam: ConeBeam,
    n_projections: usize,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl Gpu {

    /// Acquire the default adapter and compile the backprojection kernel.
    pub fn new() -> Result<Self> { pollster::block_on(Self::new_async()) }

    async fn new_async() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                ..Default::default()
            })
            .await
            .ok_or_else(|| Error::Device("no compatible GPU adapter found".into()))?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("cbct.device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                ..Default::default()
            }, None)
            .await
            .map_err(|e| Error::Device(format!("failed to request device: {e}")))?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cbct.backproject.layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("cbct.backproject.pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("cbct.backproject.shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("cbct.backproject.pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("backproject"),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(e) = device.pop_error_scope().await {
            return Err(Error::Device(format!("building backprojection pipeline: {e}")));
        }
        Ok(Self { device, queue, pipeline, layout })
    }

    /// Run `f`, turning any validation or out-of-memory error it provokes on
    /// the device into `Error::Device`.
    fn scoped<T>(&self, what: &str, f: impl FnOnce() -> T) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let validation = pollster::block_on(self.device.pop_error_scope());
        let memory     = pollster::block_on(self.device.pop_error_scope());
        match validation.or(memory) {
            None    => Ok(value),
            Some(e) => Err(Error::Device(format!("{what}: {e}"))),
        }
    }
}

impl Backprojector for Gpu {
    type Accumulator = Accumulator;

    fn start(&self, geometry: &Geometry, n_projections: usize) -> Result<Accumulator> {
        if n_projections == 0 { return Err(Error::NoProjections) }
        let size = geometry.volume();
        let detector = geometry.detector();
        let cone_beam = geometry.cone_beam();
        let f32_bytes = std::mem::size_of::<f32>() as wgpu::BufferAddress;
        let tomogram_bytes   = (size.iter().product::<usize>()) as wgpu::BufferAddress * f32_bytes;
        let projection_bytes = (detector[0] * detector[1])      as wgpu::BufferAddress * f32_bytes;

        self.scoped("allocating tomogram", || {
            // Freshly created buffers are zero-filled
            let tomogram = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("cbct.tomogram"),
                size: tomogram_bytes,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            });
            let projection = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("cbct.projection"),
                size: projection_bytes,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let params = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("cbct.params"),
                contents: bytemuck::bytes_of(&Params::new(&cone_beam, size, detector, 0.0)),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("cbct.backproject.bind_group"),
                layout: &self.layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: projection.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: tomogram  .as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: params    .as_entire_binding() },
                ],
            });
            Accumulator { tomogram, projection, params, bind_group, size, detector, cone_beam, n_projections }
        })
    }

    fn accumulate(&self, state: &mut Accumulator, index: usize, projection: &[f32]) -> Result<()> {
        let [w, h] = state.detector;
        if projection.len() != w * h {
            return Err(Error::Shape { size: [w, h, 1], expected: w * h, found: projection.len() });
        }
        let theta = projection_angle(index, state.n_projections);
        let params = Params::new(&state.cone_beam, state.size, state.detector, theta);
        let [nx, ny, nz] = state.size;
        let groups = |n: usize, g: u32| (n as u32).div_ceil(g);

        self.scoped("backprojecting", || {
            self.queue.write_buffer(&state.projection, 0, bytemuck::cast_slice(projection));
            self.queue.write_buffer(&state.params, 0, bytemuck::bytes_of(&params));
            let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("cbct.backproject.encoder"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor::default());
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &state.bind_group, &[]);
                pass.dispatch_workgroups(groups(nx, WORKGROUP[0]), groups(ny, WORKGROUP[1]), groups(nz, WORKGROUP[2]));
            }
            self.queue.submit(Some(encoder.finish()));
            let _ = self.device.poll(wgpu::Maintain::Wait);
        })
    }

    fn finish(&self, state: Accumulator) -> Result<Volume<f32>> {
        let bytes = state.tomogram.size();
        let staging = self.scoped("reading back tomogram", || {
            let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("cbct.staging"),
                size: bytes,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("cbct.readback.encoder"),
            });
            encoder.copy_buffer_to_buffer(&state.tomogram, 0, &staging, 0, bytes);
            self.queue.submit(Some(encoder.finish()));
            staging
        })?;

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |mapped| { let _ = sender.send(mapped); });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        receiver.recv()
            .map_err(|e| Error::Device(format!("reading back tomogram: {e}")))?
            .map_err(|e| Error::Device(format!("reading back tomogram: {e}")))?;

        let view = slice.get_mapped_range();
        let data: Vec<f32> = bytemuck::cast_slice(&view[..]).to_vec();
        drop(view);
        staging.unmap();

        let mut tomogram = Volume::from_vec(state.size, data)?;
        let n = state.n_projections as f32;
        tomogram.for_each(|v| v / n);
        Ok(tomogram)
    }
}
