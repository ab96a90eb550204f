/// Units which are simply type aliases for `f32` rather than having an
/// implementation as a `uom` `Quantity`.
///
/// These are used in the inner loops of filtering and backprojection, and in
/// data which is shipped verbatim to the GPU, where a bare `f32` in
/// millimetres is what the hardware wants to see. The aliases are still
/// worth having as clues to what the numbers represent.

pub type Lengthf32    = f32; // millimetres
pub type Anglef32     = f32; // radians
pub type Ratiof32     = f32;
pub type Weightf32    = f32;
pub type Intensityf32 = f32;
