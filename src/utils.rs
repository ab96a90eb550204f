use std::fmt::Display;
use std::str::FromStr;

/// Parse `"x,y,z"` into three values, as used by CLI options such as
/// `--volume 128,128,64`.
pub fn parse_triplet<T>(s: &str) -> Result<[T; 3], String>
where
    T: FromStr,
    <T as FromStr>::Err: Display,
{
    let v = s.split(',').map(str::trim).collect::<Vec<_>>();
    if v.len() != 3 {
        return Err(format!("expected three comma-separated values, got `{s}`"));
    }
    let parse = |x: &str| x.parse::<T>().map_err(|e| format!("`{x}`: {e}"));
    Ok([parse(v[0])?, parse(v[1])?, parse(v[2])?])
}

/// Group numeric digits to facilitate reading long numbers
pub fn group_digits<F: Display>(n: F) -> String {
    use numsep::{separate, Locale};
    separate(n, Locale::English)
}


pub mod timing {

    use super::group_digits;
    use std::time::{Duration, Instant};
    use std::io::Write;

    /// Wall-clock report of the stages of a reconstruction run.
    pub struct Progress {
        stage: Instant,
        run: Instant,
    }

    impl Progress {

        #[allow(clippy::new_without_default)]
        pub fn new() -> Self {
            let now = Instant::now();
            Self { stage: now, run: now }
        }

        /// Announce a stage, leaving the line open for its timing.
        pub fn start(&mut self, stage: &str) {
            print!("{stage} ... ");
            std::io::stdout().flush().ok();
            self.stage = Instant::now();
        }

        pub fn done(&mut self) { println!("{}", self.lap()) }

        pub fn done_with_message(&mut self, message: &str) { println!("{message}: {}", self.lap()) }

        /// Time since the run began
        pub fn total(&self) -> String { milliseconds(self.run.elapsed()) }

        fn lap(&mut self) -> String {
            let elapsed = milliseconds(self.stage.elapsed());
            self.stage = Instant::now();
            elapsed
        }
    }

    pub(super) fn milliseconds(t: Duration) -> String { format!("{} ms", group_digits(t.as_millis())) }
}
