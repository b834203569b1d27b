//! Logger setup shared by the terminal and desktop entry points.
//!
//! `RUST_LOG` wins when set; otherwise `info`, or `debug` with `verbose`, which
//! also prints every fired sequencer cue.

use env_logger::{Builder, Env};
use log::LevelFilter;

pub fn default_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Safe to call more than once; later calls are ignored.
pub fn init(verbose: bool) {
    let level = default_level(verbose).to_string().to_lowercase();
    let _ = Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_lowers_the_default_level() {
        assert_eq!(default_level(false), LevelFilter::Info);
        assert_eq!(default_level(true), LevelFilter::Debug);
    }

    #[test]
    fn init_twice_does_not_panic() {
        init(false);
        init(true);
    }
}
