pub mod monitor;
pub mod stats;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

use heapscope_core::{ConfigError, MonitorConfig, ReaderExit, RegressionPolicy};

/// Transport name that selects standard input.
pub const STDIN_TRANSPORT: &str = "-";

/// A line-oriented byte source the reader thread can own.
pub type Transport = Box<dyn BufRead + Send>;

/// Open the transport named on the command line.
///
/// Device nodes and FIFOs are opened like regular files; the line discipline
/// (speed, raw mode) must already be configured.
pub fn open_transport(name: &str) -> io::Result<Transport> {
    if name == STDIN_TRANSPORT {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(name)?;
    Ok(Box::new(BufReader::new(file)))
}

/// Build and validate the monitor configuration from CLI values.
pub fn build_config(
    total_heap: u64,
    interval_ms: u64,
    tick_rate: u32,
    on_reset: &str,
) -> Result<MonitorConfig, ConfigError> {
    let config = MonitorConfig {
        total_heap_bytes: total_heap,
        render_interval: Duration::from_millis(interval_ms),
        tick_rate_hz: tick_rate,
        regression_policy: on_reset.parse::<RegressionPolicy>()?,
    };
    config.validate()?;
    Ok(config)
}

/// Same as [`build_config`], printing the error and exiting on failure.
pub fn config_or_exit(
    total_heap: u64,
    interval_ms: u64,
    tick_rate: u32,
    on_reset: &str,
) -> MonitorConfig {
    match build_config(total_heap, interval_ms, tick_rate, on_reset) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    }
}

/// Open the transport, printing the error and exiting on failure.
pub fn transport_or_exit(name: &str) -> Transport {
    match open_transport(name) {
        Ok(transport) => transport,
        Err(e) => {
            eprintln!("Cannot open transport {name}: {e}");
            std::process::exit(1);
        }
    }
}

/// Process exit status for a finished run: 1 when the transport failed.
pub fn exit_code(exit: Option<&ReaderExit>) -> i32 {
    i32::from(exit.is_some_and(ReaderExit::is_fault))
}

/// Exit non-zero if the reader stopped on a transport fault.
pub fn exit_on_fault(exit: Option<&ReaderExit>) {
    let code = exit_code(exit);
    if code != 0 {
        std::process::exit(code);
    }
}

/// Set up `env_logger` (`RUST_LOG`, default `warn`).
///
/// With `quiet_terminal`, nothing may reach stderr while the dashboard owns
/// the screen: logs go to `log_file` if given and are dropped otherwise.
pub fn init_logging(log_file: Option<&Path>, quiet_terminal: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));

    match log_file {
        Some(path) => match File::create(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!("Cannot create log file {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None if quiet_terminal => {
            builder.filter_level(log::LevelFilter::Off);
        }
        None => {}
    }

    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // -----------------------------------------------------------------------
    // build_config
    // -----------------------------------------------------------------------

    #[test]
    fn build_config_from_cli_defaults() {
        let config = build_config(131_072, 10, 100_000, "new-session").unwrap();
        assert_eq!(config, MonitorConfig::default());
    }

    #[test]
    fn build_config_continue_policy() {
        let config = build_config(65_536, 25, 1_000, "continue").unwrap();
        assert_eq!(config.regression_policy, RegressionPolicy::Continue);
        assert_eq!(config.render_interval, Duration::from_millis(25));
        assert_eq!(config.total_heap_bytes, 65_536);
    }

    #[test]
    fn build_config_rejects_zero_values() {
        assert_eq!(
            build_config(0, 10, 100_000, "new-session"),
            Err(ConfigError::ZeroHeapSize)
        );
        assert_eq!(
            build_config(1024, 0, 100_000, "new-session"),
            Err(ConfigError::ZeroRenderInterval)
        );
    }

    #[test]
    fn build_config_rejects_unknown_policy() {
        assert!(matches!(
            build_config(1024, 10, 100_000, "explode"),
            Err(ConfigError::UnknownRegressionPolicy(_))
        ));
    }

    // -----------------------------------------------------------------------
    // exit_code
    // -----------------------------------------------------------------------

    #[test]
    fn exit_code_is_nonzero_only_for_faults() {
        use heapscope_core::TransportFault;

        assert_eq!(exit_code(None), 0);
        assert_eq!(exit_code(Some(&ReaderExit::EndOfStream)), 0);
        assert_eq!(exit_code(Some(&ReaderExit::Stopped)), 0);
        let fault = ReaderExit::Fault(TransportFault {
            kind: io::ErrorKind::NotConnected,
            message: "device disconnected".to_string(),
        });
        assert_eq!(exit_code(Some(&fault)), 1);
    }

    // -----------------------------------------------------------------------
    // open_transport
    // -----------------------------------------------------------------------

    #[test]
    fn open_transport_reads_capture_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "first").unwrap();
        writeln!(file, "second").unwrap();
        file.flush().unwrap();

        let transport = open_transport(file.path().to_str().unwrap()).unwrap();
        let lines: Vec<String> = transport.lines().map(Result::unwrap).collect();
        assert_eq!(lines, vec!["first", "second"]);
    }

    #[test]
    fn open_transport_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-device");
        let err = open_transport(missing.to_str().unwrap()).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
