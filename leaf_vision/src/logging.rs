use flexi_logger::{FlexiLoggerError, Logger, LoggerHandle};

/// Starts stdout logging. `RUST_LOG` wins over `base_level` when set. Keep the
/// returned handle alive for the life of the program.
pub fn setup_logging(base_level: &str) -> Result<LoggerHandle, FlexiLoggerError> {
    Logger::try_with_env_or_str(base_level)?
        .log_to_stdout()
        .format(flexi_logger::default_format)
        .start()
}
