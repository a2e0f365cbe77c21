use crate::util::hex::format_hex_pretty;
use log::{debug, error, info, log_enabled, trace, warn, Level};

/// Initializes the logger with the `env_logger` crate.
///
/// The filter is read from `RUST_LOG`. Calling it again is a no-op, so tests
/// may call it freely.
pub fn init_logger() {
    let _ = env_logger::try_init();
}

/// Logs an error message.
pub fn log_error(message: &str) {
    if log_enabled!(Level::Error) {
        error!("{message}");
    }
}

/// Logs a warning message.
pub fn log_warn(message: &str) {
    if log_enabled!(Level::Warn) {
        warn!("{message}");
    }
}

/// Logs an informational message.
pub fn log_info(message: &str) {
    if log_enabled!(Level::Info) {
        info!("{message}");
    }
}

/// Logs a debug message.
pub fn log_debug(message: &str) {
    if log_enabled!(Level::Debug) {
        debug!("{message}");
    }
}

/// Traces a frame as dotted hex, e.g. `M-Bus received: 68.08.08.68 ... (14)`.
pub fn log_frame(direction: &str, bytes: &[u8]) {
    if log_enabled!(Level::Trace) {
        trace!("{direction}: {}", format_hex_pretty(bytes));
    }
}
