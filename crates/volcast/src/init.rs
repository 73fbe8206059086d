//! Logging setup.

/// Installs `env_logger` as the `log` backend.
///
/// Honors `RUST_LOG`. Calling it again, or after another logger was
/// installed, does nothing.
pub fn init_logging() {
    if env_logger::try_init().is_ok() {
        log::debug!("volcast logging initialized");
    }
}
