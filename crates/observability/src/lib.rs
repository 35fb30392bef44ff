//! Process-wide logging setup shared by the binaries.

/// Log output selection and subscriber installation.
pub mod tracing;

pub use self::tracing::LogFormat;

/// Initialize process-wide tracing, format chosen by `WHOLESALE_LOG_FORMAT`.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    self::tracing::init(LogFormat::from_env());
}
