//! Engine configuration.

/// How much of an error [`CoreError::report`](crate::CoreError::report)
/// renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorDetail {
    /// Only the stable code, e.g. `E201`.
    Code,
    /// Code and top-level message.
    #[default]
    Message,
    /// Code, message, and the whole cause chain.
    Full,
}

/// Configuration for transactions and models.
///
/// Passed at construction; nothing in the engine reads global settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Savepoint set before every database step.
    pub savepoint_name: String,

    /// Whether steps are isolated with savepoints at all.
    pub use_savepoints: bool,

    /// Whether a model re-selects after insert/update/delete.
    pub auto_select: bool,

    /// Detail level for rendered errors.
    pub error_detail: ErrorDetail,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            savepoint_name: "currentQuery".to_string(),
            use_savepoints: true,
            auto_select: true,
            error_detail: ErrorDetail::Message,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-step savepoint name.
    #[must_use]
    pub fn savepoint_name(mut self, name: impl Into<String>) -> Self {
        self.savepoint_name = name.into();
        self
    }

    /// Sets whether steps are isolated with savepoints.
    #[must_use]
    pub const fn use_savepoints(mut self, value: bool) -> Self {
        self.use_savepoints = value;
        self
    }

    /// Sets whether models re-select after data changes.
    #[must_use]
    pub const fn auto_select(mut self, value: bool) -> Self {
        self.auto_select = value;
        self
    }

    /// Sets the error detail level.
    #[must_use]
    pub const fn error_detail(mut self, detail: ErrorDetail) -> Self {
        self.error_detail = detail;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.savepoint_name, "currentQuery");
        assert!(config.use_savepoints);
        assert!(config.auto_select);
        assert_eq!(config.error_detail, ErrorDetail::Message);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .savepoint_name("step")
            .use_savepoints(false)
            .auto_select(false)
            .error_detail(ErrorDetail::Full);

        assert_eq!(config.savepoint_name, "step");
        assert!(!config.use_savepoints);
        assert!(!config.auto_select);
        assert_eq!(config.error_detail, ErrorDetail::Full);
    }
}
