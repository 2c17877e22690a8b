//! Coordinator configuration.

/// Default XA format id for identifiers generated by this coordinator.
pub const DEFAULT_FORMAT_ID: i32 = 0x4754_5831;

/// Configuration for a [`TransactionManager`](crate::TransactionManager).
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Format id stamped on generated transaction identifiers.
    pub format_id: i32,

    /// Whether transactions ending in `Unknown` are retained for recovery.
    pub retain_in_doubt: bool,

    /// Maximum number of in-doubt transactions retained (0 = unbounded).
    /// The oldest entry is evicted when the limit is reached.
    pub max_in_doubt: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            format_id: DEFAULT_FORMAT_ID,
            retain_in_doubt: true,
            max_in_doubt: 1024,
        }
    }
}

impl CoordinatorConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the format id for generated identifiers.
    #[must_use]
    pub const fn format_id(mut self, value: i32) -> Self {
        self.format_id = value;
        self
    }

    /// Sets whether in-doubt transactions are retained.
    #[must_use]
    pub const fn retain_in_doubt(mut self, value: bool) -> Self {
        self.retain_in_doubt = value;
        self
    }

    /// Sets the in-doubt retention limit.
    #[must_use]
    pub const fn max_in_doubt(mut self, value: usize) -> Self {
        self.max_in_doubt = value;
        self
    }
}
