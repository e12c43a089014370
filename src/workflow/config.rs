use std::time::Duration;

const DEFAULT_ENTRY_TTL_SECONDS: u64 = 24 * 60 * 60;

#[derive(Clone, Copy, Debug)]
pub struct WorkflowConfig {
    entry_ttl: Duration,
}

impl WorkflowConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entry_ttl: Duration::from_secs(DEFAULT_ENTRY_TTL_SECONDS),
        }
    }

    /// Lifetime of a verification entry; zero keeps entries until they are resolved.
    #[must_use]
    pub fn with_entry_ttl_seconds(mut self, seconds: u64) -> Self {
        self.entry_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn entry_ttl(&self) -> Option<Duration> {
        if self.entry_ttl.is_zero() {
            None
        } else {
            Some(self.entry_ttl)
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_config_defaults_and_overrides() {
        let config = WorkflowConfig::new();
        assert_eq!(
            config.entry_ttl(),
            Some(Duration::from_secs(DEFAULT_ENTRY_TTL_SECONDS))
        );

        let config = config.with_entry_ttl_seconds(90);
        assert_eq!(config.entry_ttl(), Some(Duration::from_secs(90)));

        let config = config.with_entry_ttl_seconds(0);
        assert_eq!(config.entry_ttl(), None);
    }
}
