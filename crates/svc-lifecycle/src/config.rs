//! Static orchestrator configuration, loaded the way the rest of the pack
//! loads its own settings: layered `config::Config` sources deserialized into
//! a typed struct via `serde`. Entirely optional — nothing in this crate
//! requires a `LifespanConfig` to exist; it's a convenience for binaries that
//! want their shutdown behavior tunable from the environment or a file
//! without hand-rolling the plumbing.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifespanConfig {
    /// Whether a bring-up failure tears back down what already succeeded.
    pub rollback_on_failure: bool,
    /// How long `run_until_signal` waits for cooperative tear-down to finish
    /// before logging a warning (purely diagnostic; nothing is forcibly killed).
    pub shutdown_warn_after_secs: u64,
}

impl Default for LifespanConfig {
    fn default() -> Self {
        Self { rollback_on_failure: true, shutdown_warn_after_secs: 30 }
    }
}

impl LifespanConfig {
    pub fn shutdown_warn_after(&self) -> Duration {
        Duration::from_secs(self.shutdown_warn_after_secs)
    }

    /// Load from `{prefix}_ROLLBACK_ON_FAILURE` / `{prefix}_SHUTDOWN_WARN_AFTER_SECS`
    /// style environment variables, falling back to [`Default::default`] for
    /// anything unset.
    pub fn from_env(prefix: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::Environment::with_prefix(prefix).separator("_"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_rollback() {
        let cfg = LifespanConfig::default();
        assert!(cfg.rollback_on_failure);
        assert_eq!(cfg.shutdown_warn_after(), Duration::from_secs(30));
    }
}
