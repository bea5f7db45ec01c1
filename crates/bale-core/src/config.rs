//! Environment-driven configuration.

use std::path::PathBuf;

use tracing::warn;

use crate::build::BuildOptions;
use crate::error::TrustError;
use crate::trust::TrustStore;
use crate::verify::SecurityPolicy;

pub const ENV_TRUST_DIR: &str = "BALE_TRUST_DIR";
pub const ENV_SECURITY_POLICY: &str = "BALE_SECURITY_POLICY";
pub const ENV_OUTPUT_DIR: &str = "BALE_OUTPUT_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaleConfig {
    /// Trust store directory; `None` means [`TrustStore::default_dir`].
    pub trust_dir: Option<PathBuf>,
    pub security_policy: SecurityPolicy,
    pub output_dir: PathBuf,
}

impl Default for BaleConfig {
    fn default() -> Self {
        Self {
            trust_dir: None,
            security_policy: SecurityPolicy::default(),
            output_dir: PathBuf::from("."),
        }
    }
}

impl BaleConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `BALE_TRUST_DIR` | Trust store directory |
    /// | `BALE_SECURITY_POLICY` | `no`, `almost-no`, `low`, `medium` or `high` |
    /// | `BALE_OUTPUT_DIR` | Directory archives are written to |
    ///
    /// An unrecognized policy name falls back to `high`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            trust_dir: non_empty_var(ENV_TRUST_DIR).map(PathBuf::from),
            security_policy: non_empty_var(ENV_SECURITY_POLICY)
                .and_then(|v| match v.parse() {
                    Ok(policy) => Some(policy),
                    Err(e) => {
                        warn!(error = %e, "ignoring {ENV_SECURITY_POLICY}");
                        None
                    }
                })
                .unwrap_or(defaults.security_policy),
            output_dir: non_empty_var(ENV_OUTPUT_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
        }
    }

    pub fn with_trust_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.trust_dir = Some(dir.into());
        self
    }

    pub fn with_security_policy(mut self, policy: SecurityPolicy) -> Self {
        self.security_policy = policy;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn trust_dir(&self) -> Result<PathBuf, TrustError> {
        match &self.trust_dir {
            Some(dir) => Ok(dir.clone()),
            None => TrustStore::default_dir(),
        }
    }

    pub fn open_trust_store(&self) -> Result<TrustStore, TrustError> {
        TrustStore::open(self.trust_dir()?)
    }

    pub fn build_options(&self, force: bool) -> BuildOptions {
        BuildOptions::new(&self.output_dir).with_force(force)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear() {
        for var in [ENV_TRUST_DIR, ENV_SECURITY_POLICY, ENV_OUTPUT_DIR] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        clear();
        let config = BaleConfig::from_env();
        assert_eq!(config, BaleConfig::default());
        assert_eq!(config.security_policy, SecurityPolicy::HIGH);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear();
        std::env::set_var(ENV_TRUST_DIR, "/tmp/bale-trust");
        std::env::set_var(ENV_SECURITY_POLICY, "medium");
        std::env::set_var(ENV_OUTPUT_DIR, "pkg");

        let config = BaleConfig::from_env();
        assert_eq!(config.trust_dir().unwrap(), PathBuf::from("/tmp/bale-trust"));
        assert_eq!(config.security_policy, SecurityPolicy::MEDIUM);
        assert_eq!(config.build_options(true).output_dir, PathBuf::from("pkg"));
        clear();
    }

    #[test]
    #[serial]
    fn test_unknown_policy_falls_back_to_high() {
        clear();
        std::env::set_var(ENV_SECURITY_POLICY, "lenient");
        assert_eq!(BaleConfig::from_env().security_policy, SecurityPolicy::HIGH);
        clear();
    }

    #[test]
    fn test_builders() {
        let config = BaleConfig::default()
            .with_trust_dir("/trust")
            .with_security_policy(SecurityPolicy::LOW)
            .with_output_dir("out");
        assert_eq!(config.trust_dir, Some(PathBuf::from("/trust")));
        assert_eq!(config.security_policy, SecurityPolicy::LOW);
        assert_eq!(config.output_dir, PathBuf::from("out"));
    }
}
