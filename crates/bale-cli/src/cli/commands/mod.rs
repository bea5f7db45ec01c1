pub mod build;
pub mod cert;
pub mod dispatch;
pub mod verify;

pub use dispatch::dispatch;

use std::path::PathBuf;

use bale_core::{BaleConfig, TrustStore};

/// Environment configuration with an explicit trust directory layered on top.
pub(crate) fn load_config(trust_dir: Option<PathBuf>) -> BaleConfig {
    let config = BaleConfig::from_env();
    match trust_dir {
        Some(dir) => config.with_trust_dir(dir),
        None => config,
    }
}

/// Open the trust store, preferring an explicit directory over the environment.
pub(crate) fn open_trust_store(dir: Option<PathBuf>) -> anyhow::Result<TrustStore> {
    Ok(load_config(dir).open_trust_store()?)
}
