//! Node configuration: YAML in, validated [`NodeConfig`] out.
//!
//! Unknown keys anywhere in the document are rejected, then every section is
//! range-checked. Both failures surface as `WireError::BadRequest`.

pub mod schema;

use std::path::Path;

use wirecall_core::error::{Result, WireError};

pub use schema::{GatewaySection, NodeConfig, RequesterConfig, ResponderConfig};

pub fn load_from_file(path: impl AsRef<Path>) -> Result<NodeConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| WireError::Internal(format!("cannot read {}: {e}", path.display())))?;
    let cfg = load_from_str(&text)?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(cfg)
}

pub fn load_from_str(text: &str) -> Result<NodeConfig> {
    let cfg = serde_yaml::from_str::<NodeConfig>(text)
        .map_err(|e| WireError::BadRequest(format!("config: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
