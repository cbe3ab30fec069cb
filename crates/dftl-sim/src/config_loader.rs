//! Loads a `DftlConfig` from a TOML file, using the idiom already present
//! elsewhere in the stack: serde structs deserialized via the `toml` crate.

use std::path::Path;

use anyhow::{Context, Result};
use dftl_core::DftlConfig;

pub async fn load(path: impl AsRef<Path>) -> Result<DftlConfig> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config file: {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_partial_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dftl.toml");
        tokio::fs::write(
            &path,
            r#"
            n_channels_per_dev = 4
            n_blocks_per_channel = 32
            n_pages_per_block = 64
            page_size = 4096
            max_cmt_bytes = 8192
            "#,
        )
        .await
        .unwrap();

        let cfg = load(&path).await.unwrap();
        assert_eq!(cfg.n_channels_per_dev, 4);
        assert_eq!(cfg.sector_size, 512);
        assert_eq!(cfg.over_provisioning, 1.28);
    }
}
