use std::path::PathBuf;

use tagpay_shared::SessionConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    /// Memory image of the simulated tag.
    pub tag_image: PathBuf,
    pub session: SessionConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_address: std::env::var("TAGPAY_BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            tag_image: std::env::var("TAGPAY_TAG_IMAGE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("tag.bin")),
            session: SessionConfig::from_env(),
        }
    }
}
