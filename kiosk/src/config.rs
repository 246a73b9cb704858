use std::path::PathBuf;
use std::time::Duration;

use tagpay_shared::SessionConfig;
use tagpay_shared::settings::parse_var;

const DEFAULT_MESSAGE_HOLD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct Config {
    pub session: SessionConfig,
    /// Memory image of the simulated tag.
    pub tag_image: PathBuf,
    /// How long a status message stays up before the next screen.
    pub message_hold: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let tag_image = lookup("TAGPAY_TAG_IMAGE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("tag.bin"));
        let message_hold = parse_var(&lookup, "TAGPAY_MESSAGE_HOLD_MS")
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_MESSAGE_HOLD);

        Self {
            session: SessionConfig::from_lookup(&lookup),
            tag_image,
            message_hold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key: &str| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config.tag_image, PathBuf::from("tag.bin"));
        assert_eq!(config.message_hold, DEFAULT_MESSAGE_HOLD);
        assert_eq!(config.session, SessionConfig::default());
    }

    #[test]
    fn hold_time_from_env() {
        let config = Config::from_lookup(lookup(&[
            ("TAGPAY_MESSAGE_HOLD_MS", "250"),
            ("TAGPAY_TAG_IMAGE", "/tmp/kiosk.bin"),
        ]));
        assert_eq!(config.message_hold, Duration::from_millis(250));
        assert_eq!(config.tag_image, PathBuf::from("/tmp/kiosk.bin"));
    }

    #[test]
    fn bad_hold_time_falls_back() {
        let config = Config::from_lookup(lookup(&[("TAGPAY_MESSAGE_HOLD_MS", "soon")]));
        assert_eq!(config.message_hold, DEFAULT_MESSAGE_HOLD);
    }
}
