use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// First page holding user data, pages 0-3 belong to the tag (UID, lock bytes, CC).
pub const FIRST_DATA_PAGE: u8 = 4;
/// Pages below this bound are read back and zeroed after a write.
pub const DEFAULT_END_PAGE: u8 = 40;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_POLLS: u32 = 20;

/// What to do when zeroing a stale page after a successful write fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EraseMode {
    /// Log the failure and report success anyway.
    #[default]
    BestEffort,
    /// Fail the write at the first page that could not be zeroed.
    Strict,
}

impl FromStr for EraseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best-effort" | "best_effort" => Ok(EraseMode::BestEffort),
            "strict" => Ok(EraseMode::Strict),
            other => Err(format!("unknown erase mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Timeout handed to each presence poll.
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub first_page: u8,
    /// Exclusive upper bound for reads and stale-page erasure.
    pub end_page: u8,
    pub erase_mode: EraseMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
            first_page: FIRST_DATA_PAGE,
            end_page: DEFAULT_END_PAGE,
            erase_mode: EraseMode::default(),
        }
    }
}

impl SessionConfig {
    /// Reads `TAGPAY_POLL_INTERVAL_MS`, `TAGPAY_MAX_POLLS`, `TAGPAY_END_PAGE`
    /// and `TAGPAY_ERASE_MODE`, falling back to the defaults for anything
    /// unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let poll_interval = parse_var(&lookup, "TAGPAY_POLL_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);
        let max_polls = parse_var(&lookup, "TAGPAY_MAX_POLLS")
            .filter(|polls: &u32| *polls > 0)
            .unwrap_or(defaults.max_polls);
        let end_page = parse_var(&lookup, "TAGPAY_END_PAGE")
            .filter(|page: &u8| *page > defaults.first_page)
            .unwrap_or(defaults.end_page);
        let erase_mode = parse_var(&lookup, "TAGPAY_ERASE_MODE").unwrap_or(defaults.erase_mode);

        Self {
            poll_interval,
            max_polls,
            end_page,
            erase_mode,
            ..defaults
        }
    }

    /// Number of pages a record may occupy.
    pub fn data_pages(&self) -> usize {
        usize::from(self.end_page.saturating_sub(self.first_page))
    }
}

/// Parses `key` through `lookup`, logging and dropping values that don't parse.
pub fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {}={:?}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_kiosk_timing() {
        let config = SessionConfig::from_lookup(lookup(&[]));
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.max_polls, 20);
        assert_eq!(config.data_pages(), 36);
    }

    #[test]
    fn overrides_are_applied() {
        let config = SessionConfig::from_lookup(lookup(&[
            ("TAGPAY_POLL_INTERVAL_MS", "100"),
            ("TAGPAY_MAX_POLLS", "3"),
            ("TAGPAY_END_PAGE", "130"),
            ("TAGPAY_ERASE_MODE", "Strict"),
        ]));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.max_polls, 3);
        assert_eq!(config.end_page, 130);
        assert_eq!(config.erase_mode, EraseMode::Strict);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = SessionConfig::from_lookup(lookup(&[
            ("TAGPAY_MAX_POLLS", "0"),
            ("TAGPAY_END_PAGE", "2"),
            ("TAGPAY_ERASE_MODE", "sometimes"),
            ("TAGPAY_POLL_INTERVAL_MS", "soon"),
        ]));
        assert_eq!(config, SessionConfig::default());
    }
}
