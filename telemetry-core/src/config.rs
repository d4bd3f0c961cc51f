//! Configuration file reader. The on-disk format is the literal key=value
//! format of the original resolver's config file: one `KEY=value` per line,
//! `#`-prefixed comments, blank lines ignored. Not a job for a generic
//! format crate — there's nothing here a hand-rolled parser doesn't do in
//! five lines.

use crate::model::PrivacyLevel;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryLogShow {
    All,
    PermittedOnly,
    BlockedOnly,
    Nothing,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub privacy_level: PrivacyLevel,
    pub max_log_age_secs: i64,
    pub db_interval_secs: u64,
    pub max_db_days: u32,
    pub db_file: Option<String>,
    pub ignore_localhost: bool,
    pub aaaa_query_analysis: bool,
    pub api_exclude_domains: Vec<String>,
    pub api_exclude_clients: Vec<String>,
    pub api_query_log_show: QueryLogShow,
    /// REDESIGN FLAG (spec.md §9b): the reference resolver hardcodes the
    /// forward-destinations cap at 8 with no rationale recorded. We keep
    /// the cap but expose it here as configuration.
    pub forward_dest_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            privacy_level: PrivacyLevel::None,
            max_log_age_secs: 86_400,
            db_interval_secs: 60,
            max_db_days: 365,
            db_file: Some("telemetry.db".to_string()),
            ignore_localhost: false,
            aaaa_query_analysis: true,
            api_exclude_domains: Vec::new(),
            api_exclude_clients: Vec::new(),
            api_query_log_show: QueryLogShow::All,
            forward_dest_cap: 8,
        }
    }
}

impl EngineConfig {
    pub fn from_str(text: &str) -> Self {
        let mut cfg = Self::default();
        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            cfg.apply(key.trim(), value.trim());
        }
        cfg
    }

    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_str(&text))
    }

    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "PRIVACY_LEVEL" => {
                if let Ok(n) = value.parse::<u8>() {
                    self.privacy_level = PrivacyLevel::from_config(n);
                }
            }
            "MAXLOGAGE" => {
                if let Ok(n) = value.parse() {
                    self.max_log_age_secs = n;
                }
            }
            "DBINTERVAL" => {
                if let Ok(n) = value.parse() {
                    self.db_interval_secs = n;
                }
            }
            "MAXDBDAYS" => {
                if let Ok(n) = value.parse() {
                    self.max_db_days = n;
                }
            }
            "DBFILE" => {
                self.db_file = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "IGNORE_LOCALHOST" => self.ignore_localhost = parse_bool(value),
            "AAAA_QUERY_ANALYSIS" => self.aaaa_query_analysis = parse_bool(value),
            "API_EXCLUDE_DOMAINS" => self.api_exclude_domains = split_list(value),
            "API_EXCLUDE_CLIENTS" => self.api_exclude_clients = split_list(value),
            "API_QUERY_LOG_SHOW" => {
                self.api_query_log_show = match value {
                    "permittedonly" => QueryLogShow::PermittedOnly,
                    "blockedonly" => QueryLogShow::BlockedOnly,
                    "nothing" => QueryLogShow::Nothing,
                    _ => QueryLogShow::All,
                };
            }
            _ => {
                tracing::warn!(key, "unrecognised configuration key, ignoring");
            }
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "yes" | "1")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recognised_keys() {
        let cfg = EngineConfig::from_str(
            "# comment\nPRIVACY_LEVEL=2\nMAXLOGAGE=3600\nIGNORE_LOCALHOST=true\n\
             API_EXCLUDE_DOMAINS=a.test, b.test\nAPI_QUERY_LOG_SHOW=blockedonly\n",
        );
        assert_eq!(cfg.privacy_level, PrivacyLevel::HideDomainsClients);
        assert_eq!(cfg.max_log_age_secs, 3600);
        assert!(cfg.ignore_localhost);
        assert_eq!(cfg.api_exclude_domains, vec!["a.test", "b.test"]);
        assert_eq!(cfg.api_query_log_show, QueryLogShow::BlockedOnly);
    }

    #[test]
    fn empty_dbfile_disables_persistence() {
        let cfg = EngineConfig::from_str("DBFILE=\n");
        assert!(cfg.db_file.is_none());
    }

    #[test]
    fn unknown_keys_are_ignored_not_fatal() {
        let cfg = EngineConfig::from_str("SOME_FUTURE_KEY=hello\nMAXDBDAYS=30\n");
        assert_eq!(cfg.max_db_days, 30);
    }
}
