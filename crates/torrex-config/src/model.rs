//! Serde model of the session profile as written by operators.
//!
//! # Design
//! - Every field has a default so a partial document (or none at all) is valid.
//! - Values are stored as written; guard rails live in [`crate::profile`].

use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_LISTEN_PORT: i32 = 6_881;
pub(crate) const DEFAULT_DOWNLOAD_ROOT: &str = "/data/downloads";
pub(crate) const DEFAULT_RESUME_DIR: &str = "/var/lib/torrex/resume";
pub(crate) const DEFAULT_LOG_LEVEL: &str = "info";

/// Session configuration as loaded from JSON and the environment.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionProfile {
    /// Incoming connection port; `None` or `0` disables listening.
    pub listen_port: Option<i32>,
    /// Distributed hash table peer discovery.
    pub dht: bool,
    /// Peer exchange.
    pub pex: bool,
    /// Local service discovery.
    pub lsd: bool,
    /// `UPnP` and NAT-PMP gateway mapping.
    pub port_mapping: bool,
    /// Re-adding a loaded torrent merges its trackers into the existing one.
    pub merge_trackers: bool,
    /// Extra ports to map on the gateway besides the listen port.
    pub mapped_ports: Vec<i32>,
    /// Maximum number of concurrently active torrents.
    pub max_active: Option<i32>,
    /// Global download cap in bytes per second.
    pub max_download_bps: Option<i64>,
    /// Global upload cap in bytes per second.
    pub max_upload_bps: Option<i64>,
    /// Root directory for downloads.
    pub download_root: String,
    /// Directory holding fast-resume payloads.
    pub resume_dir: String,
    /// Log level or `EnvFilter` directive.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormatSetting,
}

impl Default for SessionProfile {
    fn default() -> Self {
        Self {
            listen_port: Some(DEFAULT_LISTEN_PORT),
            dht: true,
            pex: true,
            lsd: true,
            port_mapping: true,
            merge_trackers: false,
            mapped_ports: Vec::new(),
            max_active: None,
            max_download_bps: None,
            max_upload_bps: None,
            download_root: DEFAULT_DOWNLOAD_ROOT.to_string(),
            resume_dir: DEFAULT_RESUME_DIR.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormatSetting::Auto,
        }
    }
}

/// Requested log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatSetting {
    /// Pretty in debug builds, JSON in release builds.
    #[default]
    Auto,
    /// Structured JSON lines.
    Json,
    /// Human readable output.
    Pretty,
}

impl LogFormatSetting {
    /// Parse the textual form used in environment overrides.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "json" => Some(Self::Json),
            "pretty" | "text" => Some(Self::Pretty),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_fills_defaults() -> anyhow::Result<()> {
        let profile: SessionProfile =
            serde_json::from_str(r#"{"listen_port": 51413, "pex": false, "log_format": "json"}"#)?;
        assert_eq!(profile.listen_port, Some(51_413));
        assert!(!profile.pex);
        assert!(profile.dht);
        assert_eq!(profile.log_format, LogFormatSetting::Json);
        assert_eq!(profile.resume_dir, DEFAULT_RESUME_DIR);
        Ok(())
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed = serde_json::from_str::<SessionProfile>(r#"{"listen_prot": 1}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn log_format_parse_accepts_aliases() {
        assert_eq!(LogFormatSetting::parse(" Text "), Some(LogFormatSetting::Pretty));
        assert_eq!(LogFormatSetting::parse("auto"), Some(LogFormatSetting::Auto));
        assert_eq!(LogFormatSetting::parse("xml"), None);
    }
}
