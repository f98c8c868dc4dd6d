//! Guard rails and the effective session configuration.
//!
//! # Design
//! - Normalisation never fails: out-of-range values fall back to safe
//!   defaults and leave a warning behind.
//! - The effective view uses the narrow integer types the engine expects.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{
    DEFAULT_DOWNLOAD_ROOT, DEFAULT_LOG_LEVEL, DEFAULT_RESUME_DIR, LogFormatSetting, SessionProfile,
};

/// Upper bound guard rail for rate limits (about 5 Gbps).
pub const MAX_RATE_LIMIT_BPS: i64 = 5_000_000_000;

/// Effective session configuration after applying guard rails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProfileEffective {
    /// Listening and gateway mapping.
    pub network: SessionNetworkConfig,
    /// Peer discovery sources.
    pub features: SessionFeaturesConfig,
    /// Throughput and concurrency limits.
    pub limits: SessionLimitsConfig,
    /// Storage paths.
    pub storage: SessionStorageConfig,
    /// Log level directive.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormatSetting,
    /// Normalisation warnings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Listening socket and gateway mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionNetworkConfig {
    /// Listen port, `0` when listening is disabled.
    pub listen_port: u16,
    /// Whether `UPnP` and NAT-PMP are enabled.
    pub port_mapping: bool,
    /// Extra ports to map, sorted and unique.
    pub mapped_ports: Vec<u16>,
}

/// Session-wide peer discovery sources and duplicate handling.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFeaturesConfig {
    /// Distributed hash table.
    pub dht: bool,
    /// Peer exchange.
    pub pex: bool,
    /// Local service discovery.
    pub lsd: bool,
    /// Merge trackers when a loaded torrent is added again.
    pub merge_trackers: bool,
}

/// Throughput and concurrency limits; `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLimitsConfig {
    /// Maximum number of active torrents.
    pub max_active: Option<i32>,
    /// Global download cap in bytes per second.
    pub download_rate_limit: Option<i64>,
    /// Global upload cap in bytes per second.
    pub upload_rate_limit: Option<i64>,
}

/// Storage paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStorageConfig {
    /// Root directory for downloads.
    pub download_root: String,
    /// Directory for fast-resume payloads.
    pub resume_dir: String,
}

/// Produce the effective configuration together with guard-rail warnings.
#[must_use]
pub fn normalize_session_profile(profile: &SessionProfile) -> SessionProfileEffective {
    let mut warnings = Vec::new();

    let listen_port = match profile.listen_port {
        None | Some(0) => 0,
        Some(port) => u16::try_from(port).unwrap_or_else(|_| {
            warnings.push(format!(
                "listen_port {port} is out of range; disabling listening"
            ));
            0
        }),
    };

    let mut mapped_ports = BTreeSet::new();
    for &port in &profile.mapped_ports {
        match u16::try_from(port) {
            Ok(valid) if valid > 0 => {
                mapped_ports.insert(valid);
            }
            _ => warnings.push(format!("mapped port {port} is out of range; skipping")),
        }
    }
    if !profile.port_mapping && !mapped_ports.is_empty() {
        warnings.push("mapped_ports configured while port_mapping is disabled".to_string());
    }

    let max_active = match profile.max_active {
        Some(value) if value > 0 => Some(value),
        Some(_) => {
            warnings.push("max_active <= 0 requested; leaving unlimited".to_string());
            None
        }
        None => None,
    };

    let download_rate_limit =
        clamp_rate_limit("max_download_bps", profile.max_download_bps, &mut warnings);
    let upload_rate_limit =
        clamp_rate_limit("max_upload_bps", profile.max_upload_bps, &mut warnings);

    let download_root = sanitize_text(
        &profile.download_root,
        DEFAULT_DOWNLOAD_ROOT,
        "download_root",
        &mut warnings,
    );
    let resume_dir = sanitize_text(
        &profile.resume_dir,
        DEFAULT_RESUME_DIR,
        "resume_dir",
        &mut warnings,
    );
    let log_level = sanitize_text(
        &profile.log_level,
        DEFAULT_LOG_LEVEL,
        "log_level",
        &mut warnings,
    );

    SessionProfileEffective {
        network: SessionNetworkConfig {
            listen_port,
            port_mapping: profile.port_mapping,
            mapped_ports: mapped_ports.into_iter().collect(),
        },
        features: SessionFeaturesConfig {
            dht: profile.dht,
            pex: profile.pex,
            lsd: profile.lsd,
            merge_trackers: profile.merge_trackers,
        },
        limits: SessionLimitsConfig {
            max_active,
            download_rate_limit,
            upload_rate_limit,
        },
        storage: SessionStorageConfig {
            download_root,
            resume_dir,
        },
        log_level,
        log_format: profile.log_format,
        warnings,
    }
}

fn clamp_rate_limit(field: &str, value: Option<i64>, warnings: &mut Vec<String>) -> Option<i64> {
    match value {
        Some(limit) if limit <= 0 => {
            warnings.push(format!("{field} <= 0 requested; disabling limit"));
            None
        }
        Some(limit) if limit > MAX_RATE_LIMIT_BPS => {
            warnings.push(format!(
                "{field} of {limit} exceeds guard rail; clamping to {MAX_RATE_LIMIT_BPS}"
            ));
            Some(MAX_RATE_LIMIT_BPS)
        }
        other => other,
    }
}

fn sanitize_text(value: &str, fallback: &str, field: &str, warnings: &mut Vec<String>) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        warnings.push(format!("{field} was empty; using {fallback}"));
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_normalise_without_warnings() {
        let effective = normalize_session_profile(&SessionProfile::default());
        assert!(effective.warnings.is_empty(), "{:?}", effective.warnings);
        assert_eq!(effective.network.listen_port, 6_881);
        assert!(effective.features.dht && effective.features.pex && effective.features.lsd);
        assert_eq!(effective.limits.max_active, None);
    }

    #[test]
    fn out_of_range_values_are_clamped_with_warnings() {
        let profile = SessionProfile {
            listen_port: Some(70_000),
            mapped_ports: vec![8_080, -1, 8_080, 6_000],
            max_active: Some(0),
            max_download_bps: Some(MAX_RATE_LIMIT_BPS + 1),
            max_upload_bps: Some(-5),
            resume_dir: "   ".to_string(),
            ..SessionProfile::default()
        };
        let effective = normalize_session_profile(&profile);

        assert_eq!(effective.network.listen_port, 0);
        assert_eq!(effective.network.mapped_ports, vec![6_000, 8_080]);
        assert_eq!(effective.limits.max_active, None);
        assert_eq!(
            effective.limits.download_rate_limit,
            Some(MAX_RATE_LIMIT_BPS)
        );
        assert_eq!(effective.limits.upload_rate_limit, None);
        assert_eq!(effective.storage.resume_dir, DEFAULT_RESUME_DIR);
        assert_eq!(effective.warnings.len(), 6, "{:?}", effective.warnings);
    }

    #[test]
    fn disabled_listening_is_not_a_warning() {
        let profile = SessionProfile {
            listen_port: None,
            ..SessionProfile::default()
        };
        let effective = normalize_session_profile(&profile);
        assert_eq!(effective.network.listen_port, 0);
        assert!(effective.warnings.is_empty());
    }

    #[test]
    fn mapped_ports_without_port_mapping_warns() {
        let profile = SessionProfile {
            port_mapping: false,
            mapped_ports: vec![7_000],
            ..SessionProfile::default()
        };
        let effective = normalize_session_profile(&profile);
        assert_eq!(effective.network.mapped_ports, vec![7_000]);
        assert_eq!(effective.warnings.len(), 1);
    }
}
