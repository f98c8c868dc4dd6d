//! Profile normalisation and runtime mapping helpers.
//!
//! # Design
//! - Derives the session runtime configuration from the loaded profile while applying guard rails.
//! - Carries the effective profile (including warnings) for startup logging.

use torrex_config::{
    LogFormatSetting, SessionProfile, SessionProfileEffective, normalize_session_profile,
};
use torrex_session::{ResumeDataStore, SessionRuntimeConfig, Toggle};
use torrex_telemetry::LogFormat;

/// Runtime plan derived from the loaded profile.
#[derive(Debug, Clone)]
pub(crate) struct SessionPlan {
    /// Effective, clamped profile.
    pub(crate) effective: SessionProfileEffective,
    /// Runtime configuration applied to the session.
    pub(crate) runtime: SessionRuntimeConfig,
}

impl SessionPlan {
    pub(crate) fn from_profile(profile: &SessionProfile) -> Self {
        let effective = normalize_session_profile(profile);
        let runtime = SessionRuntimeConfig {
            listen_port: effective.network.listen_port,
            enable_dht: Toggle(effective.features.dht),
            enable_pex: Toggle(effective.features.pex),
            enable_lsd: Toggle(effective.features.lsd),
            port_mapping: Toggle(effective.network.port_mapping),
            merge_trackers: Toggle(effective.features.merge_trackers),
            download_rate_limit: effective.limits.download_rate_limit,
            upload_rate_limit: effective.limits.upload_rate_limit,
            max_active: effective.limits.max_active.map(i64::from),
        };
        Self { effective, runtime }
    }

    pub(crate) const fn log_format(&self) -> LogFormat {
        match self.effective.log_format {
            LogFormatSetting::Auto => LogFormat::infer(),
            LogFormatSetting::Json => LogFormat::Json,
            LogFormatSetting::Pretty => LogFormat::Pretty,
        }
    }

    pub(crate) fn resume_store(&self) -> ResumeDataStore {
        ResumeDataStore::new(&self.effective.storage.resume_dir)
    }

    /// Extra ports to map, only when gateway mapping is on.
    pub(crate) fn mapped_ports(&self) -> Option<Vec<u16>> {
        let ports = &self.effective.network.mapped_ports;
        (self.runtime.port_mapping.is_enabled() && !ports.is_empty()).then(|| ports.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use torrex_config::MAX_RATE_LIMIT_BPS;

    #[test]
    fn runtime_plan_clamps_and_warns() {
        let profile = SessionProfile {
            listen_port: Some(70_000),
            lsd: false,
            max_active: Some(3),
            max_download_bps: Some(MAX_RATE_LIMIT_BPS * 2),
            log_format: LogFormatSetting::Json,
            ..SessionProfile::default()
        };
        let plan = SessionPlan::from_profile(&profile);

        assert_eq!(plan.runtime.listen_port, 0);
        assert!(!plan.runtime.enable_lsd.is_enabled());
        assert!(plan.runtime.enable_dht.is_enabled());
        assert_eq!(plan.runtime.max_active, Some(3));
        assert_eq!(plan.runtime.download_rate_limit, Some(MAX_RATE_LIMIT_BPS));
        assert_eq!(plan.log_format(), LogFormat::Json);
        assert_eq!(plan.effective.warnings.len(), 2);
    }

    #[test]
    fn mapped_ports_require_port_mapping() {
        let mut profile = SessionProfile {
            mapped_ports: vec![9_000, 9_001],
            ..SessionProfile::default()
        };
        assert_eq!(
            SessionPlan::from_profile(&profile).mapped_ports(),
            Some(vec![9_000, 9_001])
        );

        profile.port_mapping = false;
        assert_eq!(SessionPlan::from_profile(&profile).mapped_ports(), None);
    }
}
