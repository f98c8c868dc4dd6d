//! Strongly typed inputs accepted by the session.

use std::path::PathBuf;

use torrex_torrent_core::{AddTorrentParams, DownloadPriority, OperatingMode, TorrentFlags};

use crate::native::{SettingKey, SettingsPack};

/// Wrapper for boolean flags to avoid pedantic lint churn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Toggle(pub bool);

impl Toggle {
    #[must_use]
    /// Whether the toggle is enabled.
    pub const fn is_enabled(self) -> bool {
        self.0
    }
}

impl From<bool> for Toggle {
    fn from(value: bool) -> Self {
        Self(value)
    }
}

impl From<Toggle> for bool {
    fn from(toggle: Toggle) -> Self {
        toggle.0
    }
}

/// Per-add options layered on top of a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddTorrentOptions {
    /// Download location override.
    pub save_path: Option<PathBuf>,
    /// Add in the stopped state.
    pub stopped: Toggle,
    /// Scheduling mode once started.
    pub operating_mode: OperatingMode,
    /// Request pieces in order.
    pub sequential: Toggle,
    /// Initial per-file priorities.
    pub file_priorities: Vec<DownloadPriority>,
}

impl AddTorrentOptions {
    /// Fold the options into engine add parameters.
    #[must_use]
    pub fn apply(&self, mut params: AddTorrentParams) -> AddTorrentParams {
        if self.save_path.is_some() {
            params.save_path.clone_from(&self.save_path);
        }
        params.flags.set(TorrentFlags::PAUSED, self.stopped.is_enabled());
        params.flags.set(
            TorrentFlags::AUTO_MANAGED,
            self.operating_mode == OperatingMode::AutoManaged,
        );
        params
            .flags
            .set(TorrentFlags::SEQUENTIAL_DOWNLOAD, self.sequential.is_enabled());
        if !self.file_priorities.is_empty() {
            params.file_priorities.clone_from(&self.file_priorities);
        }
        params
    }
}

/// Runtime parameters applied to the engine session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRuntimeConfig {
    /// Port the session listens on; `0` disables listening.
    pub listen_port: u16,
    /// Distributed hash table.
    pub enable_dht: Toggle,
    /// Peer exchange.
    pub enable_pex: Toggle,
    /// Local service discovery.
    pub enable_lsd: Toggle,
    /// `UPnP` and NAT-PMP port mapping.
    pub port_mapping: Toggle,
    /// Adding an already loaded torrent merges its trackers and web seeds.
    pub merge_trackers: Toggle,
    /// Global download limit in bytes per second, `None` for unlimited.
    pub download_rate_limit: Option<i64>,
    /// Global upload limit in bytes per second, `None` for unlimited.
    pub upload_rate_limit: Option<i64>,
    /// Maximum concurrently active torrents.
    pub max_active: Option<i64>,
}

impl Default for SessionRuntimeConfig {
    fn default() -> Self {
        Self {
            listen_port: 6_881,
            enable_dht: Toggle(true),
            enable_pex: Toggle(true),
            enable_lsd: Toggle(true),
            port_mapping: Toggle(true),
            merge_trackers: Toggle(false),
            download_rate_limit: None,
            upload_rate_limit: None,
            max_active: None,
        }
    }
}

impl SessionRuntimeConfig {
    /// Engine settings derived from this configuration.
    ///
    /// Peer exchange is a per-torrent extension and has no session setting.
    #[must_use]
    pub fn to_settings_pack(&self) -> SettingsPack {
        let mut pack = SettingsPack::new();
        let interfaces = if self.listen_port == 0 {
            String::new()
        } else {
            format!("0.0.0.0:{}", self.listen_port)
        };
        pack.set_str(SettingKey::ListenInterfaces, interfaces);
        pack.set_bool(SettingKey::EnableDht, self.enable_dht.is_enabled());
        pack.set_bool(SettingKey::EnableLsd, self.enable_lsd.is_enabled());
        pack.set_bool(SettingKey::EnableUpnp, self.port_mapping.is_enabled());
        pack.set_bool(SettingKey::EnableNatpmp, self.port_mapping.is_enabled());
        pack.set_int(
            SettingKey::DownloadRateLimit,
            self.download_rate_limit.unwrap_or(0),
        );
        pack.set_int(
            SettingKey::UploadRateLimit,
            self.upload_rate_limit.unwrap_or(0),
        );
        pack.set_int(SettingKey::ActiveLimit, self.max_active.unwrap_or(-1));
        pack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use torrex_torrent_core::InfoHash;

    fn params() -> AddTorrentParams {
        AddTorrentParams {
            info_hash: InfoHash::from_bytes([1; 20]),
            name: "demo".to_string(),
            trackers: Vec::new(),
            tracker_tiers: Vec::new(),
            url_seeds: Vec::new(),
            metadata: None,
            save_path: None,
            flags: TorrentFlags::empty(),
            file_priorities: Vec::new(),
            userdata: None,
        }
    }

    #[test]
    fn options_translate_to_flags() {
        let options = AddTorrentOptions {
            stopped: Toggle(true),
            operating_mode: OperatingMode::Forced,
            sequential: Toggle(true),
            save_path: Some(PathBuf::from("/data")),
            ..AddTorrentOptions::default()
        };
        let params = options.apply(params());
        assert!(params.flags.contains(TorrentFlags::PAUSED));
        assert!(!params.flags.contains(TorrentFlags::AUTO_MANAGED));
        assert!(params.flags.contains(TorrentFlags::SEQUENTIAL_DOWNLOAD));
        assert_eq!(params.save_path, Some(PathBuf::from("/data")));
    }

    #[test]
    fn runtime_config_maps_port_mapping_to_both_mappers() {
        let config = SessionRuntimeConfig {
            listen_port: 0,
            port_mapping: Toggle(false),
            ..SessionRuntimeConfig::default()
        };
        let pack = config.to_settings_pack();
        assert_eq!(pack.get_bool(SettingKey::EnableUpnp), Some(false));
        assert_eq!(pack.get_bool(SettingKey::EnableNatpmp), Some(false));
        assert_eq!(pack.get_str(SettingKey::ListenInterfaces), Some(""));
        assert_eq!(pack.get_int(SettingKey::ActiveLimit), Some(-1));
    }
}
