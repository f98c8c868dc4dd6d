use std::collections::BTreeMap;

/// Engine settings understood by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SettingKey {
    /// `UPnP` port mapper.
    EnableUpnp,
    /// NAT-PMP port mapper.
    EnableNatpmp,
    /// Distributed hash table.
    EnableDht,
    /// Local service discovery.
    EnableLsd,
    /// Comma separated `host:port` listen interfaces.
    ListenInterfaces,
    /// Global download limit in bytes per second.
    DownloadRateLimit,
    /// Global upload limit in bytes per second.
    UploadRateLimit,
    /// Maximum concurrently active torrents.
    ActiveLimit,
    /// Queue size of the alert buffer.
    AlertQueueSize,
}

/// Typed setting value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    /// Boolean switch.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// String value.
    Str(String),
}

/// Sparse set of settings applied as a delta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPack {
    values: BTreeMap<SettingKey, SettingValue>,
}

impl SettingsPack {
    /// Empty delta.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Set a boolean setting.
    pub fn set_bool(&mut self, key: SettingKey, value: bool) {
        self.values.insert(key, SettingValue::Bool(value));
    }

    /// Set an integer setting.
    pub fn set_int(&mut self, key: SettingKey, value: i64) {
        self.values.insert(key, SettingValue::Int(value));
    }

    /// Set a string setting.
    pub fn set_str(&mut self, key: SettingKey, value: impl Into<String>) {
        self.values.insert(key, SettingValue::Str(value.into()));
    }

    /// Boolean value, if set.
    #[must_use]
    pub fn get_bool(&self, key: SettingKey) -> Option<bool> {
        match self.values.get(&key) {
            Some(SettingValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    /// Integer value, if set.
    #[must_use]
    pub fn get_int(&self, key: SettingKey) -> Option<i64> {
        match self.values.get(&key) {
            Some(SettingValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    /// String value, if set.
    #[must_use]
    pub fn get_str(&self, key: SettingKey) -> Option<&str> {
        match self.values.get(&key) {
            Some(SettingValue::Str(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Overlay `delta` on top of this pack.
    pub fn merge(&mut self, delta: &Self) {
        for (key, value) in &delta.values {
            self.values.insert(*key, value.clone());
        }
    }

    /// Whether no setting is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of settings present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }
}
