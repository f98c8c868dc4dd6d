//! Profile loading from an optional JSON document plus `TORREX_*` overrides.
//!
//! # Design
//! - `TORREX_CONFIG` names the document; without it the built-in defaults apply.
//! - Environment overrides win over the document, one variable per field.
//! - Malformed overrides are errors rather than warnings: they are typos.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::model::{LogFormatSetting, SessionProfile};

/// Environment variable naming the JSON profile document.
pub const CONFIG_PATH_ENV: &str = "TORREX_CONFIG";

/// Load the profile using the process environment.
///
/// # Errors
///
/// Returns an error when the document cannot be read or parsed, or when an
/// override holds a malformed value.
pub fn load_profile() -> ConfigResult<SessionProfile> {
    load_profile_from(|name| std::env::var(name).ok())
}

/// Load the profile using `env` as the variable lookup.
///
/// # Errors
///
/// Returns an error when the document cannot be read or parsed, or when an
/// override holds a malformed value.
pub fn load_profile_from<F>(env: F) -> ConfigResult<SessionProfile>
where
    F: Fn(&str) -> Option<String>,
{
    let mut profile = match env(CONFIG_PATH_ENV) {
        Some(path) if !path.trim().is_empty() => read_document(Path::new(path.trim()))?,
        _ => {
            debug!("no configuration document; using defaults");
            SessionProfile::default()
        }
    };
    apply_overrides(&mut profile, &env)?;
    Ok(profile)
}

fn read_document(path: &Path) -> ConfigResult<SessionProfile> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "config.read",
        path: path.to_path_buf(),
        source,
    })?;
    let profile = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "loaded configuration document");
    Ok(profile)
}

fn apply_overrides<F>(profile: &mut SessionProfile, env: &F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |name: &'static str| {
        env(name).map(|raw| {
            debug!(variable = name, "applying environment override");
            (name, raw)
        })
    };

    if let Some((name, raw)) = lookup("TORREX_LISTEN_PORT") {
        profile.listen_port = parse_optional(name, &raw)?;
    }
    if let Some((name, raw)) = lookup("TORREX_DHT") {
        profile.dht = parse_flag(name, &raw)?;
    }
    if let Some((name, raw)) = lookup("TORREX_PEX") {
        profile.pex = parse_flag(name, &raw)?;
    }
    if let Some((name, raw)) = lookup("TORREX_LSD") {
        profile.lsd = parse_flag(name, &raw)?;
    }
    if let Some((name, raw)) = lookup("TORREX_PORT_MAPPING") {
        profile.port_mapping = parse_flag(name, &raw)?;
    }
    if let Some((name, raw)) = lookup("TORREX_MERGE_TRACKERS") {
        profile.merge_trackers = parse_flag(name, &raw)?;
    }
    if let Some((name, raw)) = lookup("TORREX_MAPPED_PORTS") {
        profile.mapped_ports = raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| parse_number(name, item))
            .collect::<ConfigResult<_>>()?;
    }
    if let Some((name, raw)) = lookup("TORREX_MAX_ACTIVE") {
        profile.max_active = parse_optional(name, &raw)?;
    }
    if let Some((name, raw)) = lookup("TORREX_MAX_DOWNLOAD_BPS") {
        profile.max_download_bps = parse_optional(name, &raw)?;
    }
    if let Some((name, raw)) = lookup("TORREX_MAX_UPLOAD_BPS") {
        profile.max_upload_bps = parse_optional(name, &raw)?;
    }
    if let Some((_, raw)) = lookup("TORREX_DOWNLOAD_ROOT") {
        profile.download_root = raw;
    }
    if let Some((_, raw)) = lookup("TORREX_RESUME_DIR") {
        profile.resume_dir = raw;
    }
    if let Some((_, raw)) = lookup("TORREX_LOG_LEVEL") {
        profile.log_level = raw;
    }
    if let Some((name, raw)) = lookup("TORREX_LOG_FORMAT") {
        profile.log_format = LogFormatSetting::parse(&raw)
            .ok_or_else(|| ConfigError::invalid_env(name, &raw, "unknown_log_format"))?;
    }
    Ok(())
}

fn parse_flag(name: &str, raw: &str) -> ConfigResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid_env(name, raw, "not_a_boolean")),
    }
}

fn parse_number<T: FromStr>(name: &str, raw: &str) -> ConfigResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::invalid_env(name, raw, "not_a_number"))
}

/// Empty or `none` clears the value.
fn parse_optional<T: FromStr>(name: &str, raw: &str) -> ConfigResult<Option<T>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    parse_number(name, trimmed).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_document_yields_defaults() -> anyhow::Result<()> {
        let profile = load_profile_from(env_from(&[]))?;
        assert_eq!(profile, SessionProfile::default());
        Ok(())
    }

    #[test]
    fn document_is_loaded_and_env_overrides_win() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"{{"listen_port": 51413, "dht": false, "max_active": 4, "log_level": "debug"}}"#
        )?;
        let path = file.path().to_string_lossy().into_owned();

        let profile = load_profile_from(env_from(&[
            (CONFIG_PATH_ENV, path.as_str()),
            ("TORREX_DHT", "yes"),
            ("TORREX_MERGE_TRACKERS", "on"),
            ("TORREX_MAX_ACTIVE", "none"),
            ("TORREX_MAPPED_PORTS", "8080, 9090,"),
            ("TORREX_LOG_FORMAT", "json"),
        ]))?;

        assert_eq!(profile.listen_port, Some(51_413));
        assert!(profile.dht);
        assert!(profile.merge_trackers);
        assert_eq!(profile.max_active, None);
        assert_eq!(profile.mapped_ports, vec![8_080, 9_090]);
        assert_eq!(profile.log_level, "debug");
        assert_eq!(profile.log_format, LogFormatSetting::Json);
        Ok(())
    }

    #[test]
    fn malformed_override_is_rejected() {
        let result = load_profile_from(env_from(&[("TORREX_PEX", "maybe")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidField {
                reason: "not_a_boolean",
                ..
            })
        ));

        let result = load_profile_from(env_from(&[("TORREX_LISTEN_PORT", "port")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidField {
                reason: "not_a_number",
                ..
            })
        ));
    }

    #[test]
    fn unreadable_and_invalid_documents_fail() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let missing = dir.path().join("absent.json");
        let missing = missing.to_string_lossy().into_owned();
        let result = load_profile_from(env_from(&[(CONFIG_PATH_ENV, missing.as_str())]));
        assert!(matches!(result, Err(ConfigError::Io { .. })));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json")?;
        let broken = broken.to_string_lossy().into_owned();
        let result = load_profile_from(env_from(&[(CONFIG_PATH_ENV, broken.as_str())]));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
        Ok(())
    }
}
