//! Magnet URI parsing.

use url::Url;

use crate::error::MagnetError;
use crate::model::{DescriptorKind, InfoHash, TorrentDescriptor, TrackerEntry};

const BTIH_PREFIX: &str = "urn:btih:";

/// Parse a magnet URI into a descriptor.
///
/// Every `tr` parameter becomes its own tier in the order given. Only hex
/// encoded v1 info hashes are accepted.
///
/// # Errors
///
/// Returns a [`MagnetError`] when the input is not a magnet URI or carries no
/// usable info hash.
pub fn parse_magnet(uri: &str) -> Result<TorrentDescriptor, MagnetError> {
    let parsed = Url::parse(uri.trim()).map_err(|err| MagnetError::InvalidUri {
        detail: err.to_string(),
    })?;
    if parsed.scheme() != "magnet" {
        return Err(MagnetError::NotMagnet {
            scheme: parsed.scheme().to_string(),
        });
    }

    let mut info_hash = None;
    let mut name = String::new();
    let mut trackers: Vec<TrackerEntry> = Vec::new();
    let mut url_seeds: Vec<String> = Vec::new();

    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "xt" => {
                if info_hash.is_some() {
                    continue;
                }
                if let Some(hash) = value.strip_prefix(BTIH_PREFIX) {
                    info_hash = Some(hash.parse::<InfoHash>()?);
                }
            }
            "dn" => name = value.into_owned(),
            "ws" => {
                if !url_seeds.iter().any(|seed| *seed == value) {
                    url_seeds.push(value.into_owned());
                }
            }
            key if key == "tr" || key.starts_with("tr.") => {
                if trackers.iter().any(|tracker| tracker.url == value) {
                    continue;
                }
                let tier = u8::try_from(trackers.len()).unwrap_or(u8::MAX);
                trackers.push(TrackerEntry::new(value.into_owned(), tier));
            }
            _ => {}
        }
    }

    let info_hash = info_hash.ok_or(MagnetError::MissingInfoHash)?;
    Ok(TorrentDescriptor {
        kind: DescriptorKind::Magnet,
        info_hash,
        name,
        trackers,
        url_seeds,
        metadata: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "c12fe1c06bba254a9dc9f519b335aa7c1367a88a";

    #[test]
    fn parses_hash_name_trackers_and_seeds() -> anyhow::Result<()> {
        let uri = format!(
            "magnet:?xt=urn:btih:{HASH}&dn=Some%20Album&tr=udp%3A%2F%2Fa.example%3A80&tr=http%3A%2F%2Fb.example%2Fannounce&ws=http%3A%2F%2Fseed.example%2Ffiles"
        );
        let descriptor = parse_magnet(&uri)?;
        assert_eq!(descriptor.kind, DescriptorKind::Magnet);
        assert_eq!(descriptor.info_hash.to_hex(), HASH);
        assert_eq!(descriptor.name, "Some Album");
        let trackers: Vec<(&str, u8)> = descriptor
            .trackers
            .iter()
            .map(|t| (t.url.as_str(), t.tier))
            .collect();
        assert_eq!(
            trackers,
            vec![
                ("udp://a.example:80", 0),
                ("http://b.example/announce", 1)
            ]
        );
        assert_eq!(descriptor.url_seeds, vec!["http://seed.example/files"]);
        assert!(descriptor.metadata.is_none());
        Ok(())
    }

    #[test]
    fn accepts_base32_info_hash() -> anyhow::Result<()> {
        let descriptor = parse_magnet("magnet:?xt=urn:btih:AERUKZ4JVPG66AJDIVTYTK6N54ASGRLH&dn=x")?;
        assert_eq!(
            descriptor.info_hash.to_hex(),
            "0123456789abcdef0123456789abcdef01234567"
        );
        assert_eq!(descriptor.name, "x");
        Ok(())
    }

    #[test]
    fn duplicate_trackers_are_collapsed() -> anyhow::Result<()> {
        let uri = format!("magnet:?xt=urn:btih:{HASH}&tr=http://a.example&tr=http://a.example");
        assert_eq!(parse_magnet(&uri)?.trackers.len(), 1);
        Ok(())
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(matches!(
            parse_magnet("http://example.com/?xt=urn:btih:00"),
            Err(MagnetError::NotMagnet { .. })
        ));
    }

    #[test]
    fn requires_info_hash() {
        assert_eq!(
            parse_magnet("magnet:?dn=nothing"),
            Err(MagnetError::MissingInfoHash)
        );
        assert!(matches!(
            parse_magnet("magnet:?xt=urn:btih:not-hex"),
            Err(MagnetError::InvalidInfoHash { .. })
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_magnet("not a uri"),
            Err(MagnetError::InvalidUri { .. })
        ));
    }
}
