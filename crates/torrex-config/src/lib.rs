#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! File and environment backed configuration for the torrent session.
//!
//! Layout: `model.rs` (serde profile), `loader.rs` (JSON file plus `TORREX_*`
//! overrides), `profile.rs` (guard rails and the effective view).

pub mod error;
pub mod loader;
pub mod model;
pub mod profile;

pub use error::{ConfigError, ConfigResult};
pub use loader::{CONFIG_PATH_ENV, load_profile, load_profile_from};
pub use model::{LogFormatSetting, SessionProfile};
pub use profile::{
    MAX_RATE_LIMIT_BPS, SessionFeaturesConfig, SessionLimitsConfig, SessionNetworkConfig,
    SessionProfileEffective, SessionStorageConfig, normalize_session_profile,
};
