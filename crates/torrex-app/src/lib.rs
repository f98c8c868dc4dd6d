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

//! Session daemon bootstrap wiring.
//!
//! Layout: `bootstrap.rs` (dependency wiring and lifecycle), `session_config.rs`
//! (profile to runtime mapping), `error.rs` (`AppError`).

/// Application bootstrap and environment loading.
pub mod bootstrap;
/// Application error type.
pub mod error;
/// Session profile normalisation and runtime mapping.
pub mod session_config;

pub use bootstrap::run_app;
pub use error::{AppError, AppResult};
