//! Repository implementations module.
//!
//! Production backends live behind the traits in `db::repository`; this
//! crate ships the in-memory implementation used for unit testing and
//! local development.
#[cfg(feature = "local-repo")]
pub mod local;

#[cfg(feature = "local-repo")]
pub use local::{LocalRepository, StaticWeatherProvider};
