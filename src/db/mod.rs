//! Data access for the sun exposure core.
//!
//! The core consumes building/patio geometry and weather through narrow
//! read-only traits, and owns the precomputed-exposure store outright.
//! Backends are swappable behind the traits in [`repository`]; the bundled
//! `local` implementation keeps everything in memory with R-tree spatial
//! indexes.

#[cfg(not(feature = "local-repo"))]
compile_error!("Enable at least one repository backend feature.");

pub mod error;
pub mod repositories;
pub mod repository;

pub use error::{ErrorContext, RepositoryError, RepositoryResult};
pub use repository::{
    BuildingRepository, FullRepository, PatioRepository, PrecomputedRepository, WeatherProvider,
};

#[cfg(feature = "local-repo")]
pub use repositories::{LocalRepository, StaticWeatherProvider};
