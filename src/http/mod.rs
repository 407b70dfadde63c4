//! HTTP server module for the sun exposure engine.
//!
//! An axum-based REST layer over the core library: exposure and shadow
//! lookups, timelines, the precomputation ops surface, and cache
//! health/metrics. Requests flow handler -> service layer -> repositories;
//! the handlers themselves only parse, delegate and map errors.

#[cfg(feature = "http-server")]
pub mod handlers;

#[cfg(feature = "http-server")]
pub mod router;

#[cfg(feature = "http-server")]
pub mod state;

#[cfg(feature = "http-server")]
pub mod error;

#[cfg(feature = "http-server")]
pub mod dto;

#[cfg(feature = "http-server")]
pub use router::create_router;

#[cfg(feature = "http-server")]
pub use state::AppState;
