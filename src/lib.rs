//! # Sunpatio Rust Backend
//!
//! Sun exposure computation and precomputation-cache engine for city patios.
//!
//! This crate answers "is this patio in the sun right now, and how sure are
//! we" from building footprints, solar geometry and weather: solar position
//! math, shadow casting against nearby buildings, confidence scoring, a
//! multi-layer cache and a precomputation scheduler that keeps the patio x
//! time-slot grid warm ahead of demand. The backend exposes a REST API via
//! Axum.
//!
//! ## Architecture
//!
//! The crate is organized into several logical modules:
//!
//! - [`api`]: Core domain types and the error taxonomy
//! - [`config`]: Engine, cache and scheduler tunables loaded from TOML
//! - [`db`]: Repository traits and the bundled in-memory backend
//! - [`services`]: The computation pipeline (solar, shadow, confidence,
//!   exposure orchestration, timelines)
//! - [`cache`]: The Memory -> Distributed -> Precomputed fallback chain
//! - [`scheduler`]: Per-date bulk precomputation and invalidation
//! - [`http`]: Axum-based HTTP server and request handlers

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod api;

pub mod config;

pub mod db;

pub mod geo_util;

pub mod services;

pub mod cache;

pub mod scheduler;

#[cfg(feature = "http-server")]
pub mod http;
