//! Service layer: the computation pipeline.
//!
//! Data flows strictly upward through this module: solar position feeds
//! shadow casting, shadow coverage feeds confidence scoring, and the
//! exposure orchestrator composes all three. The timeline service sits on
//! top and reads exclusively through the cache chain.

pub mod confidence;
pub mod exposure;
pub mod shadow;
pub mod solar;
pub mod timeline;

pub use exposure::ExposureEngine;
pub use timeline::TimelineService;
