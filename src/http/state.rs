//! Application state for the HTTP server.

use std::sync::Arc;

use crate::cache::LayeredCache;
use crate::db::repository::{BuildingRepository, PatioRepository};
use crate::scheduler::PrecomputationScheduler;
use crate::services::{ExposureEngine, TimelineService};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ExposureEngine>,
    pub cache: Arc<LayeredCache>,
    pub scheduler: Arc<PrecomputationScheduler>,
    pub timeline: Arc<TimelineService>,
    pub buildings: Arc<dyn BuildingRepository>,
    pub patios: Arc<dyn PatioRepository>,
}

impl AppState {
    pub fn new(
        engine: Arc<ExposureEngine>,
        cache: Arc<LayeredCache>,
        scheduler: Arc<PrecomputationScheduler>,
        timeline: Arc<TimelineService>,
        buildings: Arc<dyn BuildingRepository>,
        patios: Arc<dyn PatioRepository>,
    ) -> Self {
        Self {
            engine,
            cache,
            scheduler,
            timeline,
            buildings,
            patios,
        }
    }
}
