use crate::scheduler::UpdateScheduler;
use std::sync::Arc;
use stepcore::Renderer;

/// Update class for redrawing every edge path
pub const EDGE_GEOMETRY: &str = "edge-geometry";
/// Update class for growing the canvas to fit its steps
pub const CANVAS_BOUNDS: &str = "canvas-bounds";

/// Drawing surface that performs the expensive recomputations
pub trait Canvas: Send + Sync + 'static {
    fn redraw_edges(&self) -> anyhow::Result<()>;
    fn resize_bounds(&self) -> anyhow::Result<()>;
}

/// [`Renderer`] that batches graph invalidations through an [`UpdateScheduler`]
pub struct CoalescedRenderer {
    scheduler: UpdateScheduler,
    canvas: Arc<dyn Canvas>,
}

impl CoalescedRenderer {
    pub fn new(scheduler: UpdateScheduler, canvas: Arc<dyn Canvas>) -> Self {
        Self { scheduler, canvas }
    }

    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    /// Apply pending redraws now, e.g. before exporting a screenshot
    pub fn flush(&self) {
        self.scheduler.flush(EDGE_GEOMETRY);
        self.scheduler.flush(CANVAS_BOUNDS);
    }
}

impl Renderer for CoalescedRenderer {
    fn invalidate_geometry(&self) {
        let canvas = self.canvas.clone();
        self.scheduler
            .schedule(EDGE_GEOMETRY, move || canvas.redraw_edges());
    }

    fn invalidate_bounds(&self) {
        let canvas = self.canvas.clone();
        self.scheduler
            .schedule(CANVAS_BOUNDS, move || canvas.resize_bounds());
    }
}
