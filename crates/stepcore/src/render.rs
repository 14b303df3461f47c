/// Capability the graph uses to request visual recomputation.
///
/// The graph never knows about pixels; it only reports that edge geometry or
/// the canvas bounds are stale. Implementations are expected to coalesce
/// bursts of calls (see `stepruntime::CoalescedRenderer`).
pub trait Renderer: Send + Sync {
    /// Edge paths need to be recomputed (a step moved, an edge changed).
    fn invalidate_geometry(&self);

    /// The extent of the canvas may have changed (a step moved, was added or removed).
    fn invalidate_bounds(&self);
}
