use crate::{Renderer, StepTypeDefinition};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub type StepId = String;
pub type EdgeId = String;

/// Property values of a configured step, keyed by field key
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Step position on the editor canvas
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Cardinal anchor on a step. Purely descriptive, never type-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Port {
    #[serde(rename = "N")]
    North,
    #[serde(rename = "E")]
    East,
    #[serde(rename = "S")]
    South,
    #[serde(rename = "W")]
    West,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub step: StepId,
    pub port: Port,
}

impl Endpoint {
    pub fn new(step: impl Into<StepId>, port: Port) -> Self {
        Self {
            step: step.into(),
            port,
        }
    }

    /// Default outgoing anchor (east side)
    pub fn output(step: impl Into<StepId>) -> Self {
        Self::new(step, Port::East)
    }

    /// Default incoming anchor (west side)
    pub fn input(step: impl Into<StepId>) -> Self {
        Self::new(step, Port::West)
    }
}

/// A configured instance of a step type placed on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub type_id: String,
    pub label: String,
    pub category: String,
    pub position: Position,
    pub properties: Properties,
}

/// Directed dependency between two steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub from: Endpoint,
    pub to: Endpoint,
}

impl Edge {
    pub fn touches(&self, step_id: &str) -> bool {
        self.from.step == step_id || self.to.step == step_id
    }
}

/// How predecessors and successors of a deleted step are reconnected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewirePolicy {
    /// Sort both sides by vertical position and connect index-wise.
    /// Unmatched steps on the longer side stay disconnected.
    #[default]
    PairByPosition,
    /// Reconnect only when there is exactly one predecessor and one successor.
    DirectOnly,
    /// Connect every predecessor to every successor.
    AllPairs,
    Disabled,
}

/// Editing behavior of a graph
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    /// Chain each newly placed step to the previously created one.
    pub auto_connect: bool,
    pub rewire: RewirePolicy,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            auto_connect: true,
            rewire: RewirePolicy::default(),
        }
    }
}

/// Read-only copy of the graph taken at run start
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub steps: Vec<Step>,
    pub edges: Vec<Edge>,
}

impl GraphSnapshot {
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// The step/edge collections of one editing session.
///
/// Invariants held after every mutation:
/// - step ids are unique
/// - no edge connects a step to itself
/// - at most one edge per (from, to) step pair
/// - every edge endpoint references a present step
pub struct WorkflowGraph {
    pub(crate) steps: Vec<Step>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) seq: u64,
    selected: Option<StepId>,
    pub(crate) last_created: Option<StepId>,
    settings: GraphSettings,
    renderer: Option<Arc<dyn Renderer>>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::with_settings(GraphSettings::default())
    }

    pub fn with_settings(settings: GraphSettings) -> Self {
        Self {
            steps: Vec::new(),
            edges: Vec::new(),
            seq: 1,
            selected: None,
            last_created: None,
            settings,
            renderer: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn set_renderer(&mut self, renderer: Option<Arc<dyn Renderer>>) {
        self.renderer = renderer;
    }

    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn contains_step(&self, id: &str) -> bool {
        self.step(id).is_some()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn last_created(&self) -> Option<&str> {
        self.last_created.as_deref()
    }

    /// Select a step, or clear the selection with `None`. Unknown ids clear it.
    pub fn select(&mut self, id: Option<&str>) {
        self.selected = id.filter(|id| self.contains_step(id)).map(str::to_string);
    }

    pub(crate) fn next_step_id(&mut self) -> StepId {
        loop {
            let id = format!("step_{}", self.seq);
            // wraps to the start of the sequence; ids in use are skipped below
            self.seq = self.seq.checked_add(1).unwrap_or(1);
            if !self.contains_step(&id) {
                return id;
            }
        }
    }

    pub(crate) fn new_edge_id() -> EdgeId {
        format!("edge_{}", Uuid::new_v4().simple())
    }

    /// Create a step of type `def` at `position` with default properties.
    pub fn add_step(&mut self, def: &StepTypeDefinition, position: Position) -> &Step {
        let id = self.next_step_id();
        tracing::debug!("Adding step {} ({})", id, def.id);

        self.steps.push(Step {
            id: id.clone(),
            type_id: def.id.clone(),
            label: def.name.clone(),
            category: def.category.clone(),
            position,
            properties: def.default_properties(),
        });
        self.last_created = Some(id);
        self.invalidate_bounds();

        &self.steps[self.steps.len() - 1]
    }

    /// Add a step as the editor does on drop: when auto-connect is on, the
    /// previously created step is chained to the new one.
    ///
    /// Returns the id of the placed step.
    pub fn place_step(&mut self, def: &StepTypeDefinition, position: Position) -> StepId {
        let previous = self.last_created.clone();
        let id = self.add_step(def, position).id.clone();

        if self.settings.auto_connect {
            if let Some(prev) = previous {
                self.add_edge(Endpoint::output(prev), Endpoint::input(id.clone()));
            }
        }

        id
    }

    pub fn move_step(&mut self, id: &str, position: Position) -> bool {
        let Some(step) = self.steps.iter_mut().find(|s| s.id == id) else {
            return false;
        };
        step.position = position;
        self.invalidate_geometry();
        self.invalidate_bounds();
        true
    }

    pub fn set_property(
        &mut self,
        id: &str,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> bool {
        match self.steps.iter_mut().find(|s| s.id == id) {
            Some(step) => {
                step.properties.insert(key.into(), value.into());
                true
            }
            None => false,
        }
    }

    /// Connect two steps. Returns `None` when the edge would be a self-loop,
    /// a duplicate of an existing (from, to) pair, or dangle.
    pub fn add_edge(&mut self, from: Endpoint, to: Endpoint) -> Option<&Edge> {
        if from.step == to.step {
            return None;
        }
        if self.has_edge(&from.step, &to.step) {
            return None;
        }
        if !self.contains_step(&from.step) || !self.contains_step(&to.step) {
            tracing::debug!("Ignoring edge {} -> {}: unknown step", from.step, to.step);
            return None;
        }

        self.edges.push(Edge {
            id: Self::new_edge_id(),
            from,
            to,
        });
        self.invalidate_geometry();

        self.edges.last()
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges
            .iter()
            .any(|e| e.from.step == from && e.to.step == to)
    }

    pub fn remove_edge(&mut self, id: &str) -> bool {
        let before = self.edges.len();
        self.edges.retain(|e| e.id != id);
        let removed = self.edges.len() != before;
        if removed {
            self.invalidate_geometry();
        }
        removed
    }

    /// Remove every edge with `step_id` at either end. Returns how many went.
    pub fn remove_edges_touching(&mut self, step_id: &str) -> usize {
        let before = self.edges.len();
        self.edges.retain(|e| !e.touches(step_id));
        let removed = before - self.edges.len();
        if removed > 0 {
            self.invalidate_geometry();
        }
        removed
    }

    /// Delete a step and reconnect its neighbours according to the rewire policy.
    pub fn remove_step(&mut self, step_id: &str) -> Option<Step> {
        let index = self.steps.iter().position(|s| s.id == step_id)?;

        let preds: Vec<StepId> = self
            .edges
            .iter()
            .filter(|e| e.to.step == step_id)
            .map(|e| e.from.step.clone())
            .collect();
        let succs: Vec<StepId> = self
            .edges
            .iter()
            .filter(|e| e.from.step == step_id)
            .map(|e| e.to.step.clone())
            .collect();

        self.remove_edges_touching(step_id);
        let removed = self.steps.remove(index);
        tracing::debug!(
            "Removed step {} ({} predecessors, {} successors)",
            step_id,
            preds.len(),
            succs.len()
        );

        self.rewire(preds, succs);

        if self.selected.as_deref() == Some(step_id) {
            self.selected = None;
        }
        if self.last_created.as_deref() == Some(step_id) {
            self.last_created = None;
        }
        self.invalidate_geometry();
        self.invalidate_bounds();

        Some(removed)
    }

    fn rewire(&mut self, mut preds: Vec<StepId>, mut succs: Vec<StepId>) {
        if preds.is_empty() || succs.is_empty() {
            return;
        }

        let pairs: Vec<(StepId, StepId)> = match self.settings.rewire {
            RewirePolicy::Disabled => Vec::new(),
            RewirePolicy::DirectOnly => {
                if preds.len() == 1 && succs.len() == 1 {
                    vec![(preds.remove(0), succs.remove(0))]
                } else {
                    Vec::new()
                }
            }
            RewirePolicy::PairByPosition => {
                if preds.len() == 1 && succs.len() == 1 {
                    vec![(preds.remove(0), succs.remove(0))]
                } else {
                    preds.sort_by(|a, b| self.vertical(a).total_cmp(&self.vertical(b)));
                    succs.sort_by(|a, b| self.vertical(a).total_cmp(&self.vertical(b)));
                    if preds.len() != succs.len() {
                        tracing::debug!(
                            "Rewire leaves {} step(s) unconnected",
                            preds.len().abs_diff(succs.len())
                        );
                    }
                    preds.into_iter().zip(succs).collect()
                }
            }
            RewirePolicy::AllPairs => preds
                .iter()
                .flat_map(|p| succs.iter().map(move |s| (p.clone(), s.clone())))
                .collect(),
        };

        for (from, to) in pairs {
            // add_edge drops self-loops and duplicates
            if self
                .add_edge(Endpoint::output(from.clone()), Endpoint::input(to.clone()))
                .is_some()
            {
                tracing::debug!("Rewired {} -> {}", from, to);
            }
        }
    }

    fn vertical(&self, id: &str) -> f64 {
        self.step(id).map(|s| s.position.y).unwrap_or(0.0)
    }

    /// Remove all steps and edges and reset the id sequence.
    pub fn clear(&mut self) {
        self.steps.clear();
        self.edges.clear();
        self.seq = 1;
        self.selected = None;
        self.last_created = None;
        self.invalidate_geometry();
        self.invalidate_bounds();
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            steps: self.steps.clone(),
            edges: self.edges.clone(),
        }
    }

    pub(crate) fn invalidate_geometry(&self) {
        if let Some(renderer) = &self.renderer {
            renderer.invalidate_geometry();
        }
    }

    pub(crate) fn invalidate_bounds(&self) {
        if let Some(renderer) = &self.renderer {
            renderer.invalidate_bounds();
        }
    }
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn def(id: &str) -> StepTypeDefinition {
        StepTypeDefinition::new(id, id.to_uppercase(), "process")
    }

    fn manual_graph() -> WorkflowGraph {
        WorkflowGraph::with_settings(GraphSettings {
            auto_connect: false,
            ..GraphSettings::default()
        })
    }

    fn add(graph: &mut WorkflowGraph, y: f64) -> StepId {
        graph.add_step(&def("click"), Position::new(0.0, y)).id.clone()
    }

    fn connect(graph: &mut WorkflowGraph, from: &str, to: &str) -> bool {
        graph
            .add_edge(Endpoint::output(from), Endpoint::input(to))
            .is_some()
    }

    fn pairs(graph: &WorkflowGraph) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = graph
            .edges()
            .iter()
            .map(|e| (e.from.step.clone(), e.to.step.clone()))
            .collect();
        pairs.sort();
        pairs
    }

    #[derive(Default)]
    struct CountingRenderer {
        geometry: AtomicUsize,
        bounds: AtomicUsize,
    }

    impl Renderer for CountingRenderer {
        fn invalidate_geometry(&self) {
            self.geometry.fetch_add(1, Ordering::SeqCst);
        }

        fn invalidate_bounds(&self) {
            self.bounds.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn add_step_seeds_defaults_and_sequential_ids() {
        let mut graph = manual_graph();
        let def =
            def("sort").with_field(crate::FieldSpec::select("order", "Order", ["asc", "desc"]));

        let first = graph.add_step(&def, Position::new(10.0, 20.0)).clone();
        let second = graph.add_step(&def, Position::new(10.0, 20.0)).clone();

        assert_eq!(first.id, "step_1");
        assert_eq!(second.id, "step_2");
        assert_eq!(first.label, "SORT");
        assert_eq!(first.properties["order"], serde_json::json!("asc"));
        assert_eq!(graph.last_created(), Some("step_2"));
    }

    #[test]
    fn add_edge_twice_yields_one_edge() {
        let mut graph = manual_graph();
        let a = add(&mut graph, 0.0);
        let b = add(&mut graph, 0.0);

        assert!(connect(&mut graph, &a, &b));
        assert!(!connect(&mut graph, &a, &b));
        assert_eq!(graph.edges().len(), 1);

        // the reverse direction is a different pair
        assert!(connect(&mut graph, &b, &a));
        assert_eq!(graph.edges().len(), 2);
    }

    #[test]
    fn self_loop_is_rejected() {
        let mut graph = manual_graph();
        let a = add(&mut graph, 0.0);
        assert!(!connect(&mut graph, &a, &a));
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let mut graph = manual_graph();
        let a = add(&mut graph, 0.0);
        assert!(!connect(&mut graph, &a, "step_99"));
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn remove_edge_by_id() {
        let mut graph = manual_graph();
        let a = add(&mut graph, 0.0);
        let b = add(&mut graph, 0.0);
        let id = graph
            .add_edge(Endpoint::output(&a), Endpoint::input(&b))
            .map(|e| e.id.clone())
            .unwrap();

        assert!(!graph.remove_edge("edge_missing"));
        assert!(graph.remove_edge(&id));
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn remove_step_rewires_linear_chain() {
        let mut graph = manual_graph();
        let a = add(&mut graph, 0.0);
        let x = add(&mut graph, 0.0);
        let b = add(&mut graph, 0.0);
        connect(&mut graph, &a, &x);
        connect(&mut graph, &x, &b);

        let removed = graph.remove_step(&x).unwrap();

        assert_eq!(removed.id, x);
        assert_eq!(graph.steps().len(), 2);
        assert_eq!(pairs(&graph), vec![(a, b)]);
    }

    #[test]
    fn remove_step_leaves_no_edge_touching_it() {
        let mut graph = manual_graph();
        let ids: Vec<_> = (0..5).map(|i| add(&mut graph, i as f64)).collect();
        for (i, from) in ids.iter().enumerate() {
            for to in &ids[i + 1..] {
                connect(&mut graph, from, to);
            }
        }

        for id in &ids {
            graph.remove_step(id);
            assert!(graph.edges().iter().all(|e| !e.touches(id)));
            assert!(graph
                .edges()
                .iter()
                .all(|e| graph.contains_step(&e.from.step) && graph.contains_step(&e.to.step)));
        }
        assert!(graph.steps().is_empty());
    }

    #[test]
    fn rewire_pairs_by_vertical_position() {
        let mut graph = manual_graph();
        let p_low = add(&mut graph, 300.0);
        let p_high = add(&mut graph, 100.0);
        let x = add(&mut graph, 200.0);
        let s_high = add(&mut graph, 50.0);
        let s_mid = add(&mut graph, 250.0);
        let s_low = add(&mut graph, 400.0);
        connect(&mut graph, &p_low, &x);
        connect(&mut graph, &p_high, &x);
        connect(&mut graph, &x, &s_low);
        connect(&mut graph, &x, &s_high);
        connect(&mut graph, &x, &s_mid);

        graph.remove_step(&x);

        // two predecessors, three successors: the lowest successor is left out
        let mut expected = vec![(p_high, s_high), (p_low, s_mid)];
        expected.sort();
        assert_eq!(pairs(&graph), expected);
        assert!(graph.edges().iter().all(|e| e.to.step != s_low));
    }

    #[test]
    fn rewire_skips_pairs_that_would_loop() {
        let mut graph = manual_graph();
        let a = add(&mut graph, 0.0);
        let x = add(&mut graph, 0.0);
        connect(&mut graph, &a, &x);
        connect(&mut graph, &x, &a);

        graph.remove_step(&x);
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn rewire_policies() {
        let build = |policy| {
            let mut graph = WorkflowGraph::with_settings(GraphSettings {
                auto_connect: false,
                rewire: policy,
            });
            let p1 = add(&mut graph, 0.0);
            let p2 = add(&mut graph, 10.0);
            let x = add(&mut graph, 5.0);
            let s1 = add(&mut graph, 0.0);
            let s2 = add(&mut graph, 10.0);
            connect(&mut graph, &p1, &x);
            connect(&mut graph, &p2, &x);
            connect(&mut graph, &x, &s1);
            connect(&mut graph, &x, &s2);
            graph.remove_step(&x);
            graph.edges().len()
        };

        assert_eq!(build(RewirePolicy::PairByPosition), 2);
        assert_eq!(build(RewirePolicy::AllPairs), 4);
        assert_eq!(build(RewirePolicy::DirectOnly), 0);
        assert_eq!(build(RewirePolicy::Disabled), 0);
    }

    #[test]
    fn remove_step_clears_references() {
        let mut graph = manual_graph();
        let a = add(&mut graph, 0.0);
        graph.select(Some(&a));
        assert_eq!(graph.selected(), Some(a.as_str()));

        graph.remove_step(&a);
        assert_eq!(graph.selected(), None);
        assert_eq!(graph.last_created(), None);
        assert!(graph.remove_step(&a).is_none());
    }

    #[test]
    fn place_step_auto_chains() {
        let mut graph = WorkflowGraph::new();
        let a = graph.place_step(&def("open_page"), Position::new(0.0, 0.0));
        let b = graph.place_step(&def("click"), Position::new(200.0, 0.0));
        let c = graph.place_step(&def("close_app"), Position::new(400.0, 0.0));

        assert_eq!(pairs(&graph), vec![(a, b.clone()), (b.clone(), c.clone())]);
        let edge = &graph.edges()[0];
        assert_eq!(edge.from.port, Port::East);
        assert_eq!(edge.to.port, Port::West);

        // deleting the tail restarts the chain
        assert_eq!(graph.last_created(), Some(c.as_str()));
        graph.remove_step(&c);
        let d = graph.place_step(&def("click"), Position::new(0.0, 0.0));
        assert!(!graph.has_edge(&b, &d));
    }

    #[test]
    fn mutations_notify_renderer() {
        let renderer = Arc::new(CountingRenderer::default());
        let mut graph = manual_graph().with_renderer(renderer.clone());

        let a = add(&mut graph, 0.0);
        let b = add(&mut graph, 0.0);
        connect(&mut graph, &a, &b);
        graph.move_step(&a, Position::new(5.0, 5.0));

        assert_eq!(renderer.geometry.load(Ordering::SeqCst), 2);
        assert_eq!(renderer.bounds.load(Ordering::SeqCst), 3);

        assert!(!graph.move_step("step_99", Position::default()));
        assert_eq!(renderer.geometry.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn snapshot_is_detached() {
        let mut graph = manual_graph();
        let a = add(&mut graph, 0.0);
        let snapshot = graph.snapshot();

        graph.set_property(&a, "selector", "#go");
        graph.remove_step(&a);

        assert_eq!(snapshot.steps.len(), 1);
        assert!(snapshot.step(&a).unwrap().properties.is_empty());
    }
}
