//! Persisted flow format (import/export)

use crate::{
    Endpoint, ImportError, ImportIssue, Position, Properties, Step, StepId, TypeRegistry,
    WorkflowGraph,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

pub const FLOW_VERSION: &str = "1.0.0";

/// Exchanged flow document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDocument {
    pub version: String,
    pub steps: Vec<FlowStep>,
    pub edges: Vec<FlowEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowStep {
    pub id: StepId,
    pub type_id: String,
    pub position: FlowPosition,
    pub props: Properties,
}

/// Canvas position rounded to whole pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowPosition {
    pub x: i64,
    pub y: i64,
}

impl From<Position> for FlowPosition {
    fn from(position: Position) -> Self {
        Self {
            x: position.x.round() as i64,
            y: position.y.round() as i64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEdge {
    pub from: StepId,
    pub to: StepId,
}

/// Outcome of a partially successful import
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    pub imported: usize,
    /// Step entries that were skipped
    pub invalid: usize,
    pub dropped_edges: usize,
    pub issues: Vec<ImportIssue>,
}

impl ImportSummary {
    fn skip_step(&mut self, issue: ImportIssue) {
        tracing::warn!("{}", issue);
        self.invalid += 1;
        self.issues.push(issue);
    }

    fn drop_edge(&mut self, index: usize, reason: impl Into<String>) {
        let issue = ImportIssue::DroppedEdge {
            index,
            reason: reason.into(),
        };
        tracing::debug!("{}", issue);
        self.dropped_edges += 1;
        self.issues.push(issue);
    }
}

impl WorkflowGraph {
    pub fn to_flow(&self) -> FlowDocument {
        FlowDocument {
            version: FLOW_VERSION.to_string(),
            steps: self
                .steps
                .iter()
                .map(|s| FlowStep {
                    id: s.id.clone(),
                    type_id: s.type_id.clone(),
                    position: s.position.into(),
                    props: s.properties.clone(),
                })
                .collect(),
            edges: self
                .edges
                .iter()
                .map(|e| FlowEdge {
                    from: e.from.step.clone(),
                    to: e.to.step.clone(),
                })
                .collect(),
        }
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_flow())
    }

    /// Replace the graph with the flow in `text`.
    pub fn import_json(
        &mut self,
        text: &str,
        registry: &TypeRegistry,
    ) -> Result<ImportSummary, ImportError> {
        if text.trim().is_empty() {
            return Err(ImportError::Validation("empty payload".to_string()));
        }
        let payload: Json = serde_json::from_str(text)?;
        self.import_value(&payload, registry)
    }

    /// Replace the graph with the flow in `payload`.
    ///
    /// A payload that is not an object or has no `steps` array is rejected
    /// and the graph is left untouched. Otherwise bad step entries are
    /// skipped and counted, and edges that cannot be honored are dropped.
    pub fn import_value(
        &mut self,
        payload: &Json,
        registry: &TypeRegistry,
    ) -> Result<ImportSummary, ImportError> {
        let root = payload
            .as_object()
            .ok_or_else(|| ImportError::Validation("payload is not a JSON object".to_string()))?;
        let steps = root
            .get("steps")
            .and_then(Json::as_array)
            .ok_or_else(|| ImportError::Validation("payload has no steps array".to_string()))?;
        let edges = root
            .get("edges")
            .and_then(Json::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        match root.get("version").and_then(Json::as_str) {
            Some(FLOW_VERSION) => {}
            Some(other) => tracing::warn!("Importing flow version {} as {}", other, FLOW_VERSION),
            None => tracing::warn!("Flow has no version, assuming {}", FLOW_VERSION),
        }

        self.clear();
        // keep generated ids clear of explicit step_<n> ids
        self.seq = steps
            .iter()
            .filter_map(|s| s.get("id").and_then(Json::as_str))
            .filter_map(sequence_number)
            .filter_map(|n| n.checked_add(1))
            .max()
            .unwrap_or(1);

        let mut summary = ImportSummary::default();

        for (index, entry) in steps.iter().enumerate() {
            let Some(entry) = entry.as_object() else {
                summary.skip_step(ImportIssue::NotAnObject { index });
                continue;
            };

            let Some(type_id) = entry
                .get("typeId")
                .or_else(|| entry.get("type"))
                .and_then(Json::as_str)
                .filter(|t| !t.is_empty())
            else {
                summary.skip_step(ImportIssue::MissingType { index });
                continue;
            };

            let Some(def) = registry.get_def_by_id(type_id) else {
                summary.skip_step(ImportIssue::UnresolvedType {
                    index,
                    type_id: type_id.to_string(),
                });
                continue;
            };

            let id = match entry.get("id").and_then(Json::as_str).filter(|id| !id.is_empty()) {
                Some(id) => id.to_string(),
                None => self.next_step_id(),
            };
            if self.contains_step(&id) {
                summary.skip_step(ImportIssue::DuplicateId { index, id });
                continue;
            }

            let slot = summary.imported as f64;
            let position = entry.get("position");
            let coordinate = |axis: &str| position.and_then(|p| p.get(axis)).and_then(Json::as_f64);
            let position = Position::new(
                coordinate("x").unwrap_or(100.0 + slot * 200.0),
                coordinate("y").unwrap_or(100.0 + slot * 80.0),
            );

            let mut properties = def.default_properties();
            if let Some(props) = entry.get("props").and_then(Json::as_object) {
                properties.extend(props.iter().map(|(k, v)| (k.clone(), v.clone())));
            }

            self.steps.push(Step {
                id: id.clone(),
                type_id: def.id.clone(),
                label: def.name.clone(),
                category: def.category.clone(),
                position,
                properties,
            });
            self.last_created = Some(id);
            summary.imported += 1;
        }

        for (index, entry) in edges.iter().enumerate() {
            let (Some(from), Some(to)) = (
                entry.get("from").and_then(endpoint_step),
                entry.get("to").and_then(endpoint_step),
            ) else {
                summary.drop_edge(index, "missing endpoint");
                continue;
            };

            if !self.contains_step(from) || !self.contains_step(to) {
                summary.drop_edge(index, format!("{} -> {} references a missing step", from, to));
                continue;
            }

            if self
                .add_edge(Endpoint::output(from), Endpoint::input(to))
                .is_none()
            {
                summary.drop_edge(index, format!("{} -> {} is a self-loop or duplicate", from, to));
            }
        }

        tracing::info!(
            "Flow imported: {} valid steps, {} invalid, {} edges ({} dropped)",
            summary.imported,
            summary.invalid,
            self.edges.len(),
            summary.dropped_edges
        );
        if summary.invalid > 0 {
            tracing::warn!("{} step(s) could not be imported", summary.invalid);
        }
        self.invalidate_bounds();

        Ok(summary)
    }
}

/// Edge endpoints are plain step ids, or `{ "step": id, ... }` objects.
fn endpoint_step(value: &Json) -> Option<&str> {
    value
        .as_str()
        .or_else(|| value.get("step").and_then(Json::as_str))
}

fn sequence_number(id: &str) -> Option<u64> {
    id.strip_prefix("step_")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GraphSettings, StepTypeDefinition};
    use serde_json::json;

    fn manual_graph() -> WorkflowGraph {
        WorkflowGraph::with_settings(GraphSettings {
            auto_connect: false,
            ..GraphSettings::default()
        })
    }

    #[test]
    fn partial_import_counts_unknown_types() {
        let registry = TypeRegistry::builtin();
        let mut graph = manual_graph();
        let payload = json!({
            "version": "1.0.0",
            "steps": [
                { "id": "step_1", "typeId": "open_page", "position": { "x": 10, "y": 20 }, "props": { "url": "https://example.com" } },
                { "id": "step_2", "typeId": "teleport", "position": { "x": 30, "y": 20 }, "props": {} },
                { "id": "step_3", "typeId": "close_browser", "position": { "x": 50, "y": 20 }, "props": {} }
            ],
            "edges": [
                { "from": "step_1", "to": "step_2" },
                { "from": "step_1", "to": "step_3" }
            ]
        });

        let summary = graph.import_value(&payload, &registry).unwrap();

        assert_eq!(graph.steps().len(), 2);
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.dropped_edges, 1);
        assert_eq!(
            summary.issues[0],
            ImportIssue::UnresolvedType {
                index: 1,
                type_id: "teleport".to_string()
            }
        );
        assert!(graph.has_edge("step_1", "step_3"));
        assert_eq!(
            graph.step("step_1").unwrap().properties["url"],
            json!("https://example.com")
        );
    }

    #[test]
    fn malformed_payload_leaves_graph_untouched() {
        let registry = TypeRegistry::builtin();
        let mut graph = manual_graph();
        graph.add_step(registry.get_def_by_id("click").unwrap(), Position::default());

        for payload in [json!([1, 2, 3]), json!({ "edges": [] }), json!({ "steps": "nope" })] {
            assert!(matches!(
                graph.import_value(&payload, &registry),
                Err(ImportError::Validation(_))
            ));
        }
        assert!(matches!(
            graph.import_json("{ not json", &registry),
            Err(ImportError::Malformed(_))
        ));
        assert!(graph.import_json("  ", &registry).is_err());

        assert_eq!(graph.steps().len(), 1);
    }

    #[test]
    fn tolerant_entries() {
        let registry = TypeRegistry::builtin();
        let mut graph = manual_graph();
        let payload = json!({
            "version": "1.0.0",
            "steps": [
                "garbage",
                { "id": "step_7", "type": "click", "props": { "selector": "#go" } },
                { "typeId": "read_csv" },
                { "id": "step_7", "typeId": "close_app" },
                { "id": "step_9" }
            ],
            "edges": [
                { "from": { "step": "step_7", "port": "E" }, "to": { "step": "step_10", "port": "W" } },
                { "from": "step_7" },
                { "from": "step_7", "to": "step_7" },
                { "from": "step_7", "to": "step_10" }
            ]
        });

        let summary = graph.import_value(&payload, &registry).unwrap();

        assert_eq!(summary.imported, 2);
        assert_eq!(summary.invalid, 3);
        assert_eq!(summary.dropped_edges, 3);

        let click = graph.step("step_7").unwrap();
        assert_eq!(click.properties["selector"], json!("#go"));
        assert_eq!(click.properties["button"], json!("left"));
        assert_eq!(click.position, Position::new(100.0, 100.0));

        // generated id continues after the highest explicit one
        let csv = graph.step("step_10").unwrap();
        assert_eq!(csv.type_id, "read_csv");
        assert_eq!(csv.position, Position::new(300.0, 180.0));
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn export_shape_matches_format() {
        let def = StepTypeDefinition::new("open_page", "Open", "start")
            .with_field(crate::FieldSpec::url("url", "URL"));
        let mut graph = WorkflowGraph::new();
        graph.place_step(&def, Position::new(10.4, 20.6));
        graph.place_step(&def, Position::new(200.0, 20.0));

        let text = graph.export_json().unwrap();
        assert!(text.contains("\"x\": 10,"), "whole-pixel coordinates: {}", text);
        let exported: Json = serde_json::from_str(&text).unwrap();

        assert_eq!(
            exported,
            json!({
                "version": "1.0.0",
                "steps": [
                    { "id": "step_1", "typeId": "open_page", "position": { "x": 10, "y": 21 }, "props": { "url": "" } },
                    { "id": "step_2", "typeId": "open_page", "position": { "x": 200, "y": 20 }, "props": { "url": "" } }
                ],
                "edges": [ { "from": "step_1", "to": "step_2" } ]
            })
        );
    }

    #[test]
    fn exported_flow_imports_back() {
        let registry = TypeRegistry::builtin();
        let mut graph = WorkflowGraph::new();
        for id in ["open_page", "click", "close_browser"] {
            graph.place_step(registry.get_def_by_id(id).unwrap(), Position::new(0.0, 0.0));
        }
        let text = graph.export_json().unwrap();

        let mut restored = WorkflowGraph::new();
        let summary = restored.import_json(&text, &registry).unwrap();

        assert_eq!(summary.invalid, 0);
        assert_eq!(restored.to_flow(), graph.to_flow());
        assert_eq!(restored.last_created(), Some("step_3"));
    }

    #[test]
    fn sequence_ids_at_the_top_of_the_range() {
        let registry = TypeRegistry::builtin();
        let click = registry.get_def_by_id("click").unwrap();

        let mut graph = manual_graph();
        let summary = graph
            .import_json(
                r#"{ "steps": [ { "id": "step_18446744073709551615", "typeId": "click" } ] }"#,
                &registry,
            )
            .unwrap();
        assert_eq!(summary.imported, 1);
        assert_eq!(graph.add_step(click, Position::default()).id, "step_1");

        let mut graph = manual_graph();
        graph
            .import_json(
                r#"{ "steps": [ { "id": "step_18446744073709551614", "typeId": "click" } ] }"#,
                &registry,
            )
            .unwrap();
        let first = graph.add_step(click, Position::default()).id.clone();
        let second = graph.add_step(click, Position::default()).id.clone();
        assert_eq!(first, "step_18446744073709551615");
        assert_eq!(second, "step_1");
        assert_eq!(graph.steps().len(), 3);
    }
}
