use crate::{Properties, RegistryError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tokio::sync::OnceCell;

/// Category whose steps seed the run order when present in a graph.
pub const START_CATEGORY: &str = "start";

/// Input widget kind for a step property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Url,
    Select,
    Textarea,
}

/// One configurable property of a step type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl FieldSpec {
    pub fn new(key: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            field_type,
            required: false,
            options: None,
            placeholder: None,
        }
    }

    pub fn text(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(key, label, FieldType::Text)
    }

    pub fn url(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(key, label, FieldType::Url)
    }

    pub fn number(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(key, label, FieldType::Number)
    }

    pub fn select<I, S>(key: impl Into<String>, label: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut field = Self::new(key, label, FieldType::Select);
        field.options = Some(options.into_iter().map(Into::into).collect());
        field
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    /// Value a freshly placed step starts with: the first option for
    /// selects, an empty string otherwise.
    pub fn default_value(&self) -> serde_json::Value {
        match (&self.field_type, &self.options) {
            (FieldType::Select, Some(options)) if !options.is_empty() => {
                serde_json::Value::String(options[0].clone())
            }
            _ => serde_json::Value::String(String::new()),
        }
    }
}

/// Static definition of an automation step type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTypeDefinition {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub property_schema: Vec<FieldSpec>,
}

impl StepTypeDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            description: String::new(),
            property_schema: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.property_schema.push(field);
        self
    }

    pub fn default_properties(&self) -> Properties {
        self.property_schema
            .iter()
            .map(|field| (field.key.clone(), field.default_value()))
            .collect()
    }
}

/// Host call that reports which step types are currently enabled
#[async_trait]
pub trait EnabledSetProvider: Send + Sync {
    async fn enabled_types(&self) -> Result<Vec<String>, RegistryError>;
}

/// Catalog of step types with an optional host-supplied enabled filter
pub struct TypeRegistry {
    catalog: Vec<StepTypeDefinition>,
    enabled: OnceCell<Option<HashSet<String>>>,
}

impl TypeRegistry {
    /// Build a registry from a catalog. Duplicate ids are rejected.
    pub fn new(catalog: Vec<StepTypeDefinition>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for def in &catalog {
            if !seen.insert(def.id.as_str()) {
                return Err(RegistryError::DuplicateType(def.id.clone()));
            }
        }

        Ok(Self {
            catalog,
            enabled: OnceCell::new(),
        })
    }

    /// Registry over the built-in automation catalog
    pub fn builtin() -> Self {
        Self {
            catalog: crate::catalog::builtin_catalog(),
            enabled: OnceCell::new(),
        }
    }

    /// Restrict listing to `ids` without going through a provider
    pub fn with_enabled<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: HashSet<String> = ids.into_iter().map(Into::into).collect();
        let enabled = OnceCell::new_with(Some(Some(set)));
        Self { enabled, ..self }
    }

    /// Fetch the enabled set once and cache it for the registry's lifetime.
    ///
    /// A provider failure leaves every type enabled.
    pub async fn bootstrap(&self, provider: &dyn EnabledSetProvider) {
        self.enabled
            .get_or_init(|| async {
                match provider.enabled_types().await {
                    Ok(ids) => {
                        tracing::info!("Enabled step types: {}", ids.len());
                        Some(ids.into_iter().collect())
                    }
                    Err(e) => {
                        tracing::warn!("Could not fetch enabled step types, enabling all: {}", e);
                        None
                    }
                }
            })
            .await;
    }

    pub fn get_def_by_id(&self, id: &str) -> Option<&StepTypeDefinition> {
        self.catalog.iter().find(|def| def.id == id)
    }

    /// Definitions the host allows; the full catalog when no filter is set
    pub fn list_enabled(&self) -> Vec<&StepTypeDefinition> {
        match self.enabled.get() {
            Some(Some(set)) if !set.is_empty() => self
                .catalog
                .iter()
                .filter(|def| set.contains(&def.id))
                .collect(),
            _ => self.catalog.iter().collect(),
        }
    }

    pub fn list_by_category(&self) -> BTreeMap<String, Vec<&StepTypeDefinition>> {
        let mut groups: BTreeMap<String, Vec<&StepTypeDefinition>> = BTreeMap::new();
        for def in self.list_enabled() {
            groups.entry(def.category.clone()).or_default().push(def);
        }
        groups
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Read a JSON array of step type definitions
pub fn load_catalog_file(path: &Path) -> Result<Vec<StepTypeDefinition>, RegistryError> {
    let file = std::fs::File::open(path)?;
    let defs: Vec<StepTypeDefinition> = serde_json::from_reader(std::io::BufReader::new(file))?;
    tracing::debug!("Loaded {} step types from {}", defs.len(), path.display());
    Ok(defs)
}

/// Read every `*.json` catalog file in `dir`, in file name order
pub fn load_catalog_dir(dir: &Path) -> Result<Vec<StepTypeDefinition>, RegistryError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension() == Some("json".as_ref()) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut defs = Vec::new();
    for path in paths {
        defs.extend(load_catalog_file(&path)?);
    }
    Ok(defs)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider(Result<Vec<String>, String>);

    #[async_trait]
    impl EnabledSetProvider for FixedProvider {
        async fn enabled_types(&self) -> Result<Vec<String>, RegistryError> {
            self.0.clone().map_err(RegistryError::Provider)
        }
    }

    #[test]
    fn unknown_id_is_none() {
        let registry = TypeRegistry::builtin();
        assert!(registry.get_def_by_id("open_page").is_some());
        assert!(registry.get_def_by_id("does_not_exist").is_none());
    }

    #[test]
    fn no_filter_lists_whole_catalog() {
        let registry = TypeRegistry::builtin();
        assert_eq!(registry.list_enabled().len(), registry.len());
    }

    #[test]
    fn enabled_filter_restricts_listing_but_not_lookup() {
        let registry = TypeRegistry::builtin().with_enabled(["open_page", "read_csv"]);
        let ids: Vec<_> = registry.list_enabled().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["open_page", "read_csv"]);
        assert!(registry.get_def_by_id("click").is_some());

        let groups = registry.list_by_category();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["start"][0].id, "open_page");
        assert_eq!(groups["read"][0].id, "read_csv");
    }

    #[test]
    fn empty_enabled_set_lists_whole_catalog() {
        let registry = TypeRegistry::builtin().with_enabled(Vec::<String>::new());
        assert_eq!(registry.list_enabled().len(), registry.len());
        assert_eq!(registry.list_by_category().len(), 6);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let defs = vec![
            StepTypeDefinition::new("a", "A", "process"),
            StepTypeDefinition::new("a", "A again", "process"),
        ];
        assert!(matches!(
            TypeRegistry::new(defs),
            Err(RegistryError::DuplicateType(id)) if id == "a"
        ));
    }

    #[test]
    fn default_properties_follow_schema() {
        let def = StepTypeDefinition::new("click", "Click", "process")
            .with_field(FieldSpec::text("selector", "Selector"))
            .with_field(FieldSpec::select("button", "Button", ["left", "right"]).required());

        let props = def.default_properties();
        assert_eq!(props["selector"], serde_json::json!(""));
        assert_eq!(props["button"], serde_json::json!("left"));
    }

    #[tokio::test]
    async fn bootstrap_is_cached() {
        let registry = TypeRegistry::builtin();
        registry
            .bootstrap(&FixedProvider(Ok(vec!["click".to_string()])))
            .await;
        registry
            .bootstrap(&FixedProvider(Ok(vec!["open_page".to_string()])))
            .await;

        let ids: Vec<_> = registry.list_enabled().iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec!["click".to_string()]);
    }

    #[tokio::test]
    async fn provider_failure_enables_everything() {
        let registry = TypeRegistry::builtin();
        registry
            .bootstrap(&FixedProvider(Err("offline".to_string())))
            .await;
        assert_eq!(registry.list_enabled().len(), registry.len());
    }

    #[test]
    fn catalog_file_round_trips_through_loader() {
        let dir = std::env::temp_dir().join(format!("stepcore-catalog-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let defs = vec![StepTypeDefinition::new("ping", "Ping", "process")
            .with_field(FieldSpec::url("url", "URL").required())];
        std::fs::write(dir.join("extra.json"), serde_json::to_string(&defs).unwrap()).unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let loaded = load_catalog_dir(&dir).unwrap();
        assert_eq!(loaded, defs);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
