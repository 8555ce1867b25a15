//! The host-persisted state bag and the handler-facing view over it.

use crate::error::{ProviderError, Result};
use crate::schema::{is_empty_value, normalize_value, scalar_to_string, Schema, ValueType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Opaque state the host stores between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: String,
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, schema_version: u32, attributes: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            schema_version,
            attributes,
        }
    }

    /// Attributes safe to show outside the state store: sensitive ones are dropped.
    pub fn exported(&self, schema: &Schema) -> Map<String, Value> {
        self.attributes
            .iter()
            .filter(|(k, _)| schema.get(k).map_or(true, |a| !a.sensitive))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Typed accessors shared by the top-level data and nested blocks.
///
/// Absent and null attributes read as the zero value of their type.
pub trait AttrRead {
    fn raw(&self, key: &str) -> Option<&Value>;

    fn value(&self, key: &str) -> Option<&Value> {
        self.raw(key).filter(|v| !v.is_null())
    }

    fn str(&self, key: &str) -> &str {
        self.value(key).and_then(Value::as_str).unwrap_or("")
    }

    /// The string value, or `None` when absent or empty.
    fn opt_str(&self, key: &str) -> Option<&str> {
        Some(self.str(key)).filter(|s| !s.is_empty())
    }

    fn string(&self, key: &str) -> String {
        self.str(key).to_string()
    }

    fn bool(&self, key: &str) -> bool {
        self.value(key).and_then(Value::as_bool).unwrap_or(false)
    }

    fn int(&self, key: &str) -> i64 {
        self.value(key).and_then(Value::as_i64).unwrap_or(0)
    }

    fn float(&self, key: &str) -> f64 {
        self.value(key).and_then(Value::as_f64).unwrap_or(0.0)
    }

    fn strings(&self, key: &str) -> Vec<String> {
        self.value(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn string_map(&self, key: &str) -> BTreeMap<String, String> {
        self.value(key)
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .map(|(k, v)| (k.clone(), scalar_to_string(v)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn blocks(&self, key: &str) -> Vec<Block<'_>> {
        self.value(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_object().map(Block::new))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn block(&self, key: &str) -> Option<Block<'_>> {
        self.blocks(key).into_iter().next()
    }

    fn is_set(&self, key: &str) -> bool {
        self.value(key).is_some_and(|v| !is_empty_value(v))
    }
}

/// A nested block inside a list or set attribute.
#[derive(Debug, Clone, Copy)]
pub struct Block<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Block<'a> {
    pub fn new(map: &'a Map<String, Value>) -> Self {
        Self { map }
    }

    pub fn as_map(&self) -> &'a Map<String, Value> {
        self.map
    }
}

impl AttrRead for Block<'_> {
    fn raw(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }
}

/// What a handler sees: the current values (desired on create/update, stored
/// on read), the prior values for change detection, and the identifier.
#[derive(Debug, Clone)]
pub struct ResourceData {
    schema: Arc<Schema>,
    id: Option<String>,
    values: Map<String, Value>,
    prior: Map<String, Value>,
    partial: bool,
}

impl ResourceData {
    /// Data for a create or a data-source read: validated config plus defaults.
    pub fn from_config(schema: Arc<Schema>, config: Map<String, Value>) -> Result<Self> {
        schema.validate_config(&config)?;
        let mut values = config;
        schema.apply_defaults(&mut values);
        schema.normalize(&mut values);
        Ok(Self {
            schema,
            id: None,
            values,
            prior: Map::new(),
            partial: false,
        })
    }

    /// Data for a read of previously stored state.
    pub fn from_state(schema: Arc<Schema>, state: &ResourceState) -> Self {
        let mut values = state.attributes.clone();
        schema.normalize(&mut values);
        Self {
            schema,
            id: Some(state.id.clone()).filter(|id| !id.is_empty()),
            prior: values.clone(),
            values,
            partial: false,
        }
    }

    /// Data for an update: the new config, with computed values carried over
    /// from the prior state where the config leaves them unset.
    pub fn for_update(
        schema: Arc<Schema>,
        prior: &ResourceState,
        config: Map<String, Value>,
    ) -> Result<Self> {
        let mut data = Self::from_config(schema, config)?;
        let mut prior_values = prior.attributes.clone();
        data.schema.normalize(&mut prior_values);
        for (name, attr) in &data.schema.attributes {
            let unset = data.values.get(name).map_or(true, Value::is_null);
            if attr.computed && unset {
                if let Some(v) = prior_values.get(name) {
                    data.values.insert(name.clone(), v.clone());
                }
            }
        }
        data.prior = prior_values;
        data.id = Some(prior.id.clone()).filter(|id| !id.is_empty());
        Ok(data)
    }

    /// Data for an import: only the identifier is known.
    pub fn for_import(schema: Arc<Schema>, id: impl Into<String>) -> Self {
        Self {
            schema,
            id: Some(id.into()),
            values: Map::new(),
            prior: Map::new(),
            partial: false,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.id = Some(id).filter(|id| !id.is_empty());
    }

    /// Record the object as absent; the host will plan a re-creation.
    pub fn clear_id(&mut self) {
        self.id = None;
    }

    pub fn is_absent(&self) -> bool {
        self.id.is_none()
    }

    /// Ask the dispatcher to persist the identifier even if the operation fails.
    pub fn set_partial(&mut self, partial: bool) {
        self.partial = partial;
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn get_change(&self, key: &str) -> (Option<&Value>, Option<&Value>) {
        (
            self.prior.get(key).filter(|v| !v.is_null()),
            self.values.get(key).filter(|v| !v.is_null()),
        )
    }

    pub fn has_change(&self, key: &str) -> bool {
        match self.get_change(key) {
            (None, None) => false,
            (Some(old), None) | (None, Some(old)) => !is_empty_value(old),
            (Some(old), Some(new)) => old != new,
        }
    }

    pub fn prior(&self) -> Block<'_> {
        Block::new(&self.prior)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn writer(&mut self) -> StateWriter<'_> {
        StateWriter {
            data: self,
            errors: Vec::new(),
        }
    }

    /// The state to persist, or `None` when the object is absent.
    pub fn into_state(self) -> Option<ResourceState> {
        let version = self.schema.version;
        self.id
            .map(|id| ResourceState::new(id, version, self.values))
    }

    /// Persistable state regardless of the partial flag; used when an
    /// operation fails after recording its identifier.
    pub fn partial_state(&self) -> Option<ResourceState> {
        if !self.partial {
            return None;
        }
        self.id
            .clone()
            .map(|id| ResourceState::new(id, self.schema.version, self.values.clone()))
    }
}

impl AttrRead for ResourceData {
    fn raw(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

/// Collects attribute assignments and reports every failure at once.
pub struct StateWriter<'a> {
    data: &'a mut ResourceData,
    errors: Vec<String>,
}

impl StateWriter<'_> {
    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> &mut Self {
        match serde_json::to_value(value) {
            Ok(value) => self.store(key, value),
            Err(e) => self.errors.push(format!("{}: {}", key, e)),
        }
        self
    }

    /// Encode the value as a JSON string and store that.
    pub fn set_json<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> &mut Self {
        match serde_json::to_string(value) {
            Ok(text) => self.store(key, Value::String(text)),
            Err(e) => self.errors.push(format!("{}: {}", key, e)),
        }
        self
    }

    fn store(&mut self, key: &str, value: Value) {
        let Some(attr) = self.data.schema.get(key) else {
            self.errors
                .push(format!("{}: attribute is not declared in the schema", key));
            return;
        };
        let type_ok = match (&attr.value_type, &value) {
            (_, Value::Null) => true,
            (ValueType::String, v) => v.is_string(),
            (ValueType::Bool, v) => v.is_boolean(),
            (ValueType::Int, v) => v.is_i64() || v.is_u64(),
            (ValueType::Float, v) => v.is_number(),
            (ValueType::Map, v) => v.is_object(),
            (ValueType::List(_) | ValueType::Set(_), v) => v.is_array(),
        };
        if !type_ok {
            self.errors.push(format!(
                "{}: value does not match declared type {:?}",
                key, attr.value_type
            ));
            return;
        }
        let value = normalize_value(attr, value);
        self.data.values.insert(key.to_string(), value);
    }

    pub fn finish(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::internal(format!(
                "failed to set attributes: {}",
                self.errors.join("; ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use serde_json::json;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::new(1)
                .attribute("name", Attribute::string().required())
                .attribute("flags", Attribute::int().optional().default(0))
                .attribute("tags", Attribute::string_set().optional())
                .attribute("secret", Attribute::string().computed().sensitive())
                .attribute("config_json", Attribute::string().optional()),
        )
    }

    fn config(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_from_config_applies_defaults() {
        let data = ResourceData::from_config(schema(), config(json!({"name": "a"}))).unwrap();
        assert_eq!(data.int("flags"), 0);
        assert_eq!(data.value("flags"), Some(&json!(0)));
        assert!(data.is_absent());
    }

    #[test]
    fn test_writer_aggregates_errors() {
        let mut data = ResourceData::from_config(schema(), config(json!({"name": "a"}))).unwrap();
        let mut w = data.writer();
        w.set("undeclared", "x");
        w.set("flags", "not a number");
        w.set("name", "b");
        let err = w.finish().unwrap_err().to_string();
        assert!(err.contains("undeclared"));
        assert!(err.contains("flags"));
        assert_eq!(data.str("name"), "b");
    }

    #[test]
    fn test_set_json_stores_text() {
        let mut data = ResourceData::from_config(schema(), config(json!({"name": "a"}))).unwrap();
        let mut w = data.writer();
        w.set_json("config_json", &json!({"Protocol": "http"}));
        w.finish().unwrap();
        assert_eq!(data.str("config_json"), r#"{"Protocol":"http"}"#);
    }

    #[test]
    fn test_exported_drops_sensitive() {
        let mut attrs = Map::new();
        attrs.insert("name".into(), json!("a"));
        attrs.insert("secret".into(), json!("s3cr3t"));
        let state = ResourceState::new("id", 1, attrs);
        let exported = state.exported(&schema());
        assert!(exported.contains_key("name"));
        assert!(!exported.contains_key("secret"));
    }

    #[test]
    fn test_for_update_tracks_changes_and_keeps_computed() {
        let mut attrs = Map::new();
        attrs.insert("name".into(), json!("a"));
        attrs.insert("flags".into(), json!(0));
        attrs.insert("secret".into(), json!("s"));
        let prior = ResourceState::new("id-1", 1, attrs);
        let data =
            ResourceData::for_update(schema(), &prior, config(json!({"name": "b"}))).unwrap();
        assert!(data.has_change("name"));
        assert!(!data.has_change("flags"));
        assert_eq!(data.str("secret"), "s");
        assert_eq!(data.id(), "id-1");
    }

    #[test]
    fn test_clear_id_yields_no_state() {
        let state = ResourceState::new("x", 1, Map::new());
        let mut data = ResourceData::from_state(schema(), &state);
        data.clear_id();
        assert!(data.into_state().is_none());
    }
}
