//! Attribute schemas describing what a resource or data source accepts and reports.
//!
//! A schema drives three things: validation of host-supplied configuration,
//! normalization of stored values (so sets round-trip identically), and the
//! plan diff (force-new, computed, and diff-suppressed attributes).

use crate::error::{ProviderError, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Predicate deciding that two non-identical values are equivalent.
pub type DiffSuppressFn = fn(old: &Value, new: &Value) -> bool;

#[derive(Debug, Clone)]
pub enum ValueType {
    String,
    Bool,
    Int,
    Float,
    /// String-to-string map.
    Map,
    List(Element),
    Set(Element),
}

#[derive(Debug, Clone)]
pub enum Element {
    String,
    Int,
    Block(Arc<Schema>),
}

#[derive(Clone)]
pub struct Attribute {
    pub value_type: ValueType,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub force_new: bool,
    pub sensitive: bool,
    pub default: Option<Value>,
    pub description: &'static str,
    pub deprecated: Option<&'static str>,
    pub max_items: Option<usize>,
    pub diff_suppress: Option<DiffSuppressFn>,
}

impl std::fmt::Debug for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute")
            .field("value_type", &self.value_type)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("computed", &self.computed)
            .field("force_new", &self.force_new)
            .field("sensitive", &self.sensitive)
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

impl Attribute {
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            sensitive: false,
            default: None,
            description: "",
            deprecated: None,
            max_items: None,
            diff_suppress: None,
        }
    }

    pub fn string() -> Self {
        Self::new(ValueType::String)
    }

    pub fn bool() -> Self {
        Self::new(ValueType::Bool)
    }

    pub fn int() -> Self {
        Self::new(ValueType::Int)
    }

    pub fn float() -> Self {
        Self::new(ValueType::Float)
    }

    pub fn map() -> Self {
        Self::new(ValueType::Map)
    }

    pub fn string_list() -> Self {
        Self::new(ValueType::List(Element::String))
    }

    pub fn string_set() -> Self {
        Self::new(ValueType::Set(Element::String))
    }

    pub fn block_list(schema: Schema) -> Self {
        Self::new(ValueType::List(Element::Block(Arc::new(schema))))
    }

    pub fn block_set(schema: Schema) -> Self {
        Self::new(ValueType::Set(Element::Block(Arc::new(schema))))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn deprecated(mut self, message: &'static str) -> Self {
        self.deprecated = Some(message);
        self
    }

    pub fn max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    pub fn suppress_diff(mut self, f: DiffSuppressFn) -> Self {
        self.diff_suppress = Some(f);
        self
    }

    /// Attributes the host may set in configuration.
    pub fn is_configurable(&self) -> bool {
        self.required || self.optional
    }

    pub fn block_schema(&self) -> Option<&Schema> {
        match &self.value_type {
            ValueType::List(Element::Block(s)) | ValueType::Set(Element::Block(s)) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub version: u32,
    pub attributes: BTreeMap<String, Attribute>,
}

impl Schema {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            attributes: BTreeMap::new(),
        }
    }

    pub fn attribute(mut self, name: &str, attribute: Attribute) -> Self {
        self.attributes.insert(name.to_string(), attribute);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Attribute)> {
        self.attributes.iter()
    }

    /// Validate a host configuration against the schema.
    pub fn validate_config(&self, config: &Map<String, Value>) -> Result<()> {
        self.validate_at("", config)
    }

    fn validate_at(&self, path: &str, config: &Map<String, Value>) -> Result<()> {
        let mut problems = Vec::new();

        for key in config.keys() {
            match self.attributes.get(key) {
                None => problems.push(format!("{}{}: unsupported attribute", path, key)),
                Some(attr) if !attr.is_configurable() && !config[key].is_null() => {
                    problems.push(format!("{}{}: attribute is computed", path, key))
                }
                _ => {}
            }
        }

        for (name, attr) in &self.attributes {
            let value = config.get(name).filter(|v| !v.is_null());
            match value {
                None if attr.required && attr.default.is_none() => {
                    problems.push(format!("{}{}: required attribute is missing", path, name))
                }
                None => {}
                Some(value) => {
                    if let Err(e) = check_type(&format!("{}{}", path, name), attr, value) {
                        problems.push(e);
                    }
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::invalid(problems.join("; ")))
        }
    }

    /// Fill in defaults for absent attributes, recursively for nested blocks.
    pub fn apply_defaults(&self, values: &mut Map<String, Value>) {
        for (name, attr) in &self.attributes {
            let absent = values.get(name).map_or(true, Value::is_null);
            if absent {
                if let Some(default) = &attr.default {
                    values.insert(name.clone(), default.clone());
                }
            }
            if let (Some(block), Some(Value::Array(items))) = (attr.block_schema(), values.get_mut(name)) {
                for item in items.iter_mut() {
                    if let Value::Object(fields) = item {
                        block.apply_defaults(fields);
                    }
                }
            }
        }
    }

    /// Normalize every attribute value in place.
    pub fn normalize(&self, values: &mut Map<String, Value>) {
        for (name, attr) in &self.attributes {
            if let Some(value) = values.get_mut(name) {
                *value = normalize_value(attr, value.take());
            }
        }
    }
}

fn check_type(path: &str, attr: &Attribute, value: &Value) -> std::result::Result<(), String> {
    let ok = match &attr.value_type {
        ValueType::String => value.is_string(),
        ValueType::Bool => value.is_boolean(),
        ValueType::Int => value.is_i64() || value.is_u64(),
        ValueType::Float => value.is_number(),
        ValueType::Map => value
            .as_object()
            .is_some_and(|m| m.values().all(|v| v.is_string() || v.is_number() || v.is_boolean())),
        ValueType::List(elem) | ValueType::Set(elem) => match value.as_array() {
            None => false,
            Some(items) => {
                if let Some(max) = attr.max_items {
                    if items.len() > max {
                        return Err(format!("{}: at most {} item(s) allowed", path, max));
                    }
                }
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{}.{}.", path, i);
                    match elem {
                        Element::String if !item.is_string() => {
                            return Err(format!("{}: expected a string element", path))
                        }
                        Element::Int if !(item.is_i64() || item.is_u64()) => {
                            return Err(format!("{}: expected an integer element", path))
                        }
                        Element::Block(schema) => {
                            let block = item
                                .as_object()
                                .ok_or_else(|| format!("{}: expected a block", path))?;
                            schema
                                .validate_at(&item_path, block)
                                .map_err(|e| e.to_string())?;
                        }
                        _ => {}
                    }
                }
                true
            }
        },
    };
    if ok {
        Ok(())
    } else {
        Err(format!("{}: expected {:?}", path, attr.value_type))
    }
}

/// Normalize a value according to its attribute: sets are deduplicated and
/// sorted, nested blocks get their defaults, maps become string maps.
pub fn normalize_value(attr: &Attribute, value: Value) -> Value {
    match (&attr.value_type, value) {
        (_, Value::Null) => Value::Null,
        (ValueType::Map, Value::Object(map)) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, Value::String(scalar_to_string(&v))))
                .collect(),
        ),
        (ValueType::List(Element::Block(schema)), Value::Array(items)) => Value::Array(
            items
                .into_iter()
                .map(|item| normalize_block(schema, item))
                .collect(),
        ),
        (ValueType::Set(elem), Value::Array(items)) => {
            let mut items: Vec<Value> = match elem {
                Element::Block(schema) => items
                    .into_iter()
                    .map(|item| normalize_block(schema, item))
                    .collect(),
                _ => items,
            };
            items.sort_by_key(sort_key);
            items.dedup();
            Value::Array(items)
        }
        (_, other) => other,
    }
}

fn normalize_block(schema: &Schema, item: Value) -> Value {
    match item {
        Value::Object(mut block) => {
            schema.apply_defaults(&mut block);
            schema.normalize(&mut block);
            Value::Object(block)
        }
        other => other,
    }
}

fn sort_key(value: &Value) -> (u8, String) {
    match value {
        Value::String(s) => (0, s.clone()),
        Value::Number(n) => (1, format!("{:>24}", n)),
        other => (2, format!("{:010}", set_hash(other))),
    }
}

pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Stable hash of a set element, computed over its canonical JSON encoding.
pub fn set_hash(value: &Value) -> u32 {
    let digest = Sha256::digest(canonical_json(value).as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// JSON encoding with object keys in sorted order.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            let fields: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_json(v)))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

/// True for null and for the zero value of every JSON type.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
    }
}
