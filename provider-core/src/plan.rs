//! Drift detection: compare desired configuration with observed state.

use crate::error::Result;
use crate::schema::{is_empty_value, Schema, ValueType};
use crate::state::ResourceState;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Nothing is stored (or the stored object vanished): create it.
    Create,
    NoOp,
    Update {
        changed: Vec<String>,
    },
    /// At least one force-new attribute changed: destroy and recreate.
    Replace {
        changed: Vec<String>,
        force_new: Vec<String>,
    },
}

impl Plan {
    pub fn is_noop(&self) -> bool {
        matches!(self, Plan::NoOp)
    }
}

pub fn diff(schema: &Schema, observed: Option<&ResourceState>, config: &Map<String, Value>) -> Result<Plan> {
    schema.validate_config(config)?;
    let Some(observed) = observed else {
        return Ok(Plan::Create);
    };

    let mut desired = config.clone();
    schema.apply_defaults(&mut desired);
    schema.normalize(&mut desired);
    let mut current = observed.attributes.clone();
    schema.normalize(&mut current);

    let mut changed = Vec::new();
    let mut force_new = Vec::new();
    for (name, attr) in schema.iter() {
        if !attr.is_configurable() {
            continue;
        }
        let want = desired.get(name).unwrap_or(&Value::Null);
        let have = current.get(name).unwrap_or(&Value::Null);
        if attr.computed && want.is_null() {
            continue;
        }
        let same = match attr.value_type {
            ValueType::Set(_) => sets_equivalent(want, have),
            _ => values_equivalent(want, have),
        };
        if same {
            continue;
        }
        if let Some(suppress) = attr.diff_suppress {
            if suppress(have, want) {
                continue;
            }
        }
        changed.push(name.clone());
        if attr.force_new {
            force_new.push(name.clone());
        }
    }

    Ok(if changed.is_empty() {
        Plan::NoOp
    } else if force_new.is_empty() {
        Plan::Update { changed }
    } else {
        Plan::Replace { changed, force_new }
    })
}

/// Absent and zero values compare equal at every depth.
fn values_equivalent(a: &Value, b: &Value) -> bool {
    if a == b || (is_empty_value(a) && is_empty_value(b)) {
        return true;
    }
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => x.keys().chain(y.keys()).all(|k| {
            values_equivalent(x.get(k).unwrap_or(&Value::Null), y.get(k).unwrap_or(&Value::Null))
        }),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| values_equivalent(p, q))
        }
        _ => false,
    }
}

/// Set elements match regardless of position.
fn sets_equivalent(a: &Value, b: &Value) -> bool {
    match (a.as_array(), b.as_array()) {
        (Some(x), Some(y)) if x.len() == y.len() => {
            let mut unmatched: Vec<&Value> = y.iter().collect();
            x.iter().all(|item| {
                match unmatched.iter().position(|candidate| values_equivalent(item, candidate)) {
                    Some(i) => {
                        unmatched.swap_remove(i);
                        true
                    }
                    None => false,
                }
            })
        }
        _ => values_equivalent(a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(0)
            .attribute("name", Attribute::string().required().force_new())
            .attribute("description", Attribute::string().optional())
            .attribute("datacenters", Attribute::string_set().optional())
            .attribute("accessor_id", Attribute::string().optional().computed())
            .attribute(
                "rules",
                Attribute::string()
                    .optional()
                    .suppress_diff(|old, new| old.as_str().map(str::trim) == new.as_str().map(str::trim)),
            )
    }

    fn state(v: Value) -> ResourceState {
        ResourceState::new("id", 0, v.as_object().cloned().unwrap())
    }

    fn cfg(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_no_state_means_create() {
        assert_eq!(diff(&schema(), None, &cfg(json!({"name": "p"}))).unwrap(), Plan::Create);
    }

    #[test]
    fn test_noop_ignores_set_order_and_empty_values() {
        let observed = state(json!({"name": "p", "datacenters": ["dc2", "dc1"], "description": ""}));
        let plan = diff(
            &schema(),
            Some(&observed),
            &cfg(json!({"name": "p", "datacenters": ["dc1", "dc2"]})),
        )
        .unwrap();
        assert!(plan.is_noop());
    }

    #[test]
    fn test_update_and_replace() {
        let observed = state(json!({"name": "p", "description": "a", "accessor_id": "x"}));
        let plan = diff(&schema(), Some(&observed), &cfg(json!({"name": "p", "description": "b"}))).unwrap();
        assert_eq!(plan, Plan::Update { changed: vec!["description".into()] });

        let plan = diff(&schema(), Some(&observed), &cfg(json!({"name": "q", "description": "a"}))).unwrap();
        assert_eq!(
            plan,
            Plan::Replace { changed: vec!["name".into()], force_new: vec!["name".into()] }
        );
    }

    #[test]
    fn test_diff_suppress() {
        let observed = state(json!({"name": "p", "rules": "node \"\" {}\n"}));
        let plan = diff(&schema(), Some(&observed), &cfg(json!({"name": "p", "rules": "node \"\" {}"}))).unwrap();
        assert!(plan.is_noop());
    }

    #[test]
    fn test_block_sets_ignore_position_and_absent_fields() {
        let schema = Schema::new(0).attribute(
            "key",
            Attribute::block_set(
                Schema::new(0)
                    .attribute("name", Attribute::string().optional())
                    .attribute("path", Attribute::string().required())
                    .attribute("value", Attribute::string().optional()),
            )
            .optional(),
        );
        let observed = state(json!({"key": [
            {"name": "", "path": "b", "value": "2"},
            {"name": "a", "path": "a", "value": ""}
        ]}));
        let desired = cfg(json!({"key": [{"name": "a", "path": "a"}, {"path": "b", "value": "2"}]}));
        assert!(diff(&schema, Some(&observed), &desired).unwrap().is_noop());

        let desired = cfg(json!({"key": [{"name": "a", "path": "a"}, {"path": "b", "value": "3"}]}));
        assert!(!diff(&schema, Some(&observed), &desired).unwrap().is_noop());
    }
}
