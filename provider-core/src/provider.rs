//! Registry and dispatcher: routes host callbacks to the registered handlers.

use crate::error::{Operation, OperationError, ProviderError};
use crate::metrics::record_operation;
use crate::plan::{diff, Plan};
use crate::resource::{DataSource, Resource};
use crate::schema::Schema;
use crate::state::{ResourceData, ResourceState};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

struct RegisteredResource<M: Sync> {
    handler: Arc<dyn Resource<M>>,
    schema: Arc<Schema>,
}

struct RegisteredDataSource<M: Sync> {
    handler: Arc<dyn DataSource<M>>,
    schema: Arc<Schema>,
}

/// Result of [`Provider::reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub plan: Plan,
    /// `None` only if the object vanished again between apply and re-read.
    pub state: Option<ResourceState>,
}

pub struct Provider<M: Sync> {
    resources: BTreeMap<String, RegisteredResource<M>>,
    data_sources: BTreeMap<String, RegisteredDataSource<M>>,
}

impl<M: Sync> Default for Provider<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Sync> Provider<M> {
    pub fn new() -> Self {
        Self {
            resources: BTreeMap::new(),
            data_sources: BTreeMap::new(),
        }
    }

    pub fn register_resource(&mut self, name: &str, handler: impl Resource<M> + 'static) -> &mut Self {
        let schema = Arc::new(handler.schema());
        self.resources.insert(
            name.to_string(),
            RegisteredResource {
                handler: Arc::new(handler),
                schema,
            },
        );
        self
    }

    pub fn register_data_source(
        &mut self,
        name: &str,
        handler: impl DataSource<M> + 'static,
    ) -> &mut Self {
        let schema = Arc::new(handler.schema());
        self.data_sources.insert(
            name.to_string(),
            RegisteredDataSource {
                handler: Arc::new(handler),
                schema,
            },
        );
        self
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn data_source_types(&self) -> impl Iterator<Item = &str> {
        self.data_sources.keys().map(String::as_str)
    }

    pub fn resource_schema(&self, resource_type: &str) -> Option<&Schema> {
        self.resources.get(resource_type).map(|r| r.schema.as_ref())
    }

    pub fn data_source_schema(&self, data_source: &str) -> Option<&Schema> {
        self.data_sources.get(data_source).map(|r| r.schema.as_ref())
    }

    fn resource(
        &self,
        resource_type: &str,
        operation: Operation,
        id: &str,
    ) -> Result<&RegisteredResource<M>, OperationError> {
        self.resources.get(resource_type).ok_or_else(|| {
            OperationError::new(
                resource_type,
                operation,
                id,
                ProviderError::invalid(format!("unknown resource type {:?}", resource_type)),
            )
        })
    }

    #[instrument(skip(self, meta, config), fields(resource = %resource_type))]
    pub async fn create(
        &self,
        meta: &M,
        resource_type: &str,
        config: Map<String, Value>,
    ) -> Result<ResourceState, OperationError> {
        let entry = self.resource(resource_type, Operation::Create, "")?;
        let started = Instant::now();
        let fail = |id: &str, e: ProviderError| {
            record_operation(resource_type, "create", e.kind().as_str(), started.elapsed());
            OperationError::new(resource_type, Operation::Create, id, e)
        };

        let mut data = ResourceData::from_config(entry.schema.clone(), config).map_err(|e| fail("", e))?;

        if let Err(e) = entry.handler.create(meta, &mut data).await {
            let mut err = fail(data.id(), e);
            err.partial = data.partial_state().map(Box::new);
            return Err(err);
        }

        let id = data.id().to_string();
        let state = data.into_state().ok_or_else(|| {
            fail(
                "",
                ProviderError::internal("create completed without recording an identifier"),
            )
        })?;

        record_operation(resource_type, "create", "ok", started.elapsed());
        info!(id = %id, "Resource created");
        Ok(state)
    }

    /// Refresh stored state. `Ok(None)` means the object no longer exists.
    #[instrument(skip(self, meta, state), fields(resource = %resource_type, id = %state.id))]
    pub async fn read(
        &self,
        meta: &M,
        resource_type: &str,
        state: ResourceState,
    ) -> Result<Option<ResourceState>, OperationError> {
        let entry = self.resource(resource_type, Operation::Read, &state.id)?;
        let started = Instant::now();
        let id = state.id.clone();

        let state = self.upgrade_state(resource_type, state)?;
        let mut data = ResourceData::from_state(entry.schema.clone(), &state);

        match entry.handler.read(meta, &mut data).await {
            Ok(()) => {
                let observed = data.into_state();
                let outcome = if observed.is_some() { "ok" } else { "absent" };
                record_operation(resource_type, "read", outcome, started.elapsed());
                if observed.is_none() {
                    warn!(id = %id, "Resource not found upstream, removing from state");
                }
                Ok(observed)
            }
            Err(e) if e.is_not_found() => {
                record_operation(resource_type, "read", "absent", started.elapsed());
                warn!(id = %id, error = %e, "Resource not found upstream, removing from state");
                Ok(None)
            }
            Err(e) => {
                record_operation(resource_type, "read", e.kind().as_str(), started.elapsed());
                Err(OperationError::new(resource_type, Operation::Read, id, e))
            }
        }
    }

    #[instrument(skip(self, meta, prior, config), fields(resource = %resource_type, id = %prior.id))]
    pub async fn update(
        &self,
        meta: &M,
        resource_type: &str,
        prior: ResourceState,
        config: Map<String, Value>,
    ) -> Result<ResourceState, OperationError> {
        let entry = self.resource(resource_type, Operation::Update, &prior.id)?;
        let started = Instant::now();
        let id = prior.id.clone();
        let fail = |e: ProviderError| {
            record_operation(resource_type, "update", e.kind().as_str(), started.elapsed());
            OperationError::new(resource_type, Operation::Update, id.clone(), e)
        };

        let prior = self.upgrade_state(resource_type, prior)?;
        let mut data =
            ResourceData::for_update(entry.schema.clone(), &prior, config).map_err(&fail)?;
        entry.handler.update(meta, &mut data).await.map_err(&fail)?;

        let state = data.into_state().ok_or_else(|| {
            fail(ProviderError::not_found(
                "object disappeared while it was being updated",
            ))
        })?;
        record_operation(resource_type, "update", "ok", started.elapsed());
        info!("Resource updated");
        Ok(state)
    }

    /// Delete the object. An object that is already gone counts as deleted.
    #[instrument(skip(self, meta, state), fields(resource = %resource_type, id = %state.id))]
    pub async fn delete(
        &self,
        meta: &M,
        resource_type: &str,
        state: ResourceState,
    ) -> Result<(), OperationError> {
        let entry = self.resource(resource_type, Operation::Delete, &state.id)?;
        let started = Instant::now();
        let state = self.upgrade_state(resource_type, state)?;
        let mut data = ResourceData::from_state(entry.schema.clone(), &state);

        match entry.handler.delete(meta, &mut data).await {
            Ok(()) => {
                record_operation(resource_type, "delete", "ok", started.elapsed());
                info!("Resource deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                record_operation(resource_type, "delete", "absent", started.elapsed());
                debug!(error = %e, "Resource already absent");
                Ok(())
            }
            Err(e) => {
                record_operation(resource_type, "delete", e.kind().as_str(), started.elapsed());
                Err(OperationError::new(resource_type, Operation::Delete, state.id, e))
            }
        }
    }

    /// Adopt an existing object by identifier. `Ok(None)` if it does not exist.
    #[instrument(skip(self, meta), fields(resource = %resource_type))]
    pub async fn import(
        &self,
        meta: &M,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<ResourceState>, OperationError> {
        let entry = self.resource(resource_type, Operation::Import, id)?;
        let fail = |e: ProviderError| OperationError::new(resource_type, Operation::Import, id, e);
        if !entry.handler.importable() {
            return Err(fail(ProviderError::invalid(format!(
                "{} does not support import",
                resource_type
            ))));
        }

        let mut data = ResourceData::for_import(entry.schema.clone(), id);
        entry.handler.import(meta, &mut data).await.map_err(fail)?;
        match entry.handler.read(meta, &mut data).await {
            Ok(()) => Ok(data.into_state()),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(fail(e)),
        }
    }

    pub fn plan(
        &self,
        resource_type: &str,
        observed: Option<&ResourceState>,
        config: &Map<String, Value>,
    ) -> Result<Plan, OperationError> {
        let id = observed.map(|s| s.id.as_str()).unwrap_or("");
        let entry = self.resource(resource_type, Operation::Plan, id)?;
        diff(&entry.schema, observed, config)
            .map_err(|e| OperationError::new(resource_type, Operation::Plan, id, e))
    }

    /// Bring one object to its desired configuration: refresh, diff, then
    /// create, update, or replace. Objects deleted out of band are re-created.
    pub async fn reconcile(
        &self,
        meta: &M,
        resource_type: &str,
        stored: Option<ResourceState>,
        config: Map<String, Value>,
    ) -> Result<Reconciled, OperationError> {
        let observed = match stored {
            Some(state) => self.read(meta, resource_type, state).await?,
            None => None,
        };

        let plan = self.plan(resource_type, observed.as_ref(), &config)?;
        debug!(resource = %resource_type, plan = ?plan, "Planned reconciliation");

        let state = match (&plan, observed) {
            (Plan::NoOp, observed) => observed,
            (Plan::Create, _) | (_, None) => Some(self.create(meta, resource_type, config).await?),
            (Plan::Update { .. }, Some(observed)) => {
                Some(self.update(meta, resource_type, observed, config).await?)
            }
            (Plan::Replace { .. }, Some(observed)) => {
                self.delete(meta, resource_type, observed).await?;
                Some(self.create(meta, resource_type, config).await?)
            }
        };

        Ok(Reconciled { plan, state })
    }

    /// Run the handler's migrations until the state matches the current schema version.
    pub fn upgrade_state(
        &self,
        resource_type: &str,
        mut state: ResourceState,
    ) -> Result<ResourceState, OperationError> {
        let entry = self.resource(resource_type, Operation::Upgrade, &state.id)?;
        while state.schema_version < entry.schema.version {
            let from = state.schema_version;
            state.attributes = entry
                .handler
                .migrate_state(from, std::mem::take(&mut state.attributes))
                .map_err(|e| {
                    OperationError::new(resource_type, Operation::Upgrade, state.id.clone(), e)
                })?;
            state.schema_version = from + 1;
            info!(resource = %resource_type, id = %state.id, from, to = from + 1, "Upgraded stored state");
        }
        Ok(state)
    }

    #[instrument(skip(self, meta, config), fields(data_source = %data_source))]
    pub async fn read_data_source(
        &self,
        meta: &M,
        data_source: &str,
        config: Map<String, Value>,
    ) -> Result<ResourceState, OperationError> {
        let fail = |e: ProviderError| OperationError::new(data_source, Operation::ReadData, "", e);
        let entry = self.data_sources.get(data_source).ok_or_else(|| {
            fail(ProviderError::invalid(format!(
                "unknown data source {:?}",
                data_source
            )))
        })?;
        let started = Instant::now();

        let mut data = ResourceData::from_config(entry.schema.clone(), config).map_err(fail)?;
        if let Err(e) = entry.handler.read(meta, &mut data).await {
            record_operation(data_source, "read-data", e.kind().as_str(), started.elapsed());
            return Err(fail(e));
        }
        record_operation(data_source, "read-data", "ok", started.elapsed());
        data.into_state().ok_or_else(|| {
            fail(ProviderError::internal(
                "data source read completed without recording an identifier",
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, Result};
    use crate::schema::Attribute;
    use crate::state::AttrRead;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory store standing in for a remote API.
    #[derive(Default)]
    struct Store {
        objects: Mutex<HashMap<String, String>>,
    }

    struct NoteResource;

    #[async_trait]
    impl Resource<Store> for NoteResource {
        fn schema(&self) -> Schema {
            Schema::new(1)
                .attribute("name", Attribute::string().required().force_new())
                .attribute("body", Attribute::string().optional())
                .attribute("token", Attribute::string().computed().sensitive())
        }

        async fn create(&self, meta: &Store, d: &mut ResourceData) -> Result<()> {
            let name = d.string("name");
            meta.objects.lock().unwrap().insert(name.clone(), d.string("body"));
            d.set_id(name);
            let mut w = d.writer();
            w.set("token", "secret-value");
            w.finish()?;
            self.read(meta, d).await
        }

        async fn read(&self, meta: &Store, d: &mut ResourceData) -> Result<()> {
            let body = meta.objects.lock().unwrap().get(d.id()).cloned();
            match body {
                None => d.clear_id(),
                Some(body) => {
                    let name = d.id().to_string();
                    let mut w = d.writer();
                    w.set("name", &name).set("body", &body);
                    w.finish()?;
                }
            }
            Ok(())
        }

        async fn update(&self, meta: &Store, d: &mut ResourceData) -> Result<()> {
            meta.objects
                .lock()
                .unwrap()
                .insert(d.id().to_string(), d.string("body"));
            self.read(meta, d).await
        }

        async fn delete(&self, meta: &Store, d: &mut ResourceData) -> Result<()> {
            match meta.objects.lock().unwrap().remove(d.id()) {
                Some(_) => Ok(()),
                None => Err(ProviderError::not_found("no such note")),
            }
        }

        fn migrate_state(&self, from: u32, mut attrs: Map<String, Value>) -> Result<Map<String, Value>> {
            assert_eq!(from, 0);
            if let Some(text) = attrs.remove("text") {
                attrs.insert("body".into(), text);
            }
            Ok(attrs)
        }
    }

    fn provider() -> Provider<Store> {
        let mut p = Provider::new();
        p.register_resource("note", NoteResource);
        p
    }

    fn cfg(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let store = Store::default();
        let p = provider();

        let state = p.create(&store, "note", cfg(json!({"name": "a", "body": "x"}))).await.unwrap();
        assert_eq!(state.id, "a");
        assert_eq!(state.attributes["token"], json!("secret-value"));
        assert!(!state.exported(p.resource_schema("note").unwrap()).contains_key("token"));

        let plan = p.plan("note", Some(&state), &cfg(json!({"name": "a", "body": "x"}))).unwrap();
        assert!(plan.is_noop());

        let updated = p.update(&store, "note", state, cfg(json!({"name": "a", "body": "y"}))).await.unwrap();
        assert_eq!(updated.attributes["body"], json!("y"));
        assert_eq!(updated.attributes["token"], json!("secret-value"));

        p.delete(&store, "note", updated.clone()).await.unwrap();
        assert!(p.read(&store, "note", updated.clone()).await.unwrap().is_none());
        // deleting twice is still success
        p.delete(&store, "note", updated).await.unwrap();
    }

    #[tokio::test]
    async fn test_reconcile_recreates_out_of_band_delete() {
        let store = Store::default();
        let p = provider();
        let config = cfg(json!({"name": "a", "body": "x"}));
        let state = p.create(&store, "note", config.clone()).await.unwrap();

        store.objects.lock().unwrap().clear();
        let outcome = p.reconcile(&store, "note", Some(state), config).await.unwrap();
        assert_eq!(outcome.plan, Plan::Create);
        assert!(store.objects.lock().unwrap().contains_key("a"));
    }

    #[tokio::test]
    async fn test_reconcile_replaces_on_force_new() {
        let store = Store::default();
        let p = provider();
        let state = p.create(&store, "note", cfg(json!({"name": "a"}))).await.unwrap();
        let outcome = p
            .reconcile(&store, "note", Some(state), cfg(json!({"name": "b"})))
            .await
            .unwrap();
        assert!(matches!(outcome.plan, Plan::Replace { .. }));
        let objects = store.objects.lock().unwrap();
        assert!(objects.contains_key("b"));
        assert!(!objects.contains_key("a"));
    }

    #[tokio::test]
    async fn test_upgrade_state_runs_migration() {
        let store = Store::default();
        store.objects.lock().unwrap().insert("a".into(), "old".into());
        let p = provider();
        let legacy = ResourceState::new("a", 0, cfg(json!({"name": "a", "text": "old"})));
        let upgraded = p.upgrade_state("note", legacy).unwrap();
        assert_eq!(upgraded.schema_version, 1);
        assert_eq!(upgraded.attributes["body"], json!("old"));
    }

    #[tokio::test]
    async fn test_unknown_type_and_invalid_config() {
        let store = Store::default();
        let p = provider();
        let err = p.create(&store, "missing", Map::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        let err = p.create(&store, "note", cfg(json!({"body": "x"}))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(store.objects.lock().unwrap().is_empty());
    }
}
