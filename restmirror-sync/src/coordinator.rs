//! Request coordination: de-duplicated fetches and one-shot writes.
//!
//! A fetch moves through `pending -> success | error | cancelled`. The
//! pending state is a [`PendingHandle`] stored in the response cache under
//! the canonical key of its parameters; every caller asking for the same key
//! while it is pending waits on that one handle. The transport call runs in
//! its own task, so it completes even if the caller that started it goes
//! away, and it settles the handle only if nobody settled it first. A
//! cancelled handle therefore turns the late response into a no-op.
//!
//! Creates, updates and deletes are not de-duplicated or cached. They hold
//! the loading counter for the duration of the call and reconcile the store
//! on success.

use crate::config::CollectionConfig;
use crate::error::{CollectionError, CollectionResult};
use crate::hooks::{ExtensionRegistry, HookEvent, Slot};
use crate::loading::{LoadingCounter, Operation, ProgressHooks};
use crate::registry::{Broadcast, CollectionId};
use crate::response::{Body, Response};
use crate::transport::RestSource;
use parking_lot::{Mutex, RwLock};
use restmirror_store::{CacheLookup, EntityStore, PendingHandle, ResponseCache};
use restmirror_types::{Entity, EntityId, Model, Params, ParamsKey, Record, into_record};
use serde_json::{Value, json};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

pub(crate) type FetchHandle<M> = PendingHandle<Response<M>, CollectionError>;

/// Outcome of a create, update or delete.
#[derive(Debug)]
pub struct Mutation<M> {
    /// The transport's response body.
    pub raw: Value,
    /// The affected entity: the stored one when collecting, otherwise a
    /// detached model built from the response.
    pub entity: Option<Entity<M>>,
}

impl<M> Clone for Mutation<M> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            entity: self.entity.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct Mock {
    payload: Value,
    delay: Duration,
}

#[derive(Debug, Clone, Copy)]
enum Write {
    Patch,
    Put,
}

enum Start<M> {
    Cached(Response<M>),
    Joined(FetchHandle<M>),
    Issued(FetchHandle<M>),
}

/// Owns the store, the cache and the hooks of one collection and runs every
/// operation against them.
pub struct RequestCoordinator<M: Model> {
    id: CollectionId,
    config: CollectionConfig,
    source: RestSource,
    store: RwLock<EntityStore<M>>,
    cache: Mutex<ResponseCache<Response<M>, CollectionError>>,
    extensions: ExtensionRegistry<M>,
    loading: Arc<LoadingCounter>,
    mock: Mutex<Option<Mock>>,
}

impl<M: Model> RequestCoordinator<M> {
    pub(crate) fn new(source: RestSource, config: CollectionConfig) -> Self {
        Self {
            id: CollectionId::new(),
            store: RwLock::new(EntityStore::new(config.id_field.clone())),
            cache: Mutex::new(ResponseCache::new()),
            extensions: ExtensionRegistry::new(),
            loading: Arc::new(LoadingCounter::default()),
            mock: Mutex::new(None),
            config,
            source,
        }
    }

    pub fn id(&self) -> CollectionId {
        self.id
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    pub(crate) fn extensions(&self) -> &ExtensionRegistry<M> {
        &self.extensions
    }

    pub(crate) fn store(&self) -> &RwLock<EntityStore<M>> {
        &self.store
    }

    pub(crate) fn loading(&self) -> usize {
        self.loading.current()
    }

    pub(crate) fn set_progress_hooks(&self, hooks: Option<Arc<dyn ProgressHooks>>) {
        self.loading.set_progress(hooks);
    }

    pub(crate) fn set_mock(&self, payload: Value, delay: Option<Duration>) {
        let delay = delay.unwrap_or_else(|| self.config.mock_delay());
        *self.mock.lock() = Some(Mock { payload, delay });
    }

    pub(crate) fn clear_mock(&self) {
        *self.mock.lock() = None;
    }

    fn identity_of(&self, record: &Record) -> Option<EntityId> {
        record.get(&self.config.id_field).and_then(EntityId::from_value)
    }

    pub(crate) fn require_identity(&self, record: &Record) -> CollectionResult<EntityId> {
        self.identity_of(record)
            .ok_or_else(|| CollectionError::MissingIdentity {
                field: self.config.id_field.clone(),
            })
    }

    // ── Fetch ───────────────────────────────────────────────────────

    /// Fetches with `params` layered over the configured defaults.
    pub(crate) async fn fetch(self: &Arc<Self>, params: Params) -> CollectionResult<Response<M>> {
        let params = self.config.with_defaults(params);

        if let Some(response) = self.resident(&params) {
            debug!(collection = %self.id, "Fetch served from store by identity");
            return Ok(response);
        }

        let key = ParamsKey::of(&params);
        let start = {
            let mut cache = self.cache.lock();
            match cache.get(&key) {
                Some(CacheLookup::Snapshot(response)) => Start::Cached(response),
                Some(CacheLookup::Pending(handle)) => Start::Joined(handle),
                None => {
                    let handle = FetchHandle::new();
                    cache.set_pending(key.clone(), params.clone(), handle.clone());
                    Start::Issued(handle)
                }
            }
        };

        match start {
            Start::Cached(response) => {
                debug!(collection = %self.id, %key, "Fetch served from cache");
                Ok(response)
            }
            Start::Joined(handle) => {
                debug!(collection = %self.id, %key, "Joined in-flight fetch");
                handle.wait().await
            }
            Start::Issued(handle) => {
                self.issue(key, params, handle.clone());
                handle.wait().await
            }
        }
    }

    /// A response for an identity fetch whose entity is already stored.
    fn resident(&self, params: &Params) -> Option<Response<M>> {
        let id = self.identity_of(params)?;
        let entity = self.store.read().by_id(&id)?;
        let mut response = Response::new(Body::One(Some(entity)));
        self.attach_payload(&mut response, params);
        Some(response)
    }

    fn issue(self: &Arc<Self>, key: ParamsKey, params: Params, handle: FetchHandle<M>) {
        let guard = self.loading.acquire(Operation::Fetch);
        handle.on_settle(move || drop(guard));
        let unsettled = SettleOnDrop {
            owner: Arc::downgrade(self),
            key: key.clone(),
            handle: handle.clone(),
        };

        debug!(collection = %self.id, %key, "Issuing fetch");
        self.extensions
            .run(Slot::FetchBefore, &mut HookEvent::Request(&params));

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _unsettled = unsettled;
            this.run_fetch(key, params, handle).await;
        });
    }

    async fn run_fetch(&self, key: ParamsKey, params: Params, handle: FetchHandle<M>) {
        let mock = self.mock.lock().clone();
        let outcome = match mock {
            Some(mock) => {
                tokio::time::sleep(mock.delay).await;
                Ok(mock.payload)
            }
            None => {
                let transport = self.source.resolve(&params);
                let id = self.identity_of(&params);
                let mut query = params.clone();
                if id.is_some() {
                    query.remove(&self.config.id_field);
                }
                transport.get(id.as_ref(), &query).await
            }
        };

        if !handle.claim() {
            debug!(collection = %self.id, %key, "Discarding response of cancelled fetch");
            return;
        }

        match outcome {
            Ok(payload) => self.fetch_succeeded(&key, &params, &handle, payload),
            Err(e) if e.is_not_modified() => {
                debug!(collection = %self.id, %key, "Not modified");
                let results = e.body.unwrap_or_else(|| Value::Array(Vec::new()));
                self.fetch_succeeded(&key, &params, &handle, json!({ "results": results }));
            }
            Err(e) => self.fetch_failed(&key, &params, &handle, e.into()),
        }
    }

    fn fetch_succeeded(
        &self,
        key: &ParamsKey,
        params: &Params,
        handle: &FetchHandle<M>,
        payload: Value,
    ) {
        let payload = self.extensions.run_interceptors(payload, params);
        if !self.config.dont_collect {
            self.collect(&payload);
        }
        let response = self.determine_response(&payload, params);

        {
            let mut cache = self.cache.lock();
            if cache.holds_pending(key, handle) {
                if self.config.with_caching {
                    cache.set_snapshot(key.clone(), params.clone(), &response);
                } else {
                    cache.delete(key);
                }
            } else {
                debug!(collection = %self.id, %key, "Cache entry invalidated in flight, not storing snapshot");
            }
        }

        let mut event = HookEvent::Success {
            response: &response,
            params,
        };
        self.extensions.run(Slot::FetchSuccess, &mut event);
        self.extensions.run(Slot::FetchFinal, &mut event);

        debug!(collection = %self.id, %key, items = response.items().len(), "Fetch succeeded");
        handle.resolve(response);
    }

    fn fetch_failed(
        &self,
        key: &ParamsKey,
        params: &Params,
        handle: &FetchHandle<M>,
        error: CollectionError,
    ) {
        {
            let mut cache = self.cache.lock();
            if cache.holds_pending(key, handle) {
                cache.delete(key);
            }
        }
        warn!(collection = %self.id, %key, %error, "Fetch failed");

        let mut event = HookEvent::Failure {
            error: &error,
            params,
        };
        self.extensions.run(Slot::FetchError, &mut event);
        self.extensions.run(Slot::FetchFinal, &mut event);

        handle.reject(error);
    }

    /// Adds the records of a fetch payload to the store.
    fn collect(&self, payload: &Value) {
        let items = payload
            .get("results")
            .filter(|results| !results.is_null())
            .unwrap_or(payload);
        match items {
            Value::Array(records) => {
                for record in records {
                    self.add_value(record.clone());
                }
            }
            Value::Object(_) => {
                self.add_value(items.clone());
            }
            _ => {}
        }
    }

    /// Shapes a payload into the response handed to callers.
    ///
    /// When collecting, entities are looked up in the store so callers see
    /// the store's instances; records the store rejected are left out.
    fn determine_response(&self, payload: &Value, params: &Params) -> Response<M> {
        let mut response = if self.config.dont_collect {
            match payload {
                Value::Array(items) => Response::new(Body::Many(
                    items.iter().filter_map(detached_model).collect(),
                )),
                other => Response::new(Body::Raw(other.clone())),
            }
        } else {
            match payload {
                Value::Array(items) => Response::new(Body::Many(self.stored_all(items))),
                Value::Object(envelope) => match envelope.get("results") {
                    Some(Value::Array(results)) => {
                        let single = params.contains_key(&self.config.id_field)
                            && !params.get("_single").is_some_and(truthy);
                        let entities = self.stored_all(results);
                        let body = if single {
                            Body::One(entities.into_iter().next())
                        } else {
                            Body::Many(entities)
                        };
                        let mut response = Response::new(body);
                        response.meta = envelope
                            .iter()
                            .filter(|(k, _)| k.as_str() != "results")
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect();
                        response
                    }
                    Some(Value::Object(result)) => Response::new(Body::One(self.stored(result))),
                    _ => Response::new(Body::One(self.stored(envelope))),
                },
                other => Response::new(Body::Raw(other.clone())),
            }
        };
        self.attach_payload(&mut response, params);
        response
    }

    fn stored(&self, record: &Record) -> Option<Entity<M>> {
        let id = self.identity_of(record)?;
        self.store.read().by_id(&id)
    }

    fn stored_all(&self, items: &[Value]) -> Vec<Entity<M>> {
        let store = self.store.read();
        items
            .iter()
            .filter_map(|item| item.get(&self.config.id_field))
            .filter_map(EntityId::from_value)
            .filter_map(|id| store.by_id(&id))
            .collect()
    }

    fn attach_payload(&self, response: &mut Response<M>, params: &Params) {
        if self.config.respond_with_payload {
            response.payload = Some(params.clone());
        }
    }

    // ── Writes ──────────────────────────────────────────────────────

    pub(crate) async fn create(&self, data: Record) -> CollectionResult<Mutation<M>> {
        let _loading = self.loading.acquire(Operation::Create);
        let transport = self.source.resolve(&data);
        let raw = transport
            .post(&Value::Object(data))
            .await
            .inspect_err(|e| warn!(collection = %self.id, error = %e, "Create failed"))?;

        let entity = match &raw {
            Value::Object(record) if !self.config.dont_collect => {
                self.add_record(record.clone());
                self.stored(record)
            }
            Value::Object(record) => Some(Entity::new(M::from_record(record.clone()))),
            _ => None,
        };
        debug!(collection = %self.id, created = entity.is_some(), "Create succeeded");
        Ok(Mutation { raw, entity })
    }

    pub(crate) async fn update(&self, data: Record) -> CollectionResult<Mutation<M>> {
        self.write(data, Write::Patch).await
    }

    pub(crate) async fn put(&self, data: Record) -> CollectionResult<Mutation<M>> {
        self.write(data, Write::Put).await
    }

    async fn write(&self, data: Record, method: Write) -> CollectionResult<Mutation<M>> {
        let id = self.require_identity(&data)?;
        let id_value = data.get(&self.config.id_field).cloned();
        let _loading = self.loading.acquire(Operation::Update);
        let transport = self.source.resolve(&data);
        let body = Value::Object(data.clone());
        let raw = match method {
            Write::Patch => transport.patch(&id, &body).await,
            Write::Put => transport.put(&id, &body).await,
        }
        .inspect_err(|e| warn!(collection = %self.id, %id, error = %e, "Update failed"))?;

        // Servers that answer with an empty body get the sent fields merged.
        let mut merged = match &raw {
            Value::Object(record) => record.clone(),
            _ => data,
        };
        if let Some(id_value) = id_value {
            merged.entry(self.config.id_field.clone()).or_insert(id_value);
        }

        let entity = if self.config.dont_collect {
            Some(Entity::new(M::from_record(merged)))
        } else {
            self.update_local(&merged)
        };
        debug!(collection = %self.id, %id, ?method, "Update succeeded");
        Ok(Mutation { raw, entity })
    }

    /// Deletes the record identified by `target`. The whole record is
    /// handed to the transport factory so nested resources can route on
    /// fields other than the identity.
    pub(crate) async fn delete(&self, target: &Record) -> CollectionResult<Mutation<M>> {
        let id = self.require_identity(target)?;
        let _loading = self.loading.acquire(Operation::Delete);
        let transport = self.source.resolve(target);
        let raw = transport
            .delete(&id)
            .await
            .inspect_err(|e| warn!(collection = %self.id, %id, error = %e, "Delete failed"))?;

        let entity = if self.config.dont_collect {
            None
        } else {
            self.remove_local(&id)
        };
        debug!(collection = %self.id, %id, "Delete succeeded");
        Ok(Mutation { raw, entity })
    }

    // ── Local store ─────────────────────────────────────────────────

    fn add_value(&self, value: Value) -> Option<Entity<M>> {
        match into_record(value) {
            Ok(record) => self.add_record(record),
            Err(e) => {
                debug!(collection = %self.id, error = %e, "Skipping non-object item");
                None
            }
        }
    }

    /// Stores a record unless its identity is missing or already present.
    pub(crate) fn add_record(&self, mut record: Record) -> Option<Entity<M>> {
        let Some(id) = self.identity_of(&record) else {
            warn!(collection = %self.id, id_field = %self.config.id_field, "Ignoring record without identity");
            return None;
        };
        if self.store.read().contains(&id) {
            debug!(collection = %self.id, %id, "Ignoring duplicate record");
            return None;
        }

        self.extensions
            .run(Slot::AddBefore, &mut HookEvent::Incoming(&mut record));
        let entity = self.store.write().insert(M::from_record(record))?;
        self.extensions
            .run(Slot::AddAfter, &mut HookEvent::Entity(&entity));
        Some(entity)
    }

    /// Adds records and appends them to the snapshot cached for `params`.
    pub(crate) fn add_with_cache(
        &self,
        records: Vec<Record>,
        params: Params,
    ) -> Vec<Option<Entity<M>>> {
        let added = records
            .iter()
            .map(|record| self.add_record(record.clone()))
            .collect();

        let key = ParamsKey::of(&self.config.with_defaults(params));
        let mut cache = self.cache.lock();
        if let Some(snapshot) = cache.snapshot_mut(&key) {
            for record in records {
                snapshot.append(Entity::new(M::from_record(record)), &self.config.id_field);
            }
        }
        added
    }

    /// Merges `patch` into the stored entity with the same identity.
    pub(crate) fn update_local(&self, patch: &Record) -> Option<Entity<M>> {
        let entity = self.store.read().update_in_place(patch)?;
        self.extensions
            .run(Slot::Update, &mut HookEvent::Entity(&entity));
        Some(entity)
    }

    /// Removes the entity with this identity from the store only.
    pub(crate) fn remove_local(&self, id: &EntityId) -> Option<Entity<M>> {
        let removed = self.store.write().remove(id)?;
        self.extensions
            .run(Slot::Remove, &mut HookEvent::Entity(&removed));
        Some(removed)
    }

    /// Removes every entity through the remove path. With `with_hooks` the
    /// hooks are dropped first, so no remove hook fires.
    pub(crate) fn clear_entities(&self, with_hooks: bool) {
        if with_hooks {
            self.extensions.reset();
        }
        let ids: Vec<EntityId> = self
            .store
            .read()
            .iter()
            .filter_map(|e| e.identity(&self.config.id_field))
            .collect();
        for id in &ids {
            self.remove_local(id);
        }
        info!(collection = %self.id, removed = ids.len(), "Cleared collection");
    }

    // ── Cache ───────────────────────────────────────────────────────

    /// Drops every cache entry whose parameters contain `partial`.
    pub(crate) fn invalidate(&self, partial: &Params) -> usize {
        let removed = self.cache.lock().invalidate_matching(partial);
        debug!(collection = %self.id, removed, "Invalidated");
        removed
    }

    pub(crate) fn cache_lookup(
        &self,
        params: Params,
    ) -> Option<CacheLookup<Response<M>, CollectionError>> {
        let key = ParamsKey::of(&self.config.with_defaults(params));
        self.cache.lock().get(&key)
    }

    /// Rejects every pending fetch with [`CollectionError::Cancelled`].
    pub(crate) fn cancel_all_pending(&self) -> usize {
        let pending = self.cache.lock().take_pending();
        let cancelled = pending
            .into_iter()
            .filter(|handle| handle.close() && handle.reject(CollectionError::Cancelled))
            .count();
        if cancelled > 0 {
            info!(collection = %self.id, cancelled, "Cancelled pending fetches");
        }
        cancelled
    }
}

/// Loose truthiness of a query flag: `null`, `false`, `0` and `""` are off.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn detached_model<M: Model>(item: &Value) -> Option<Entity<M>> {
    let record = item.as_object()?.clone();
    Some(Entity::new(M::from_record(record)))
}

impl<M: Model> Broadcast for RequestCoordinator<M> {
    fn collection_id(&self) -> CollectionId {
        self.id
    }

    fn invalidate_all(&self) {
        self.invalidate(&Params::new());
    }

    fn cancel_all_requests(&self) -> usize {
        self.cancel_all_pending()
    }

    fn clear(&self, with_hooks: bool) {
        self.clear_entities(with_hooks);
    }
}

impl<M: Model> fmt::Debug for RequestCoordinator<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field("id", &self.id)
            .field("entities", &self.store.read().len())
            .field("cached", &self.cache.lock().len())
            .field("loading", &self.loading.current())
            .finish()
    }
}

/// Rejects a fetch that ends without settling, e.g. because a hook
/// panicked or the runtime shut down, so its waiters are released.
struct SettleOnDrop<M: Model> {
    owner: Weak<RequestCoordinator<M>>,
    key: ParamsKey,
    handle: FetchHandle<M>,
}

impl<M: Model> Drop for SettleOnDrop<M> {
    fn drop(&mut self) {
        if self.handle.is_settled() {
            return;
        }
        if let Some(owner) = self.owner.upgrade() {
            let mut cache = owner.cache.lock();
            if cache.holds_pending(&self.key, &self.handle) {
                cache.delete(&self.key);
            }
        }
        warn!(key = %self.key, "Fetch ended without settling");
        self.handle.reject(CollectionError::Abandoned);
    }
}
