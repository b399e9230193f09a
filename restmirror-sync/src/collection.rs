//! The collection facade.

use crate::config::CollectionConfig;
use crate::coordinator::{Mutation, RequestCoordinator};
use crate::error::{CollectionError, CollectionResult};
use crate::handle::EntityHandle;
use crate::hooks::{HookEvent, HookId, HookOptions, Slot};
use crate::loading::ProgressHooks;
use crate::registry::{self, Broadcast, CollectionId};
use crate::response::Response;
use crate::transport::RestSource;
use restmirror_store::CacheLookup;
use restmirror_types::{Entity, EntityId, Model, Params, Record};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Client-side mirror of one REST resource.
///
/// Holds every entity seen through it exactly once, keyed by identity, and
/// caches fetch responses by their parameters. Cloning a `Collection` is
/// cheap and yields another reference to the same instance.
///
/// ```no_run
/// use restmirror_sync::{Collection, CollectionConfig, HttpTransport};
/// use std::sync::Arc;
///
/// # async fn demo() -> anyhow::Result<()> {
/// let transport = Arc::new(HttpTransport::for_url("https://api.example.com/users")?);
/// let users: Collection = Collection::new(transport, CollectionConfig::default());
///
/// let mut params = serde_json::Map::new();
/// params.insert("page".into(), 1.into());
/// let page = users.fetch(params).await?;
/// for user in page.items() {
///     println!("{:?}", user.get("name"));
/// }
/// # Ok(())
/// # }
/// ```
pub struct Collection<M: Model = Record> {
    inner: Arc<RequestCoordinator<M>>,
}

impl<M: Model> Collection<M> {
    /// Creates a collection and registers it process-wide.
    pub fn new(source: impl Into<RestSource>, config: CollectionConfig) -> Self {
        let inner = Arc::new(RequestCoordinator::new(source.into(), config));
        let broadcast: Arc<dyn Broadcast> = inner.clone();
        registry::register(Arc::downgrade(&broadcast));
        info!(collection = %inner.id(), id_field = %inner.config().id_field, "Created collection");
        Self { inner }
    }

    pub fn id(&self) -> CollectionId {
        self.inner.id()
    }

    pub fn config(&self) -> &CollectionConfig {
        self.inner.config()
    }

    /// Installs (or removes) the loading indicator integration.
    pub fn set_progress_hooks(&self, hooks: Option<Arc<dyn ProgressHooks>>) {
        self.inner.set_progress_hooks(hooks);
    }

    // ── Remote operations ───────────────────────────────────────────

    /// Creates a record on the server and stores the server's copy.
    pub async fn create(&self, data: Record) -> CollectionResult<Mutation<M>> {
        self.inner.create(data).await
    }

    /// Fetches entities matching `params`.
    ///
    /// Served without a transport call when `params` name a stored identity
    /// or a response for equal parameters is cached. Concurrent fetches
    /// with equal parameters share one transport call.
    pub async fn fetch(&self, params: Params) -> CollectionResult<Response<M>> {
        self.inner.fetch(params).await
    }

    /// Sends a partial update (`PATCH`) and merges the result.
    pub async fn update(&self, data: Record) -> CollectionResult<Mutation<M>> {
        self.inner.update(data).await
    }

    /// Same as [`update`](Self::update).
    pub async fn patch(&self, data: Record) -> CollectionResult<Mutation<M>> {
        self.inner.update(data).await
    }

    /// Sends a full replacement (`PUT`) and merges the result.
    pub async fn put(&self, data: Record) -> CollectionResult<Mutation<M>> {
        self.inner.put(data).await
    }

    /// Deletes the record with the identity found in `target`.
    pub async fn delete(&self, target: &Record) -> CollectionResult<Mutation<M>> {
        self.inner.delete(target).await
    }

    /// Deletes the record with this identity. The transport factory sees a
    /// record holding only the identity, as a string.
    pub async fn delete_by_id(&self, id: impl Into<EntityId>) -> CollectionResult<Mutation<M>> {
        let id: EntityId = id.into();
        let mut target = Record::new();
        target.insert(
            self.inner.config().id_field.clone(),
            Value::String(id.to_string()),
        );
        self.inner.delete(&target).await
    }

    // ── Local operations ────────────────────────────────────────────

    /// Stores a record without contacting the server. Returns `None` when
    /// it has no identity or the identity is already stored.
    pub fn add(&self, record: Record) -> Option<Entity<M>> {
        self.inner.add_record(record)
    }

    /// Element-wise [`add`](Self::add).
    pub fn add_many(&self, records: impl IntoIterator<Item = Record>) -> Vec<Option<Entity<M>>> {
        records
            .into_iter()
            .map(|record| self.inner.add_record(record))
            .collect()
    }

    /// Adds records and appends detached copies of them to the response
    /// cached for `params`, skipping identities the response already lists.
    pub fn add_with_cache(&self, records: Vec<Record>, params: Params) -> Vec<Option<Entity<M>>> {
        self.inner.add_with_cache(records, params)
    }

    /// Merges `patch` into the stored entity with the same identity. A
    /// patch for an identity that is not stored changes nothing.
    pub fn update_locally(&self, patch: &Record) -> Option<Entity<M>> {
        self.inner.update_local(patch)
    }

    /// Removes the entity with the identity found in `target`, locally only.
    pub fn remove(&self, target: &Record) -> Option<Entity<M>> {
        let id = self.inner.require_identity(target).ok()?;
        self.inner.remove_local(&id)
    }

    /// Removes the entity with this identity, locally only.
    pub fn remove_by_id(&self, id: impl Into<EntityId>) -> Option<Entity<M>> {
        self.inner.remove_local(&id.into())
    }

    /// Removes every entity, firing remove hooks for each unless
    /// `with_hooks` is set, in which case all hooks are dropped first.
    /// Cached responses are kept.
    pub fn clear(&self, with_hooks: bool) {
        self.inner.clear_entities(with_hooks);
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn at(&self, index: usize) -> Option<Entity<M>> {
        self.inner.store().read().at(index)
    }

    pub fn by_id(&self, id: impl Into<EntityId>) -> Option<Entity<M>> {
        self.inner.store().read().by_id(&id.into())
    }

    /// Every entity whose fields equal all of `fields`.
    pub fn where_all(&self, fields: &Params) -> Vec<Entity<M>> {
        self.inner.store().read().where_all(fields)
    }

    /// First entity whose fields equal all of `fields`.
    pub fn single_where(&self, fields: &Params) -> Option<Entity<M>> {
        self.inner.store().read().single_where(fields)
    }

    pub fn len(&self) -> usize {
        self.inner.store().read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store().read().is_empty()
    }

    /// Every entity in insertion order.
    pub fn entities(&self) -> Vec<Entity<M>> {
        self.inner.store().read().entities()
    }

    // ── Cache ───────────────────────────────────────────────────────

    /// Drops every cached response whose parameters contain all non-null
    /// pairs of `params`. An empty `params` drops everything. Returns the
    /// number of entries dropped.
    pub fn invalidate(&self, params: &Params) -> usize {
        self.inner.invalidate(params)
    }

    /// [`invalidate`](Self::invalidate) for each parameter set.
    pub fn invalidate_many<'a>(&self, params: impl IntoIterator<Item = &'a Params>) -> usize {
        params.into_iter().map(|p| self.inner.invalidate(p)).sum()
    }

    /// Rejects every in-flight fetch with [`CollectionError::Cancelled`].
    /// The transport calls themselves run to completion and are ignored.
    pub fn cancel_all_requests(&self) -> usize {
        self.inner.cancel_all_pending()
    }

    /// Whether a response (or an in-flight fetch) exists for `params`.
    pub fn is_cached(&self, params: Params) -> bool {
        self.inner.cache_lookup(params).is_some()
    }

    /// The cache entry for `params`. Snapshots come back detached.
    pub fn get_cached(&self, params: Params) -> Option<CacheLookup<Response<M>, CollectionError>> {
        self.inner.cache_lookup(params)
    }

    // ── Extensions ──────────────────────────────────────────────────

    /// Registers a hook on `slot`.
    pub fn extend(
        &self,
        slot: Slot,
        hook: impl Fn(&mut HookEvent<'_, M>) + Send + Sync + 'static,
    ) -> HookId {
        self.extend_with(slot, hook, HookOptions::default())
    }

    /// Registers a hook on `slot` with options.
    pub fn extend_with(
        &self,
        slot: Slot,
        hook: impl Fn(&mut HookEvent<'_, M>) + Send + Sync + 'static,
        options: HookOptions,
    ) -> HookId {
        self.inner.extensions().register(slot, Arc::new(hook), options)
    }

    /// Runs `f` on every record before it is stored. `f` may edit it.
    pub fn extend_add_before(&self, f: impl Fn(&mut Record) + Send + Sync + 'static) -> HookId {
        self.extend(Slot::AddBefore, move |event| {
            if let HookEvent::Incoming(record) = event {
                f(record);
            }
        })
    }

    /// Runs `f` on every entity after it is stored.
    pub fn extend_add_after(&self, f: impl Fn(&Entity<M>) + Send + Sync + 'static) -> HookId {
        self.entity_hook(Slot::AddAfter, f)
    }

    /// Runs `f` on every entity after it was merged with new fields.
    pub fn extend_update(&self, f: impl Fn(&Entity<M>) + Send + Sync + 'static) -> HookId {
        self.entity_hook(Slot::Update, f)
    }

    /// Runs `f` on every entity after it left the store.
    pub fn extend_remove(&self, f: impl Fn(&Entity<M>) + Send + Sync + 'static) -> HookId {
        self.entity_hook(Slot::Remove, f)
    }

    fn entity_hook(&self, slot: Slot, f: impl Fn(&Entity<M>) + Send + Sync + 'static) -> HookId {
        self.extend(slot, move |event| {
            if let HookEvent::Entity(entity) = *event {
                f(entity);
            }
        })
    }

    /// Runs `f` with the parameters of every fetch that reaches the transport.
    pub fn extend_fetch_before(&self, f: impl Fn(&Params) + Send + Sync + 'static) -> HookId {
        self.extend(Slot::FetchBefore, move |event| {
            if let HookEvent::Request(params) = *event {
                f(params);
            }
        })
    }

    /// Runs `f` after every successful fetch.
    pub fn extend_fetch_success(
        &self,
        f: impl Fn(&Response<M>, &Params) + Send + Sync + 'static,
    ) -> HookId {
        self.extend(Slot::FetchSuccess, move |event| {
            if let HookEvent::Success { response, params } = *event {
                f(response, params);
            }
        })
    }

    /// Runs `f` after every failed fetch.
    pub fn extend_fetch_error(
        &self,
        f: impl Fn(&CollectionError, &Params) + Send + Sync + 'static,
    ) -> HookId {
        self.extend(Slot::FetchError, move |event| {
            if let HookEvent::Failure { error, params } = *event {
                f(error, params);
            }
        })
    }

    /// Runs `f` after every settled fetch, with the parameters it was made with.
    pub fn extend_fetch_final(&self, f: impl Fn(&Params) + Send + Sync + 'static) -> HookId {
        self.extend(Slot::FetchFinal, move |event| match *event {
            HookEvent::Success { params, .. } | HookEvent::Failure { params, .. } => f(params),
            _ => {}
        })
    }

    /// Appends a fetch interceptor. It receives each successful payload
    /// before the payload is stored and returns its replacement.
    pub fn intercept(
        &self,
        f: impl Fn(&Value, &Params) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    ) -> HookId {
        self.inner.extensions().register_interceptor(Arc::new(f))
    }

    /// Removes a hook or interceptor.
    pub fn unextend(&self, id: HookId) -> bool {
        self.inner.extensions().unregister(id)
    }

    // ── Loading & mocks ─────────────────────────────────────────────

    /// Number of operations in flight.
    pub fn is_loading(&self) -> usize {
        self.inner.loading()
    }

    /// Serves every fetch that reaches the transport from `payload` instead,
    /// after `delay` (the configured mock delay when `None`). The payload
    /// goes through the same pipeline as a real response.
    pub fn set_mock(&self, payload: Value, delay: Option<Duration>) {
        self.inner.set_mock(payload, delay);
    }

    pub fn clear_mock(&self) {
        self.inner.clear_mock();
    }

    // ── Handles ─────────────────────────────────────────────────────

    /// Binds an entity to this collection.
    pub fn handle(&self, entity: Entity<M>) -> EntityHandle<M> {
        EntityHandle::new(entity, &self.inner)
    }

    /// Handle for the entity at `index`.
    pub fn handle_at(&self, index: usize) -> Option<EntityHandle<M>> {
        self.at(index).map(|e| self.handle(e))
    }

    /// Handle for the entity with this identity.
    pub fn handle_by_id(&self, id: impl Into<EntityId>) -> Option<EntityHandle<M>> {
        self.by_id(id).map(|e| self.handle(e))
    }
}

impl<M: Model> Clone for Collection<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Model> fmt::Debug for Collection<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Collection").field(&self.inner).finish()
    }
}
