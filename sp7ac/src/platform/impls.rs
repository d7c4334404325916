use futures::FutureExt;
use sp7core::{
    ac::{
        Policy,
        ResourcePath,
        StoredPolicies,
        permission::ResolvedPermissions,
        query::QueryOutcome,
        role::{
            Role,
            RoleScope,
        },
        traits::{
            PermissionBackend,
            RoleBackend,
        },
    },
    platform::AuthzPlatform,
};
use sp7rbac::{
    PolicyCodec,
    Registry,
};
use std::sync::{
    Arc,
    atomic::{
        AtomicBool,
        Ordering,
    },
};
use tokio::sync::broadcast;

use crate::{
    cache::{
        Cache,
        CollectionState,
        FetchState,
        SharedFetch,
    },
    error::Error,
    resolution::resolve_rows,
};
use super::*;

const DEFAULT_CHANNEL_CAPACITY: usize = 16;

enum Begin {
    Ready(Arc<ResolvedPermissions>),
    Synthesized(Arc<ResolvedPermissions>),
    Started(SharedFetch),
    Pending(SharedFetch),
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            backend: None,
            registry: None,
            user: CurrentUser::default(),
            verify_catalog: cfg!(debug_assertions),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn backend(mut self, val: impl AuthzPlatform + 'static) -> Self {
        self.backend = Some(Arc::new(val));
        self
    }

    pub fn shared_backend(mut self, val: Arc<dyn AuthzPlatform>) -> Self {
        self.backend = Some(val);
        self
    }

    pub fn registry(mut self, val: Registry) -> Self {
        self.registry = Some(Arc::new(val));
        self
    }

    pub fn shared_registry(mut self, val: Arc<Registry>) -> Self {
        self.registry = Some(val);
        self
    }

    pub fn user(mut self, val: CurrentUser) -> Self {
        self.user = val;
        self
    }

    pub fn verify_catalog(mut self, val: bool) -> Self {
        self.verify_catalog = val;
        self
    }

    pub fn channel_capacity(mut self, val: usize) -> Self {
        self.channel_capacity = val;
        self
    }

    pub fn build(self) -> Result<Platform, Error> {
        let (sender, _) = broadcast::channel(self.channel_capacity.max(1));
        Ok(Platform {
            backend: self.backend
                .ok_or(Error::Misconfiguration("backend"))?,
            registry: self.registry
                .ok_or(Error::Misconfiguration("registry"))?,
            user: self.user,
            verify_catalog: self.verify_catalog,
            catalog_verified: Arc::new(AtomicBool::new(false)),
            cache: Arc::new(Cache::default()),
            sender,
        })
    }
}

fn notify(
    sender: &broadcast::Sender<PermissionsChanged>,
    event: PermissionsChanged,
) {
    log::trace!("notifying {event:?}");
    if sender.send(event).is_err() {
        log::trace!("no subscribers for {event:?}");
    }
}

async fn verify(
    backend: &dyn AuthzPlatform,
    registry: &Registry,
) -> Result<(), Error> {
    let fetched = backend.fetch_policy_catalog().await?;
    Ok(registry.catalog().verify(&fetched)?)
}

async fn fetch(
    backend: &dyn AuthzPlatform,
    registry: &Registry,
    verified: Option<&AtomicBool>,
    started: &AtomicBool,
    user_id: i64,
    collection_id: i64,
) -> Result<ResolvedPermissions, Error> {
    if let Some(verified) = verified {
        if !verified.load(Ordering::Acquire) {
            verify(backend, registry).await?;
            verified.store(true, Ordering::Release);
        }
    }

    let queries = registry.catalog().queries();
    started.store(true, Ordering::Release);
    let outcomes = backend
        .query_permissions(user_id, collection_id, &queries)
        .await?;
    let rows = outcomes.into_iter()
        .filter_map(|outcome| match outcome {
            QueryOutcome::Resolved(row) => Some(row),
            QueryOutcome::DeniedByVisibility { resource, action } => {
                log::debug!(
                    "collection {collection_id}: {resource} {action} \
                    denied by visibility"
                );
                None
            }
        })
        .collect::<Vec<_>>();
    let rows = PolicyCodec::new(registry).expand_wildcard_actions(rows);
    Ok(resolve_rows(registry, rows))
}

// Access to the registry and the stored policy conversions.
impl Platform {
    pub fn registry(&self) -> &Registry {
        self.registry.as_ref()
    }

    pub fn codec(&self) -> PolicyCodec<'_> {
        PolicyCodec::new(self.registry.as_ref())
    }

    pub fn user(&self) -> CurrentUser {
        self.user
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PermissionsChanged> {
        self.sender.subscribe()
    }
}

// Permission decisions; these never fail and deny on absence.
impl Platform {
    pub fn state(&self, collection_id: i64) -> FetchState {
        self.cache.state(collection_id)
    }

    /// The permissions currently visible for the collection.  While a
    /// refetch is in flight the previous permissions remain visible.
    pub fn permissions(
        &self,
        collection_id: i64,
    ) -> Option<Arc<ResolvedPermissions>> {
        self.cache.snapshot(collection_id)
    }

    pub fn has_permission(
        &self,
        resource: &str,
        action: &str,
        collection_id: i64,
    ) -> bool {
        let resource = ResourcePath::parse(resource).to_string();
        self.permissions(collection_id)
            .map(|permissions| permissions.operation(&resource, action))
            .unwrap_or(false)
    }

    /// The table may be given by name or as a table resource.
    pub fn has_table_permission(
        &self,
        table: &str,
        action: &str,
        collection_id: i64,
    ) -> bool {
        let path = ResourcePath::parse(table);
        let table = match path.table_name() {
            Some(name) => name.to_string(),
            None => table.to_lowercase(),
        };
        self.permissions(collection_id)
            .map(|permissions| permissions.table(&table, action))
            .unwrap_or(false)
    }

    pub fn has_derived_permission(
        &self,
        resource: &str,
        action: &str,
        collection_id: i64,
    ) -> bool {
        let resource = ResourcePath::parse(resource).to_string();
        self.permissions(collection_id)
            .map(|permissions| permissions.derived(&resource, action))
            .unwrap_or(false)
    }
}

// Resolution.
impl Platform {
    /// Resolve the permissions for the collection, querying the service
    /// only if nothing is held or in flight for it.
    pub async fn resolve(
        &self,
        collection_id: i64,
    ) -> Result<Arc<ResolvedPermissions>, Error> {
        self.run(collection_id, false).await
    }

    /// Query the service again for the collection.  The permissions
    /// already held stay visible until replaced, and are kept should the
    /// query fail.  A query issued before this call is not reused; the
    /// new one is queued behind it, while one not yet issued is joined.
    pub async fn refetch(
        &self,
        collection_id: i64,
    ) -> Result<Arc<ResolvedPermissions>, Error> {
        self.run(collection_id, true).await
    }

    /// Compare the catalog against the operation policies the service
    /// reports.
    pub async fn verify_catalog(&self) -> Result<(), Error> {
        verify(self.backend.as_ref(), &self.registry).await?;
        self.catalog_verified.store(true, Ordering::Release);
        Ok(())
    }

    async fn run(
        &self,
        collection_id: i64,
        force: bool,
    ) -> Result<Arc<ResolvedPermissions>, Error> {
        let future = match self.begin(collection_id, force) {
            Begin::Ready(resolved) => return Ok(resolved),
            Begin::Synthesized(resolved) => {
                notify(&self.sender, PermissionsChanged::Resolved { collection_id });
                return Ok(resolved);
            }
            Begin::Started(future) => {
                // completes and populates the cache even if every caller
                // goes away
                tokio::spawn(future.clone());
                future
            }
            Begin::Pending(future) => {
                log::trace!("joining fetch in flight for collection {collection_id}");
                future
            }
        };
        future.await
            .map_err(|e| Error::Fetch(collection_id, e))
    }

    fn begin(&self, collection_id: i64, force: bool) -> Begin {
        let mut states = self.cache.lock();
        let (previous, after) = match states.get(&collection_id) {
            Some(CollectionState::Fetching { future, started, .. })
                if !force || !started.load(Ordering::Acquire) =>
                return Begin::Pending(future.clone()),
            // the query in flight may predate the caller, so another one
            // is queued to run once it completes
            Some(CollectionState::Fetching { previous, future, .. }) =>
                (previous.clone(), Some(future.clone())),
            Some(CollectionState::Resolved(resolved)) if !force =>
                return Begin::Ready(resolved.clone()),
            Some(CollectionState::Resolved(resolved)) => (Some(resolved.clone()), None),
            None => (None, None),
        };

        if previous.is_none()
            && after.is_none()
            && self.user.is_super_admin
            && collection_id != self.user.collection_id
        {
            if let Some(CollectionState::Resolved(current)) = states
                .get(&self.user.collection_id)
            {
                log::debug!(
                    "synthesizing permissions for collection {collection_id} \
                    from collection {}",
                    self.user.collection_id,
                );
                let resolved = current.clone();
                states.insert(
                    collection_id,
                    CollectionState::Resolved(resolved.clone()),
                );
                return Begin::Synthesized(resolved);
            }
        }

        let generation = self.cache.next_generation();
        let started = Arc::new(AtomicBool::new(false));
        let future = self.fetch_future(collection_id, generation, started.clone(), after);
        states.insert(collection_id, CollectionState::Fetching {
            previous,
            future: future.clone(),
            generation,
            started,
        });
        Begin::Started(future)
    }

    fn fetch_future(
        &self,
        collection_id: i64,
        generation: u64,
        started: Arc<AtomicBool>,
        after: Option<SharedFetch>,
    ) -> SharedFetch {
        let backend = self.backend.clone();
        let registry = self.registry.clone();
        let cache = self.cache.clone();
        let sender = self.sender.clone();
        let verified = self.verify_catalog
            .then(|| self.catalog_verified.clone());
        let user_id = self.user.user_id;

        async move {
            if let Some(prior) = after {
                log::debug!(
                    "collection {collection_id}: fetch {generation} waiting \
                    for the fetch in flight"
                );
                // its outcome is superseded by this fetch either way
                let _ = prior.await;
            }
            log::debug!("fetching permissions for collection {collection_id}");
            let result = fetch(
                backend.as_ref(),
                &registry,
                verified.as_deref(),
                &started,
                user_id,
                collection_id,
            ).await;
            match result {
                Ok(resolved) => {
                    let resolved = Arc::new(resolved);
                    if cache.install(collection_id, generation, resolved.clone()) {
                        notify(&sender, PermissionsChanged::Resolved { collection_id });
                    }
                    Ok(resolved)
                }
                Err(e) => {
                    log::warn!("permission fetch for collection {collection_id} failed: {e}");
                    cache.abandon(collection_id, generation);
                    Err(Arc::new(e))
                }
            }
        }
            .boxed()
            .shared()
    }
}

// Loading and saving of stored policies.
impl Platform {
    /// `None` when the user may not enumerate the roles in the scope.
    pub async fn load_roles(
        &self,
        scope: RoleScope,
    ) -> Result<Option<Vec<Role>>, Error> {
        let codec = self.codec();
        Ok(self.backend.fetch_roles(scope).await?
            .map(|records| records.into_iter()
                .map(|record| codec.decode_role(record))
                .collect()
            )
        )
    }

    /// Encode and store the role, returning its id.
    pub async fn save_role(
        &self,
        scope: RoleScope,
        role: &Role,
    ) -> Result<i64, Error> {
        let record = self.codec().encode_role(role);
        let id = self.backend.store_role(scope, &record).await?;
        log::debug!("saved role {id} in {scope}");
        self.after_save(scope.collection_id(), true).await;
        Ok(id)
    }

    /// Encode and store the policies granted directly to a user, either
    /// for a collection or at institution level.
    pub async fn save_user_policies(
        &self,
        user_id: i64,
        collection_id: Option<i64>,
        policies: &[Policy],
    ) -> Result<StoredPolicies, Error> {
        let stored = self.codec().encode(policies);
        self.backend
            .store_user_policies(user_id, collection_id, &stored)
            .await?;
        log::debug!("saved policies for user {user_id} in {}", RoleScope::from(collection_id));
        self.after_save(collection_id, user_id == self.user.user_id).await;
        Ok(stored)
    }

    // Institution level changes may affect every collection held.
    async fn after_save(&self, collection_id: Option<i64>, affects_user: bool) {
        if affects_user {
            let affected = self.cache.collections()
                .into_iter()
                .filter(|id| collection_id.map(|c| c == *id).unwrap_or(true))
                .collect::<Vec<_>>();
            for id in affected {
                if let Err(e) = self.refetch(id).await {
                    log::warn!("refetch after save failed: {e}");
                }
            }
        }
        notify(&self.sender, PermissionsChanged::Saved { collection_id });
    }
}
