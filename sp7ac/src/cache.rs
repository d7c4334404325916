use futures::future::{
    BoxFuture,
    Shared,
};
use parking_lot::{
    Mutex,
    MutexGuard,
};
use sp7core::ac::permission::ResolvedPermissions;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{
            AtomicBool,
            AtomicU64,
            Ordering,
        },
    },
};

use crate::error::Error;

pub(crate) type FetchResult = Result<Arc<ResolvedPermissions>, Arc<Error>>;
pub(crate) type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// The resolution state of a collection.
///
/// There is no failed state; a failed fetch leaves the collection as it
/// was before the fetch started.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchState {
    Unfetched,
    Fetching,
    Resolved,
}

pub(crate) enum CollectionState {
    Fetching {
        // still visible to readers until the fetch completes
        previous: Option<Arc<ResolvedPermissions>>,
        future: SharedFetch,
        generation: u64,
        // set once the query for this fetch has been issued
        started: Arc<AtomicBool>,
    },
    Resolved(Arc<ResolvedPermissions>),
}

#[derive(Default)]
pub(crate) struct Cache {
    states: Mutex<HashMap<i64, CollectionState>>,
    generation: AtomicU64,
}

impl Cache {
    pub(crate) fn lock(&self) -> MutexGuard<'_, HashMap<i64, CollectionState>> {
        self.states.lock()
    }

    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn state(&self, collection_id: i64) -> FetchState {
        match self.states.lock().get(&collection_id) {
            None => FetchState::Unfetched,
            Some(CollectionState::Fetching { .. }) => FetchState::Fetching,
            Some(CollectionState::Resolved(_)) => FetchState::Resolved,
        }
    }

    pub(crate) fn snapshot(
        &self,
        collection_id: i64,
    ) -> Option<Arc<ResolvedPermissions>> {
        match self.states.lock().get(&collection_id)? {
            CollectionState::Fetching { previous, .. } => previous.clone(),
            CollectionState::Resolved(resolved) => Some(resolved.clone()),
        }
    }

    /// Install the result of the fetch of the given generation.  Should a
    /// later fetch be queued behind it, the result only becomes the
    /// permissions visible while that one runs, and `false` is returned.
    pub(crate) fn install(
        &self,
        collection_id: i64,
        generation: u64,
        resolved: Arc<ResolvedPermissions>,
    ) -> bool {
        let mut states = self.states.lock();
        if let Some(CollectionState::Fetching { previous, generation: current, .. }) = states
            .get_mut(&collection_id)
        {
            if *current != generation {
                log::debug!(
                    "collection {collection_id}: fetch {generation} superseded \
                    by fetch {current}"
                );
                *previous = Some(resolved);
                return false;
            }
        }
        log::debug!("installing permissions for collection {collection_id}");
        states.insert(collection_id, CollectionState::Resolved(resolved));
        true
    }

    /// Revert the collection to what it was before the fetch of the given
    /// generation, unless a later fetch has taken its place.
    pub(crate) fn abandon(&self, collection_id: i64, generation: u64) {
        let mut states = self.states.lock();
        match states.get(&collection_id) {
            Some(CollectionState::Fetching { generation: current, .. })
                if *current == generation => (),
            _ => return,
        }
        if let Some(CollectionState::Fetching { previous: Some(previous), .. }) = states
            .remove(&collection_id)
        {
            states.insert(collection_id, CollectionState::Resolved(previous));
        }
    }

    pub(crate) fn collections(&self) -> Vec<i64> {
        let mut result = self.states.lock()
            .keys()
            .copied()
            .collect::<Vec<_>>();
        result.sort();
        result
    }
}
