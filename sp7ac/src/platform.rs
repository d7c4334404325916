use sp7core::platform::AuthzPlatform;
use sp7rbac::Registry;
use std::sync::{
    Arc,
    atomic::AtomicBool,
};
use tokio::sync::broadcast;

use crate::cache::Cache;

/// The user on whose behalf permissions are resolved.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CurrentUser {
    pub user_id: i64,
    /// The collection the user is logged into.
    pub collection_id: i64,
    pub is_super_admin: bool,
}

/// Notification sent to subscribers of a [`Platform`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PermissionsChanged {
    /// Permissions for the collection were installed.
    Resolved {
        collection_id: i64,
    },
    /// Policies were saved; `None` for the institution.
    Saved {
        collection_id: Option<i64>,
    },
}

pub struct Builder {
    backend: Option<Arc<dyn AuthzPlatform>>,
    registry: Option<Arc<Registry>>,
    user: CurrentUser,
    // compare the catalog against the service before the first fetch
    verify_catalog: bool,
    channel_capacity: usize,
}

/// Per collection permission resolution for the current user.
///
/// Each collection is fetched at most once at a time, no matter how
/// many callers ask for it.  Resolved permissions are kept until
/// replaced by an explicit [`Platform::refetch`].
pub struct Platform {
    backend: Arc<dyn AuthzPlatform>,
    registry: Arc<Registry>,
    user: CurrentUser,
    verify_catalog: bool,
    catalog_verified: Arc<AtomicBool>,
    cache: Arc<Cache>,
    sender: broadcast::Sender<PermissionsChanged>,
}

mod impls;
