use async_trait::async_trait;
use crate::error::BackendError;
use super::{
    policy::StoredPolicies,
    query::{
        PermissionQuery,
        QueryOutcome,
    },
    role::{
        RoleRecord,
        RoleScope,
    },
};

#[async_trait]
pub trait PermissionBackend {
    /// Issue a single batched query for the user in the collection.
    async fn query_permissions(
        &self,
        user_id: i64,
        collection_id: i64,
        queries: &[PermissionQuery],
    ) -> Result<Vec<QueryOutcome>, BackendError>;
    /// The operation policies the service itself knows about.
    async fn fetch_policy_catalog(
        &self,
    ) -> Result<StoredPolicies, BackendError>;
}

#[async_trait]
pub trait RoleBackend {
    /// `None` signals the caller may not enumerate roles, which is
    /// distinct from there being no roles.
    async fn fetch_roles(
        &self,
        scope: RoleScope,
    ) -> Result<Option<Vec<RoleRecord>>, BackendError>;
    async fn store_role(
        &self,
        scope: RoleScope,
        role: &RoleRecord,
    ) -> Result<i64, BackendError>;
    async fn store_user_policies(
        &self,
        user_id: i64,
        collection_id: Option<i64>,
        policies: &StoredPolicies,
    ) -> Result<(), BackendError>;
}
