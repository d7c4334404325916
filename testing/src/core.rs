use async_trait::async_trait;
use mockall::mock;
use sp7core::{
    ac::{
        StoredPolicies,
        query::{
            PermissionQuery,
            QueryOutcome,
        },
        role::{
            RoleRecord,
            RoleScope,
        },
        traits::{
            PermissionBackend,
            RoleBackend,
        },
    },
    error::BackendError,
};

mock! {
    pub Platform {}

    #[async_trait]
    impl PermissionBackend for Platform {
        async fn query_permissions(
            &self,
            user_id: i64,
            collection_id: i64,
            queries: &[PermissionQuery],
        ) -> Result<Vec<QueryOutcome>, BackendError>;
        async fn fetch_policy_catalog(
            &self,
        ) -> Result<StoredPolicies, BackendError>;
    }

    #[async_trait]
    impl RoleBackend for Platform {
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
}
