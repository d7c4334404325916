use async_trait::async_trait;
use mockall::predicate::*;
use sp7ac::{
    FetchState,
    error::Error,
    platform::{
        Builder,
        CurrentUser,
        PermissionsChanged,
    },
    Platform,
};
use sp7core::{
    ac::{
        Policy,
        StoredPolicies,
        query::{
            PermissionQuery,
            QueryOutcome,
        },
        role::{
            Role,
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
use std::sync::{
    Arc,
    atomic::{
        AtomicBool,
        AtomicUsize,
        Ordering,
    },
};
use tokio::sync::{
    Semaphore,
    broadcast::error::TryRecvError,
};

use test_sp7::{
    answer,
    core::MockPlatform,
    is_send_sync,
    rbac::{
        sample_catalog,
        sample_registry,
    },
    row,
    stored,
    user_evidence,
};

fn user(collection_id: i64) -> CurrentUser {
    CurrentUser {
        user_id: 1,
        collection_id,
        is_super_admin: false,
    }
}

fn platform(backend: MockPlatform, user: CurrentUser) -> Platform {
    Builder::new()
        .backend(backend)
        .registry(sample_registry())
        .user(user)
        .verify_catalog(false)
        .build()
        .expect("platform must build")
}

#[test]
fn builder_requires_backend_and_registry() {
    assert!(matches!(
        Builder::new().registry(sample_registry()).build(),
        Err(Error::Misconfiguration("backend")),
    ));
    assert!(matches!(
        Builder::new().backend(MockPlatform::new()).build(),
        Err(Error::Misconfiguration("registry")),
    ));
}

#[tokio::test]
async fn agent_read_only() -> anyhow::Result<()> {
    let mut backend = MockPlatform::new();
    backend.expect_query_permissions()
        .times(1)
        .with(eq(1), eq(7), always())
        .returning(|_, _, queries: &[PermissionQuery]| {
            Ok(answer(queries, &[("/table/agent", "read")]))
        });
    let platform = platform(backend, user(7));
    assert!(is_send_sync(&platform));

    assert_eq!(platform.state(7), FetchState::Unfetched);
    assert!(!platform.has_table_permission("agent", "read", 7));

    platform.resolve(7).await?;
    assert_eq!(platform.state(7), FetchState::Resolved);
    assert!(platform.has_table_permission("agent", "read", 7));
    assert!(platform.has_table_permission("/table/Agent", "read", 7));
    assert!(!platform.has_table_permission("agent", "update", 7));
    assert!(!platform.has_table_permission("locality", "read", 7));
    // unresolved collections deny everything
    assert!(!platform.has_table_permission("agent", "read", 8));

    // resolved collections are answered from the cache
    platform.resolve(7).await?;
    Ok(())
}

#[tokio::test]
async fn operations_and_tools() -> anyhow::Result<()> {
    let mut backend = MockPlatform::new();
    backend.expect_query_permissions()
        .times(1)
        .returning(|_, _, queries: &[PermissionQuery]| Ok(answer(queries, &[
            ("/system/sp7/collection", "access"),
            ("/querybuilder/query", "execute"),
            ("/table/spquery", "read"),
            ("/table/spqueryfield", "read"),
            ("/table/recordset", "read"),
        ])));
    let platform = platform(backend, user(7));
    let resolved = platform.resolve(7).await?;

    assert!(platform.has_permission("/system/sp7/collection", "access", 7));
    assert!(platform.has_permission("/querybuilder/query/", "execute", 7));
    assert!(!platform.has_permission("/querybuilder/query", "export_csv", 7));
    assert!(platform.has_permission("/tool/querybuilder", "read", 7));
    assert!(!platform.has_permission("/tool/querybuilder", "update", 7));
    // recordsetitem is not readable
    assert!(!platform.has_permission("/tool/recordsets", "read", 7));
    assert!(platform.has_table_permission("recordset", "read", 7));
    assert!(!resolved.operations.keys().any(|k| k.starts_with("/table/")));
    Ok(())
}

// Holds every query until permits are added.  Answers reflect whether
// the user's policies had been stored when the query was issued.
struct Gated {
    gate: Semaphore,
    calls: AtomicUsize,
    saved: AtomicBool,
}

impl Gated {
    fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            saved: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PermissionBackend for Gated {
    async fn query_permissions(
        &self,
        _user_id: i64,
        _collection_id: i64,
        queries: &[PermissionQuery],
    ) -> Result<Vec<QueryOutcome>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let saved = self.saved.load(Ordering::SeqCst);
        self.gate.acquire().await
            .map_err(|_| BackendError::Unknown)?
            .forget();
        Ok(if saved {
            answer(queries, &[("/table/agent", "read"), ("/table/agent", "update")])
        } else {
            answer(queries, &[("/table/agent", "read")])
        })
    }

    async fn fetch_policy_catalog(
        &self,
    ) -> Result<StoredPolicies, BackendError> {
        Ok(sample_catalog().expected_policies())
    }
}

#[async_trait]
impl RoleBackend for Gated {
    async fn fetch_roles(
        &self,
        _scope: RoleScope,
    ) -> Result<Option<Vec<RoleRecord>>, BackendError> {
        Ok(None)
    }

    async fn store_role(
        &self,
        _scope: RoleScope,
        _role: &RoleRecord,
    ) -> Result<i64, BackendError> {
        Err(BackendError::Unknown)
    }

    async fn store_user_policies(
        &self,
        _user_id: i64,
        _collection_id: Option<i64>,
        _policies: &StoredPolicies,
    ) -> Result<(), BackendError> {
        self.saved.store(true, Ordering::SeqCst);
        Ok(())
    }
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

async fn wait_for_calls(backend: &Gated, calls: usize) {
    while backend.calls.load(Ordering::SeqCst) < calls {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn at_most_one_fetch_in_flight() -> anyhow::Result<()> {
    let backend = Arc::new(Gated::new());
    let platform = Arc::new(Builder::new()
        .shared_backend(backend.clone())
        .registry(sample_registry())
        .user(user(7))
        .build()?);
    let mut receiver = platform.subscribe();

    let handles = (0..5)
        .map(|_| {
            let platform = platform.clone();
            tokio::spawn(async move { platform.resolve(7).await })
        })
        .collect::<Vec<_>>();
    wait_for_calls(&backend, 1).await;
    settle().await;
    assert_eq!(platform.state(7), FetchState::Fetching);
    assert!(!platform.has_table_permission("agent", "read", 7));

    // the query in flight was issued before these refetches, so a second
    // one is queued behind it and shared between them
    let refetches = (0..2)
        .map(|_| {
            let platform = platform.clone();
            tokio::spawn(async move { platform.refetch(7).await })
        })
        .collect::<Vec<_>>();
    settle().await;
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

    // a plain resolve joins the queued fetch
    let late = {
        let platform = platform.clone();
        tokio::spawn(async move { platform.resolve(7).await })
    };
    settle().await;

    backend.gate.add_permits(1);
    let mut first = Vec::new();
    for handle in handles {
        first.push(handle.await??);
    }
    assert!(first.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    // the superseded result stays visible while the queued fetch runs
    assert!(platform.has_table_permission("agent", "read", 7));
    assert_eq!(platform.state(7), FetchState::Fetching);

    wait_for_calls(&backend, 2).await;
    backend.gate.add_permits(1);
    let mut second = Vec::new();
    for handle in refetches {
        second.push(handle.await??);
    }
    second.push(late.await??);

    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    assert!(second.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert!(!Arc::ptr_eq(&first[0], &second[0]));
    assert_eq!(platform.state(7), FetchState::Resolved);

    // observers are told once per completed fetch, not once per caller
    assert_eq!(
        receiver.try_recv(),
        Ok(PermissionsChanged::Resolved { collection_id: 7 }),
    );
    assert_eq!(receiver.try_recv(), Err(TryRecvError::Empty));
    Ok(())
}

#[tokio::test]
async fn save_during_fetch_refetches_after_it() -> anyhow::Result<()> {
    let backend = Arc::new(Gated::new());
    let platform = Arc::new(Builder::new()
        .shared_backend(backend.clone())
        .registry(sample_registry())
        .user(user(7))
        .verify_catalog(false)
        .build()?);

    let resolve = {
        let platform = platform.clone();
        tokio::spawn(async move { platform.resolve(7).await })
    };
    wait_for_calls(&backend, 1).await;

    let save = {
        let platform = platform.clone();
        tokio::spawn(async move {
            platform.save_user_policies(
                1,
                Some(7),
                &[Policy::new("/table/agent", ["update"])],
            ).await
        })
    };
    settle().await;
    assert!(backend.saved.load(Ordering::SeqCst));

    backend.gate.add_permits(10);
    let before = resolve.await??;
    save.await??;

    // the query issued before the save is not trusted
    assert!(!before.table("agent", "update"));
    assert!(platform.has_table_permission("agent", "update", 7));
    assert!(platform.has_table_permission("agent", "read", 7));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    assert_eq!(platform.state(7), FetchState::Resolved);
    Ok(())
}

#[tokio::test]
async fn super_admin_synthesis() -> anyhow::Result<()> {
    let mut backend = MockPlatform::new();
    backend.expect_query_permissions()
        .times(1)
        .with(eq(1), eq(4), always())
        .returning(|_, _, queries: &[PermissionQuery]| {
            Ok(answer(queries, &[("/table/agent", "update")]))
        });
    let platform = platform(backend, CurrentUser {
        user_id: 1,
        collection_id: 4,
        is_super_admin: true,
    });
    let mut receiver = platform.subscribe();

    let current = platform.resolve(4).await?;
    let other = platform.resolve(9).await?;
    assert!(Arc::ptr_eq(&current, &other));
    assert_eq!(platform.state(9), FetchState::Resolved);
    assert!(platform.has_table_permission("agent", "update", 9));

    assert_eq!(
        receiver.try_recv(),
        Ok(PermissionsChanged::Resolved { collection_id: 4 }),
    );
    assert_eq!(
        receiver.try_recv(),
        Ok(PermissionsChanged::Resolved { collection_id: 9 }),
    );
    Ok(())
}

#[tokio::test]
async fn super_admin_without_current_queries() -> anyhow::Result<()> {
    let mut backend = MockPlatform::new();
    backend.expect_query_permissions()
        .times(1)
        .with(eq(1), eq(9), always())
        .returning(|_, _, queries: &[PermissionQuery]| Ok(answer(queries, &[])));
    let platform = platform(backend, CurrentUser {
        user_id: 1,
        collection_id: 4,
        is_super_admin: true,
    });
    platform.resolve(9).await?;
    assert_eq!(platform.state(4), FetchState::Unfetched);
    Ok(())
}

#[tokio::test]
async fn failed_fetch_is_retried() -> anyhow::Result<()> {
    let mut backend = MockPlatform::new();
    let mut calls = 0;
    backend.expect_query_permissions()
        .times(2)
        .returning(move |_, _, queries: &[PermissionQuery]| {
            calls += 1;
            if calls == 1 {
                Err(BackendError::Network("connection reset".into()))
            } else {
                Ok(answer(queries, &[("/table/agent", "read")]))
            }
        });
    let platform = platform(backend, user(7));
    let mut receiver = platform.subscribe();

    assert!(matches!(
        platform.resolve(7).await,
        Err(Error::Fetch(7, e)) if matches!(e.as_ref(), Error::Backend(BackendError::Network(_))),
    ));
    assert_eq!(platform.state(7), FetchState::Unfetched);
    assert_eq!(receiver.try_recv(), Err(TryRecvError::Empty));

    platform.resolve(7).await?;
    assert!(platform.has_table_permission("agent", "read", 7));
    Ok(())
}

#[tokio::test]
async fn refetch_replaces_or_keeps() -> anyhow::Result<()> {
    let mut backend = MockPlatform::new();
    let mut calls = 0;
    backend.expect_query_permissions()
        .times(3)
        .returning(move |_, _, queries: &[PermissionQuery]| {
            calls += 1;
            match calls {
                1 => Ok(answer(queries, &[("/table/agent", "read")])),
                2 => Ok(answer(queries, &[("/table/agent", "update")])),
                _ => Err(BackendError::Network("timed out".into())),
            }
        });
    let platform = platform(backend, user(7));

    platform.resolve(7).await?;
    assert!(platform.has_table_permission("agent", "read", 7));

    platform.refetch(7).await?;
    assert!(!platform.has_table_permission("agent", "read", 7));
    assert!(platform.has_table_permission("agent", "update", 7));

    // the previous permissions survive a failed refetch
    assert!(platform.refetch(7).await.is_err());
    assert_eq!(platform.state(7), FetchState::Resolved);
    assert!(platform.has_table_permission("agent", "update", 7));
    Ok(())
}

#[tokio::test]
async fn institutional_stripping() -> anyhow::Result<()> {
    let mut backend = MockPlatform::new();
    backend.expect_query_permissions()
        .times(1)
        .returning(|_, _, _| {
            let mut password = row("/admin/user/password", "update", true);
            password.matching_user_policies.push(user_evidence(Some(7)));
            let mut roles = row("/permissions/library/roles", "read", true);
            roles.matching_user_policies.push(user_evidence(None));
            let mut policies = row("/permissions/policies/user", "update", true);
            policies.matching_user_policies.push(user_evidence(Some(7)));
            Ok(vec![password.into(), roles.into(), policies.into()])
        });
    let platform = platform(backend, user(7));
    platform.resolve(7).await?;

    assert!(!platform.has_permission("/admin/user/password", "update", 7));
    assert!(platform.has_permission("/permissions/library/roles", "read", 7));
    assert!(platform.has_permission("/permissions/policies/user", "update", 7));
    // granted only within the collection
    assert!(!platform.has_derived_permission("/permissions/institutional_policies/user", "update", 7));
    Ok(())
}

#[tokio::test]
async fn derived_permission() -> anyhow::Result<()> {
    let mut backend = MockPlatform::new();
    backend.expect_query_permissions()
        .times(1)
        .returning(|_, _, _| {
            let mut read = row("/permissions/policies/user", "read", true);
            read.matching_user_policies.push(user_evidence(None));
            Ok(vec![read.into()])
        });
    let platform = platform(backend, user(7));
    platform.resolve(7).await?;
    assert!(platform.has_derived_permission("/permissions/institutional_policies/user", "read", 7));
    assert!(!platform.has_derived_permission("/permissions/institutional_policies/user", "update", 7));
    Ok(())
}

#[tokio::test]
async fn denied_by_visibility_is_absent() -> anyhow::Result<()> {
    let mut backend = MockPlatform::new();
    backend.expect_query_permissions()
        .times(1)
        .returning(|_, _, _| Ok(vec![
            QueryOutcome::DeniedByVisibility {
                resource: "/report".into(),
                action: "execute".into(),
            },
            row("/table/agent", "read", true).into(),
        ]));
    let platform = platform(backend, user(7));
    let resolved = platform.resolve(7).await?;
    assert!(!platform.has_permission("/report", "execute", 7));
    assert!(!resolved.operations.contains_key("/report"));
    assert!(platform.has_table_permission("agent", "read", 7));
    Ok(())
}

#[tokio::test]
async fn wildcard_action_rows_expanded() -> anyhow::Result<()> {
    let mut backend = MockPlatform::new();
    backend.expect_query_permissions()
        .times(1)
        .returning(|_, _, _| Ok(vec![
            row("/tree/edit/taxon", "%", true).into(),
        ]));
    let platform = platform(backend, user(7));
    platform.resolve(7).await?;
    for action in ["merge", "move", "synonymize", "desynonymize"] {
        assert!(platform.has_permission("/tree/edit/taxon", action, 7), "{action}");
    }
    Ok(())
}

#[tokio::test]
async fn catalog_verification() -> anyhow::Result<()> {
    let mut backend = MockPlatform::new();
    backend.expect_fetch_policy_catalog()
        .times(1)
        .returning(|| Ok(sample_catalog().expected_policies()));
    backend.expect_query_permissions()
        .times(2)
        .returning(|_, _, queries: &[PermissionQuery]| Ok(answer(queries, &[])));
    let platform = Builder::new()
        .backend(backend)
        .registry(sample_registry())
        .user(user(7))
        .verify_catalog(true)
        .build()?;
    // verified once only
    platform.resolve(7).await?;
    platform.resolve(8).await?;
    Ok(())
}

#[tokio::test]
async fn catalog_mismatch() -> anyhow::Result<()> {
    let mut backend = MockPlatform::new();
    backend.expect_fetch_policy_catalog()
        .times(2)
        .returning(|| Ok(stored([("/report", vec!["execute"])])));
    backend.expect_query_permissions()
        .times(0);
    let platform = Builder::new()
        .backend(backend)
        .registry(sample_registry())
        .user(user(7))
        .verify_catalog(true)
        .build()?;

    assert!(matches!(
        platform.resolve(7).await,
        Err(Error::Fetch(7, e)) if matches!(
            e.as_ref(),
            Error::Rbac(sp7rbac::error::Error::CatalogMismatch { .. }),
        ),
    ));
    assert_eq!(platform.state(7), FetchState::Unfetched);
    assert!(matches!(
        platform.verify_catalog().await,
        Err(Error::Rbac(sp7rbac::error::Error::CatalogMismatch { .. })),
    ));
    Ok(())
}

#[tokio::test]
async fn save_user_policies() -> anyhow::Result<()> {
    let mut backend = MockPlatform::new();
    backend.expect_store_user_policies()
        .times(1)
        .withf(|user_id: &i64, collection_id: &Option<i64>, policies: &StoredPolicies| {
            *user_id == 2
                && *collection_id == Some(7)
                && policies.get("/system/sp7/collection") == Some(&vec!["access".to_string()])
                && policies.get("/field/%") == Some(&vec!["%".to_string()])
        })
        .returning(|_, _, _| Ok(()));
    let platform = platform(backend, user(7));
    let mut receiver = platform.subscribe();

    let stored = platform.save_user_policies(
        2,
        Some(7),
        &[Policy::new("/system/sp7/collection", ["access"])],
    ).await?;
    assert_eq!(stored.len(), 2);
    assert_eq!(
        receiver.try_recv(),
        Ok(PermissionsChanged::Saved { collection_id: Some(7) }),
    );
    assert_eq!(receiver.try_recv(), Err(TryRecvError::Empty));
    Ok(())
}

#[tokio::test]
async fn save_own_policies_refetches() -> anyhow::Result<()> {
    let mut backend = MockPlatform::new();
    let mut calls = 0;
    backend.expect_query_permissions()
        .times(4)
        .returning(move |_, _, queries: &[PermissionQuery]| {
            calls += 1;
            if calls <= 2 {
                Ok(answer(queries, &[]))
            } else {
                // the grant is institution level, backed by a policy
                // stored without a collection
                let mut outcomes = answer(queries, &[("/admin/user/password", "update")]);
                for outcome in outcomes.iter_mut() {
                    if let QueryOutcome::Resolved(row) = outcome {
                        if row.resource == "/admin/user/password" {
                            row.matching_user_policies.push(user_evidence(None));
                        }
                    }
                }
                Ok(outcomes)
            }
        });
    backend.expect_store_user_policies()
        .times(1)
        .returning(|_, _, _| Ok(()));
    let platform = platform(backend, user(7));
    platform.resolve(7).await?;
    platform.resolve(8).await?;
    assert!(!platform.has_permission("/admin/user/password", "update", 7));

    // institution level policies affect every collection held
    platform.save_user_policies(
        1,
        None,
        &[Policy::new("/admin/user/password", ["update"])],
    ).await?;
    assert!(platform.has_permission("/admin/user/password", "update", 7));
    assert!(platform.has_permission("/admin/user/password", "update", 8));
    Ok(())
}

#[tokio::test]
async fn roles() -> anyhow::Result<()> {
    let mut backend = MockPlatform::new();
    backend.expect_fetch_roles()
        .with(eq(RoleScope::Institution))
        .times(1)
        .returning(|_| Ok(None));
    backend.expect_fetch_roles()
        .with(eq(RoleScope::Collection(7)))
        .times(1)
        .returning(|_| Ok(Some(vec![])));
    backend.expect_fetch_roles()
        .with(eq(RoleScope::Collection(8)))
        .times(1)
        .returning(|_| Ok(Some(vec![RoleRecord {
            id: Some(3),
            name: "Curator".into(),
            description: "".into(),
            policies: stored([
                ("/table/spquery", vec!["read"]),
                ("/table/spqueryfield", vec!["read"]),
                ("/tree/edit/taxon", vec!["%"]),
                ("/field/%", vec!["%"]),
            ]),
        }])));
    backend.expect_store_role()
        .times(1)
        .withf(|scope: &RoleScope, role: &RoleRecord| {
            *scope == RoleScope::Collection(8)
                && role.policies.contains_key("/table/spquery")
                && role.policies.contains_key("/table/spqueryfield")
                && !role.policies.contains_key("/tool/querybuilder")
        })
        .returning(|_, _| Ok(42));
    let platform = platform(backend, user(7));

    // not permitted to list is distinct from no roles
    assert_eq!(platform.load_roles(RoleScope::Institution).await?, None);
    assert_eq!(platform.load_roles(RoleScope::Collection(7)).await?, Some(vec![]));

    let roles = platform.load_roles(RoleScope::Collection(8)).await?
        .expect("roles listed");
    let role = &roles[0];
    assert!(!role.is_draft());
    assert!(!role.policies.iter().any(|p| p.resource == "/field/%"));
    assert!(role.policies.contains(&Policy::new("/tool/querybuilder", ["read"])));
    assert!(role.policies.contains(&Policy::new(
        "/tree/edit/taxon",
        ["merge", "move", "synonymize", "desynonymize"],
    )));

    let mut receiver = platform.subscribe();
    let draft = Role {
        id: None,
        .. role.clone()
    };
    assert_eq!(platform.save_role(RoleScope::Collection(8), &draft).await?, 42);
    assert_eq!(
        receiver.try_recv(),
        Ok(PermissionsChanged::Saved { collection_id: Some(8) }),
    );
    Ok(())
}
