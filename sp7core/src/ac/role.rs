use serde::{Deserialize, Serialize};

use crate::ac::policy::{Policy, StoredPolicies};

/// Where a role lives.  Library roles belong to the institution and
/// serve as templates; only collection roles may be assigned to users.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub enum RoleScope {
    Institution,
    Collection(i64),
}

/// A role as presented for editing.  A role without an `id` is a draft
/// that has not been persisted.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Role {
    pub id: Option<i64>,
    pub name: String,
    pub description: String,
    pub policies: Vec<Policy>,
}

/// A role in its storage form.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct RoleRecord {
    pub id: Option<i64>,
    pub name: String,
    pub description: String,
    pub policies: StoredPolicies,
}

mod impls;
