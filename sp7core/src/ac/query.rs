//! Permission queries
//!
//! The authorization service answers a batch of [`PermissionQuery`]
//! entries with one [`PermissionQueryRow`] per resource and action.  The
//! evidence lists justify the decision and are shown to administrators.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct PermissionQuery {
    pub resource: String,
    pub actions: Vec<String>,
}

/// A role policy that matched the query.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct RoleEvidence {
    #[serde(rename = "roleid")]
    pub role_id: i64,
    #[serde(rename = "rolename")]
    pub role_name: String,
    pub resource: String,
    pub action: String,
}

/// A policy granted directly to the user that matched the query.  A
/// `collection_id` of `None` marks a policy given at institution level.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct UserEvidence {
    #[serde(rename = "userid")]
    pub user_id: i64,
    #[serde(rename = "collectionid")]
    pub collection_id: Option<i64>,
    pub resource: String,
    pub action: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct PermissionQueryRow {
    pub resource: String,
    pub action: String,
    pub allowed: bool,
    #[serde(default)]
    pub matching_role_policies: Vec<RoleEvidence>,
    #[serde(default)]
    pub matching_user_policies: Vec<UserEvidence>,
}

/// An entry in the response to a batched query.  The service may refuse
/// to even disclose a decision; that is not a failure of the query.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum QueryOutcome {
    Resolved(PermissionQueryRow),
    DeniedByVisibility {
        resource: String,
        action: String,
    },
}

impl PermissionQueryRow {
    pub fn new(
        resource: impl Into<String>,
        action: impl Into<String>,
        allowed: bool,
    ) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            allowed,
            matching_role_policies: Vec::new(),
            matching_user_policies: Vec::new(),
        }
    }
}

impl From<PermissionQueryRow> for QueryOutcome {
    fn from(row: PermissionQueryRow) -> Self {
        Self::Resolved(row)
    }
}
