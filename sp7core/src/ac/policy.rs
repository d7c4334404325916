//! Policies
//!
//! The backend stores the grants for a role or a user as a flat map of
//! resource name to the list of permitted actions; this is the
//! [`StoredPolicies`] type.  Editors work with a list of [`Policy`]
//! records instead, with at most one record per resource.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The storage representation, `{resource: [actions]}`.
pub type StoredPolicies = BTreeMap<String, Vec<String>>;

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct Policy {
    pub resource: String,
    pub actions: Vec<String>,
}

mod impls;
pub use impls::merge_duplicates;
