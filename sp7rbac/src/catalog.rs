//! The resource catalog
//!
//! Which tables, tools and operation policies exist is deployment
//! configuration rather than engine behaviour.  A [`Catalog`] captures
//! that configuration and is the sole input for building the
//! [`Registry`](crate::registry::Registry).

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Catalog {
    #[serde(default)]
    pub tables: Vec<TableEntry>,
    #[serde(default)]
    pub tools: Vec<ToolEntry>,
    #[serde(default)]
    pub operation_policies: Vec<OperationPolicy>,
    /// Operation policies known to take effect at collection level.
    /// Every other operation policy applies at institution level only.
    #[serde(default)]
    pub collection_scoped: Vec<String>,
    #[serde(default)]
    pub derived: Vec<DerivedPolicy>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TableEntry {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// A curated name standing in for a fixed list of tables.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ToolEntry {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    pub tables: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct OperationPolicy {
    pub resource: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    pub actions: Vec<String>,
    /// Not known to the authorization service.
    #[serde(default)]
    pub front_end_only: bool,
}

/// A permission computed from the institution level decision on
/// `source` rather than being granted directly.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct DerivedPolicy {
    pub resource: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    pub source: String,
    pub actions: Vec<String>,
}

mod impls;
pub use impls::canonical;
