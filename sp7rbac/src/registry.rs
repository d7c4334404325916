//! The resource registry
//!
//! A tree keyed by resource path segments, derived once from a
//! [`Catalog`] and read-only afterwards.  Every non-leaf level carries a
//! synthetic [`ANY`](sp7core::ac::resource::ANY) child whose actions are
//! the union of everything reachable below that level, so that "all
//! sub-resources" may be offered as a choice.

use std::collections::BTreeMap;

use crate::catalog::{
    Catalog,
    ToolEntry,
};

pub type Children = BTreeMap<String, RegistryNode>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegistryNode {
    pub label: String,
    pub actions: Vec<String>,
    pub children: Children,
    pub group_name: String,
    pub is_institutional: bool,
}

/// Builds the [`Registry`] from a [`Catalog`].
#[derive(Clone, Debug, Default)]
pub struct Builder {
    catalog: Option<Catalog>,
}

pub struct Registry {
    catalog: Catalog,
    root: Children,
    // the tables a tool represents, in catalog order
    tools: Vec<ToolEntry>,
    // reverse of the above
    table_tools: BTreeMap<String, Vec<usize>>,
}

mod impls;
