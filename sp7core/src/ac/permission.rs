use std::collections::BTreeMap;

/// `action -> allowed`
pub type ActionMap = BTreeMap<String, bool>;
/// `resource -> action -> allowed`
pub type PermissionMap = BTreeMap<String, ActionMap>;

/// The resolved permissions of the current user for one collection.
///
/// Instances are built wholesale from a query response and never
/// patched afterwards.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedPermissions {
    /// Keyed by the normalized resource name.
    pub operations: PermissionMap,
    /// Keyed by the lowercase table name.
    pub tables: PermissionMap,
    /// Keyed by the normalized resource name of the derived resource.
    pub derived: PermissionMap,
}

fn lookup(map: &PermissionMap, key: &str, action: &str) -> bool {
    map.get(key)
        .and_then(|actions| actions.get(action))
        .copied()
        .unwrap_or(false)
}

impl ResolvedPermissions {
    pub fn operation(&self, resource: &str, action: &str) -> bool {
        lookup(&self.operations, resource, action)
    }

    pub fn table(&self, table: &str, action: &str) -> bool {
        lookup(&self.tables, table, action)
    }

    pub fn derived(&self, resource: &str, action: &str) -> bool {
        lookup(&self.derived, resource, action)
    }
}
