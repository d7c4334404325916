//! Construction of the permission maps from a query result

use sp7core::ac::{
    permission::{
        PermissionMap,
        ResolvedPermissions,
    },
    query::PermissionQueryRow,
    resource::{
        ResourcePath,
        TABLE_NAMESPACE,
    },
};
use sp7rbac::{
    Registry,
    compressor::compress,
};

use crate::correction::correct_institutional;

// Repeated decisions for the same resource and action fail closed.
fn record(map: &mut PermissionMap, key: String, action: String, allowed: bool) {
    map.entry(key)
        .or_default()
        .entry(action)
        .and_modify(|current| *current &= allowed)
        .or_insert(allowed);
}

/// Derived resources take the decision of their source resource, where
/// only policies granted at institution level count.
pub fn derive(
    registry: &Registry,
    rows: &[PermissionQueryRow],
) -> PermissionMap {
    let mut result = PermissionMap::new();
    for derived in registry.catalog().derived.iter() {
        let source = ResourcePath::parse(&derived.source);
        let resource = ResourcePath::parse(&derived.resource).to_string();
        for row in rows.iter() {
            if !derived.actions.contains(&row.action)
                || ResourcePath::parse(&row.resource) != source
            {
                continue;
            }
            let allowed = row.allowed && row.matching_user_policies
                .iter()
                .any(|policy| policy.collection_id.is_none());
            record(&mut result, resource.clone(), row.action.clone(), allowed);
        }
    }
    result
}

/// Build the operation, table and derived maps from the rows of a
/// query result.  Wildcard actions are expected to have been expanded.
pub fn resolve_rows(
    registry: &Registry,
    rows: Vec<PermissionQueryRow>,
) -> ResolvedPermissions {
    let derived = derive(registry, &rows);
    let rows = correct_institutional(registry, rows);

    let mut tables = PermissionMap::new();
    for row in rows.iter() {
        let path = ResourcePath::parse(&row.resource);
        if let Some(table) = path.table_name() {
            record(&mut tables, table.to_string(), row.action.clone(), row.allowed);
        }
    }

    let mut operations = PermissionMap::new();
    for row in compress(registry, rows) {
        let path = ResourcePath::parse(&row.resource);
        if path.namespace() == Some(TABLE_NAMESPACE) {
            continue;
        }
        record(&mut operations, path.to_string(), row.action, row.allowed);
    }

    log::trace!(
        "resolved {} operations, {} tables, {} derived resources",
        operations.len(),
        tables.len(),
        derived.len(),
    );
    ResolvedPermissions { operations, tables, derived }
}
