//! Folding of tool member rows in permission query results
//!
//! A user's access to a tool is the conjunction of their access to every
//! table the tool touches, so the per table rows of a query result are
//! replaced by one synthetic row per tool and action.

use serde::Serialize;
use sp7core::ac::{
    query::PermissionQueryRow,
    resource::ResourcePath,
};
use std::collections::HashMap;

use crate::registry::Registry;

// De-duplicate by serialized form, keeping the first occurrence.
fn dedup_evidence<T: Serialize>(items: Vec<T>) -> Vec<T> {
    let mut seen = Vec::<String>::new();
    items.into_iter()
        .filter(|item| {
            let key = serde_json::to_string(item)
                .unwrap_or_default();
            if seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        })
        .collect()
}

/// Replace the rows of tables belonging to a known tool with one row per
/// tool and action.  The other rows come first and are unchanged; the
/// synthetic rows follow in the order their first contributing row was
/// seen.  A tool without contributing rows produces no row at all.
pub fn compress(
    registry: &Registry,
    rows: Vec<PermissionQueryRow>,
) -> Vec<PermissionQueryRow> {
    let mut result = Vec::new();
    let mut synthetic = Vec::<PermissionQueryRow>::new();
    let mut index = HashMap::<(String, String), usize>::new();

    for row in rows.into_iter() {
        let path = ResourcePath::parse(&row.resource);
        let tools = path.table_name()
            .map(|table| registry.tools_for_table(table).collect::<Vec<_>>())
            .unwrap_or_default();
        if tools.is_empty() {
            result.push(row);
            continue;
        }
        for tool in tools {
            let resource = ResourcePath::tool(&tool.name).to_string();
            let idx = *index
                .entry((resource.clone(), row.action.clone()))
                .or_insert_with(|| {
                    synthetic.push(PermissionQueryRow::new(
                        resource,
                        row.action.clone(),
                        true,
                    ));
                    synthetic.len() - 1
                });
            let entry = &mut synthetic[idx];
            entry.allowed &= row.allowed;
            entry.matching_role_policies
                .extend(row.matching_role_policies.iter().cloned());
            entry.matching_user_policies
                .extend(row.matching_user_policies.iter().cloned());
        }
    }

    log::trace!(
        "compressed tool rows into {} synthetic rows",
        synthetic.len(),
    );
    result.extend(synthetic.into_iter().map(|mut row| {
        row.matching_role_policies = dedup_evidence(row.matching_role_policies);
        row.matching_user_policies = dedup_evidence(row.matching_user_policies);
        row
    }));
    result
}
