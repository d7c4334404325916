//! Correction of query rows for institution level resources
//!
//! A grant on an institution level resource only has effect when given
//! without a collection.  The service may nonetheless report policies
//! scoped to a collection as matching, so such evidence is removed and
//! the decision recomputed from what survives.  Roles always belong to a
//! collection, so role evidence is dropped entirely.

use sp7core::ac::query::PermissionQueryRow;
use sp7rbac::Registry;

pub fn correct_row(
    registry: &Registry,
    mut row: PermissionQueryRow,
) -> PermissionQueryRow {
    if !registry.is_institutional(&row.resource) {
        return row;
    }
    row.matching_user_policies
        .retain(|policy| policy.collection_id.is_none());
    row.matching_role_policies.clear();
    row.allowed = row.allowed && !row.matching_user_policies.is_empty();
    row
}

pub fn correct_institutional(
    registry: &Registry,
    rows: Vec<PermissionQueryRow>,
) -> Vec<PermissionQueryRow> {
    rows.into_iter()
        .map(|row| correct_row(registry, row))
        .collect()
}
