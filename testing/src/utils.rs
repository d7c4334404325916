use sp7core::ac::{
    StoredPolicies,
    query::{
        PermissionQuery,
        PermissionQueryRow,
        QueryOutcome,
        UserEvidence,
    },
};

pub fn is_send_sync<T: Send + Sync>(_: &T) -> bool {
    true
}

pub fn row(resource: &str, action: &str, allowed: bool) -> PermissionQueryRow {
    PermissionQueryRow::new(resource, action, allowed)
}

/// Evidence of a policy granted to user 1, at institution level when
/// `collection_id` is `None`.
pub fn user_evidence(collection_id: Option<i64>) -> UserEvidence {
    UserEvidence {
        user_id: 1,
        collection_id,
        resource: "/test".into(),
        action: "read".into(),
    }
}

/// Answer every query with a resolved row, allowing only the listed
/// resource and action pairs.
pub fn answer(
    queries: &[PermissionQuery],
    allowed: &[(&str, &str)],
) -> Vec<QueryOutcome> {
    queries.iter()
        .flat_map(|query| query.actions.iter().map(move |action| (query, action)))
        .map(|(query, action)| {
            let granted = allowed.iter()
                .any(|(r, a)| *r == query.resource && a == action);
            row(&query.resource, action, granted).into()
        })
        .collect()
}

pub fn stored<'a>(
    entries: impl IntoIterator<Item = (&'a str, Vec<&'a str>)>,
) -> StoredPolicies {
    entries.into_iter()
        .map(|(resource, actions)| (
            resource.to_string(),
            actions.into_iter().map(str::to_string).collect(),
        ))
        .collect()
}
