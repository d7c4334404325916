//! Hierarchical resource identifiers
//!
//! Resources are addressed by slash delimited paths such as
//! `/table/agent`.  The reserved segment [`ANY`] stands in for every
//! sibling at its depth, and a path consisting of just that segment is
//! written as the bare token rather than with a leading delimiter.

use serde::{Deserialize, Serialize};

/// The wildcard token, used both as a resource segment and as an action.
pub const ANY: &str = "%";
pub const DELIMITER: char = '/';

pub const TABLE_NAMESPACE: &str = "table";
pub const TOOL_NAMESPACE: &str = "tool";

/// Internal resource that must be granted for the backend to permit any
/// field level edits.  Never shown to users.
pub const FIELD_SENTINEL: &str = "/field/%";

pub const COLLECTION_ACCESS: &str = "/system/sp7/collection";
pub const COLLECTION_ACCESS_ACTION: &str = "access";

pub const CRUD_ACTIONS: [&str; 4] = ["read", "create", "update", "delete"];

/// An ordered list of lowercase path segments.
///
/// Malformed input degrades to an empty path, which matches nothing.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub struct ResourcePath(Vec<String>);

/// Split the resource name into its segments, dropping empty ones.
pub fn parse(text: &str) -> Vec<String> {
    text.split(DELIMITER)
        .filter(|segment| !segment.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Join the segments back into a resource name.
pub fn serialize(segments: &[impl AsRef<str>]) -> String {
    match segments {
        [only] if only.as_ref() == ANY => ANY.to_string(),
        segments => segments.iter()
            .fold(String::new(), |mut acc, segment| {
                acc.push(DELIMITER);
                acc.push_str(segment.as_ref());
                acc
            }),
    }
}

/// Every non-empty leading prefix, shortest first.
pub fn prefixes<T>(segments: &[T]) -> Vec<&[T]> {
    (1..=segments.len())
        .map(|n| &segments[..n])
        .collect()
}

mod impls;
