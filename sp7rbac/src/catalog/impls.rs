use sp7core::ac::{
    StoredPolicies,
    query::PermissionQuery,
    resource::{
        CRUD_ACTIONS,
        ResourcePath,
    },
};
use std::collections::{
    BTreeMap,
    BTreeSet,
};

use crate::error::Error;
use super::*;

/// A serialization of the policies that is independent of key and
/// action ordering, used to compare catalogs.
pub fn canonical(policies: &StoredPolicies) -> Result<String, Error> {
    let normalized = policies.iter()
        .map(|(resource, actions)| (
            ResourcePath::parse(resource).to_string(),
            actions.iter().collect::<BTreeSet<_>>(),
        ))
        .fold(BTreeMap::<String, BTreeSet<&String>>::new(), |mut acc, (k, v)| {
            acc.entry(k).or_default().extend(v);
            acc
        });
    Ok(serde_json::to_string(&normalized)?)
}

impl Catalog {
    pub fn from_json(value: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(value)?)
    }

    /// The operation policies the authorization service is expected to
    /// know about.
    pub fn expected_policies(&self) -> StoredPolicies {
        self.operation_policies
            .iter()
            .filter(|policy| !policy.front_end_only)
            .map(|policy| (policy.resource.clone(), policy.actions.clone()))
            .collect()
    }

    /// Compare against the catalog reported by the service.
    pub fn verify(&self, fetched: &StoredPolicies) -> Result<(), Error> {
        let expected = canonical(&self.expected_policies())?;
        let fetched = canonical(fetched)?;
        if expected == fetched {
            log::trace!("policy catalog verified");
            Ok(())
        } else {
            log::warn!("policy catalog mismatch");
            Err(Error::CatalogMismatch { expected, fetched })
        }
    }

    /// Assemble the batched query: one entry per operation policy, one
    /// per concrete table and one per derived source not otherwise
    /// covered.
    pub fn queries(&self) -> Vec<PermissionQuery> {
        let mut queries = self.operation_policies
            .iter()
            .map(|policy| PermissionQuery {
                resource: policy.resource.clone(),
                actions: policy.actions.clone(),
            })
            .chain(self.tables.iter().map(|table| PermissionQuery {
                resource: ResourcePath::table(&table.name).to_string(),
                actions: CRUD_ACTIONS.iter().map(|a| a.to_string()).collect(),
            }))
            .collect::<Vec<_>>();
        for derived in self.derived.iter() {
            match queries.iter_mut().find(|q| q.resource == derived.source) {
                Some(query) => {
                    for action in derived.actions.iter() {
                        if !query.actions.contains(action) {
                            query.actions.push(action.clone());
                        }
                    }
                }
                None => queries.push(PermissionQuery {
                    resource: derived.source.clone(),
                    actions: derived.actions.clone(),
                }),
            }
        }
        queries
    }

    pub fn is_collection_scoped(&self, resource: &str) -> bool {
        let path = ResourcePath::parse(resource);
        self.collection_scoped
            .iter()
            .any(|scoped| ResourcePath::parse(scoped) == path)
    }
}
