use sp7core::ac::{
    Policy,
    StoredPolicies,
    merge_duplicates,
    query::PermissionQueryRow,
    resource::{
        ANY,
        COLLECTION_ACCESS,
        COLLECTION_ACCESS_ACTION,
        FIELD_SENTINEL,
        ResourcePath,
    },
    role::{
        Role,
        RoleRecord,
    },
};
use std::collections::BTreeSet;

use super::*;

/// Policies granted whenever collection access is granted.
fn basic_policies() -> Vec<Policy> {
    vec![Policy::new(FIELD_SENTINEL, [ANY])]
}

fn normalize(resource: &str) -> String {
    let path = ResourcePath::parse(resource);
    if path.is_empty() {
        resource.to_string()
    } else {
        path.to_string()
    }
}

fn action_set(policy: &Policy) -> BTreeSet<&String> {
    policy.actions.iter().collect()
}

impl<'r> PolicyCodec<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Convert the stored form into the editable list of policies.
    pub fn decode(&self, stored: &StoredPolicies) -> Vec<Policy> {
        let sentinel = ResourcePath::parse(FIELD_SENTINEL);
        let policies = stored.iter()
            .filter(|(resource, _)| ResourcePath::parse(resource) != sentinel)
            .map(|(resource, actions)| Policy::new(
                normalize(resource),
                self.expand_actions(&ResourcePath::parse(resource), actions),
            ));
        self.collapse_tools(merge_duplicates(policies))
    }

    /// Convert the editable list of policies into the stored form.
    pub fn encode(&self, policies: &[Policy]) -> StoredPolicies {
        let merged = merge_duplicates(policies.iter()
            .map(|policy| Policy::new(normalize(&policy.resource), policy.actions.clone()))
        );
        let expanded = merge_duplicates(merged.into_iter()
            .flat_map(|policy| self.expand_tool(policy))
        );

        if expanded.iter().any(|policy| self.grants_everything(policy)) {
            log::trace!("universal policy subsumes every other policy");
            return StoredPolicies::from([(ANY.to_string(), vec![ANY.to_string()])]);
        }

        let collection_access = ResourcePath::parse(COLLECTION_ACCESS);
        let grants_access = expanded.iter()
            .any(|policy| ResourcePath::parse(&policy.resource).covers(&collection_access)
                && policy.grants(COLLECTION_ACCESS_ACTION)
            );
        let mut result = expanded.into_iter()
            .map(|Policy { resource, actions }| (resource, actions))
            .collect::<StoredPolicies>();
        if grants_access {
            for basic in basic_policies() {
                let entry = result.entry(basic.resource).or_default();
                for action in basic.actions {
                    if !entry.contains(&action) {
                        entry.push(action);
                    }
                }
            }
        }
        result
    }

    pub fn decode_role(&self, record: RoleRecord) -> Role {
        Role {
            policies: self.decode(&record.policies),
            id: record.id,
            name: record.name,
            description: record.description,
        }
    }

    pub fn encode_role(&self, role: &Role) -> RoleRecord {
        RoleRecord {
            id: role.id,
            name: role.name.clone(),
            description: role.description.clone(),
            policies: self.encode(&role.policies),
        }
    }

    /// Replace every row carrying the wildcard action with one row per
    /// action known for its resource.  Rows for unknown resources are
    /// passed through as there is no way to know their actions.
    pub fn expand_wildcard_actions(
        &self,
        rows: Vec<PermissionQueryRow>,
    ) -> Vec<PermissionQueryRow> {
        rows.into_iter()
            .flat_map(|row| {
                if row.action != ANY {
                    return vec![row];
                }
                let actions = self.registry
                    .all_actions_under(&ResourcePath::parse(&row.resource));
                if actions.is_empty() {
                    return vec![row];
                }
                actions.into_iter()
                    .map(|action| PermissionQueryRow { action, ..row.clone() })
                    .collect()
            })
            .collect()
    }

    fn expand_actions(&self, path: &ResourcePath, actions: &[String]) -> Vec<String> {
        if !actions.iter().any(|action| action == ANY) {
            return actions.to_vec();
        }
        let known = self.registry.all_actions_under(path);
        if known.is_empty() {
            return actions.to_vec();
        }
        let mut result = Policy::default();
        for action in actions {
            if action == ANY {
                result.merge(known.iter().cloned());
            } else {
                result.merge([action.clone()]);
            }
        }
        result.actions
    }

    // Fold the tables of a tool back into the tool, but only if every one
    // of them carries the same actions.
    fn collapse_tools(&self, policies: Vec<Policy>) -> Vec<Policy> {
        let find = |resource: String| policies.iter()
            .find(|policy| policy.resource == resource);
        let collapsed = self.registry.tools()
            .iter()
            .filter_map(|tool| {
                let mut tables = tool.tables
                    .iter()
                    .map(|table| find(ResourcePath::table(table).to_string()));
                let first = tables.next()??;
                let expected = action_set(first);
                tables.all(|policy| policy
                        .map(|policy| action_set(policy) == expected)
                        .unwrap_or(false)
                    )
                    .then(|| (tool, first.actions.clone()))
            })
            .collect::<Vec<_>>();
        if collapsed.is_empty() {
            return policies;
        }

        let mut emitted = vec![false; collapsed.len()];
        let mut result = Vec::new();
        for policy in policies.iter() {
            let owners = collapsed.iter()
                .enumerate()
                .filter(|(_, (tool, _))| tool.tables
                    .iter()
                    .any(|table| ResourcePath::table(table).to_string() == policy.resource)
                )
                .map(|(idx, _)| idx)
                .collect::<Vec<_>>();
            if owners.is_empty() {
                result.push(policy.clone());
                continue;
            }
            for idx in owners {
                if !emitted[idx] {
                    emitted[idx] = true;
                    let (tool, actions) = &collapsed[idx];
                    log::trace!("collapsing tables into tool {}", tool.name);
                    result.push(Policy::new(
                        ResourcePath::tool(&tool.name).to_string(),
                        actions.clone(),
                    ));
                }
            }
        }
        merge_duplicates(result)
    }

    fn expand_tool(&self, policy: Policy) -> Vec<Policy> {
        let path = ResourcePath::parse(&policy.resource);
        let tables = match path.tool_name() {
            Some(ANY) => self.registry.tools()
                .iter()
                .flat_map(|tool| tool.tables.iter())
                .collect::<Vec<_>>(),
            Some(name) => match self.registry.tool(name) {
                Some(tool) => tool.tables.iter().collect(),
                None => return vec![policy],
            },
            None => return vec![policy],
        };
        tables.into_iter()
            .map(|table| Policy::new(
                ResourcePath::table(table).to_string(),
                policy.actions.clone(),
            ))
            .collect()
    }

    fn grants_everything(&self, policy: &Policy) -> bool {
        let path = ResourcePath::parse(&policy.resource);
        if !path.is_any() {
            return false;
        }
        if policy.actions.iter().any(|action| action == ANY) {
            return true;
        }
        let all = self.registry.all_actions_under(&path);
        !all.is_empty() && all.iter().all(|action| policy.actions.contains(action))
    }
}
