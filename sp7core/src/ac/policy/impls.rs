use super::*;
use crate::ac::resource::ANY;

impl Policy {
    pub fn new(
        resource: impl Into<String>,
        actions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut result = Self {
            resource: resource.into(),
            actions: Vec::new(),
        };
        result.merge(actions);
        result
    }

    /// Union the actions into this policy, keeping the order of first
    /// appearance.
    pub fn merge(
        &mut self,
        actions: impl IntoIterator<Item = impl Into<String>>,
    ) {
        for action in actions.into_iter().map(Into::into) {
            if !self.actions.contains(&action) {
                self.actions.push(action);
            }
        }
    }

    /// Whether the action is listed, either directly or via the wildcard.
    pub fn grants(&self, action: &str) -> bool {
        self.actions
            .iter()
            .any(|a| a == action || a == ANY)
    }
}

/// Merge policies sharing a resource, keeping the position of the first
/// occurrence of each resource.
pub fn merge_duplicates(
    policies: impl IntoIterator<Item = Policy>,
) -> Vec<Policy> {
    policies.into_iter()
        .fold(Vec::<Policy>::new(), |mut acc, policy| {
            match acc.iter_mut().find(|p| p.resource == policy.resource) {
                Some(existing) => existing.merge(policy.actions),
                None => acc.push(Policy::new(policy.resource, policy.actions)),
            }
            acc
        })
}
