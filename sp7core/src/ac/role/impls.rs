use std::fmt;

use super::*;

impl Role {
    pub fn is_draft(&self) -> bool {
        self.id.is_none()
    }
}

impl RoleScope {
    pub fn collection_id(&self) -> Option<i64> {
        match self {
            Self::Institution => None,
            Self::Collection(id) => Some(*id),
        }
    }

    /// Only collection roles may be assigned to users.
    pub fn is_assignable(&self) -> bool {
        matches!(self, Self::Collection(_))
    }
}

impl From<Option<i64>> for RoleScope {
    fn from(value: Option<i64>) -> Self {
        value.map(Self::Collection)
            .unwrap_or(Self::Institution)
    }
}

impl fmt::Display for RoleScope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Institution => f.write_str("institution"),
            Self::Collection(id) => write!(f, "collection {id}"),
        }
    }
}
