use std::fmt;

use super::*;

impl ResourcePath {
    pub fn parse(text: &str) -> Self {
        Self(parse(text))
    }

    /// The path covering every resource.
    pub fn any() -> Self {
        Self(vec![ANY.to_string()])
    }

    /// A name holding the delimiter yields more than two segments, which
    /// is never a table resource.
    pub fn table(name: &str) -> Self {
        Self::parse(TABLE_NAMESPACE).join(name)
    }

    pub fn tool(name: &str) -> Self {
        Self::parse(TOOL_NAMESPACE).join(name)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_any(&self) -> bool {
        matches!(self.0.as_slice(), [only] if only == ANY)
    }

    pub fn prefixes(&self) -> Vec<&[String]> {
        prefixes(&self.0)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    fn name_in(&self, namespace: &str) -> Option<&str> {
        match self.0.as_slice() {
            [ns, name] if ns == namespace => Some(name.as_str()),
            _ => None,
        }
    }

    /// The table name if this is a concrete or wildcard table resource.
    pub fn table_name(&self) -> Option<&str> {
        self.name_in(TABLE_NAMESPACE)
    }

    /// The tool name if this is a tool resource, which may be [`ANY`].
    pub fn tool_name(&self) -> Option<&str> {
        self.name_in(TOOL_NAMESPACE)
    }

    pub fn is_tool_path(&self) -> bool {
        self.namespace() == Some(TOOL_NAMESPACE)
    }

    pub fn parent(&self) -> Option<Self> {
        match self.0.len() {
            0 | 1 => None,
            n => Some(Self(self.0[..n - 1].to_vec())),
        }
    }

    /// Delimiters within the segment split it, and empty segments are
    /// dropped.
    pub fn join(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.extend(parse(segment));
        Self(segments)
    }

    /// Whether a grant on this path also grants the other path.  A
    /// wildcard segment covers everything at and below its depth.
    pub fn covers(&self, other: &Self) -> bool {
        if self.is_empty() {
            return false;
        }
        for (idx, segment) in self.0.iter().enumerate() {
            if segment == ANY {
                return other.0.len() > idx;
            }
            if other.0.get(idx) != Some(segment) {
                return false;
            }
        }
        self.0.len() == other.0.len()
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&serialize(&self.0))
    }
}

impl From<&str> for ResourcePath {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<String> for ResourcePath {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<ResourcePath> for String {
    fn from(value: ResourcePath) -> Self {
        value.to_string()
    }
}

impl FromIterator<String> for ResourcePath {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter()
            .flat_map(|segment| parse(&segment))
            .collect())
    }
}
