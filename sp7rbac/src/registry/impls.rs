use sp7core::ac::resource::{
    ANY,
    CRUD_ACTIONS,
    DELIMITER,
    ResourcePath,
    TABLE_NAMESPACE,
    TOOL_NAMESPACE,
};
use std::collections::BTreeMap;

use crate::{
    catalog::Catalog,
    error::Error,
};
use super::*;

struct Entry {
    path: ResourcePath,
    label: String,
    actions: Vec<String>,
    group_name: String,
    is_institutional: bool,
}

fn crud() -> Vec<String> {
    CRUD_ACTIONS.iter().map(|a| a.to_string()).collect()
}

fn union_into(target: &mut Vec<String>, actions: &[String]) {
    for action in actions {
        if !target.contains(action) {
            target.push(action.clone());
        }
    }
}

impl Builder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn catalog(mut self, val: Catalog) -> Self {
        self.catalog = Some(val);
        self
    }

    pub fn build(self) -> Result<Registry, Error> {
        let catalog = self.catalog.ok_or(Error::Builder("catalog"))?;
        Registry::new(catalog)
    }
}

// Table and tool names become a single path segment.
fn check_name(namespace: &str, name: &str) -> Result<(), Error> {
    if name.is_empty() || name == ANY || name.contains(DELIMITER) {
        return Err(Error::InvalidResource(format!("{namespace}{DELIMITER}{name}")));
    }
    Ok(())
}

fn entries(catalog: &Catalog) -> Result<Vec<Entry>, Error> {
    let mut entries = Vec::new();
    for table in catalog.tables.iter() {
        check_name(TABLE_NAMESPACE, &table.name)?;
        entries.push(Entry {
            path: ResourcePath::table(&table.name),
            label: table.label.clone().unwrap_or_else(|| table.name.clone()),
            actions: crud(),
            group_name: TABLE_NAMESPACE.to_string(),
            is_institutional: false,
        });
    }
    for tool in catalog.tools.iter() {
        check_name(TOOL_NAMESPACE, &tool.name)?;
        if let Some(table) = tool.tables
            .iter()
            .find(|table| !catalog.tables.iter().any(|t| t.name.eq_ignore_ascii_case(table)))
        {
            return Err(Error::UnknownTable {
                tool: tool.name.clone(),
                table: table.clone(),
            });
        }
        entries.push(Entry {
            path: ResourcePath::tool(&tool.name),
            label: tool.label.clone().unwrap_or_else(|| tool.name.clone()),
            actions: crud(),
            group_name: TOOL_NAMESPACE.to_string(),
            is_institutional: false,
        });
    }
    let operations = catalog.operation_policies
        .iter()
        .map(|op| (&op.resource, &op.label, &op.group, &op.actions))
        .chain(catalog.derived
            .iter()
            .map(|op| (&op.resource, &op.label, &op.group, &op.actions))
        );
    for (resource, label, group, actions) in operations {
        let path = ResourcePath::parse(resource);
        let Some(last) = path.segments().last() else {
            return Err(Error::InvalidResource(resource.clone()));
        };
        entries.push(Entry {
            label: label.clone().unwrap_or_else(|| last.clone()),
            actions: actions.clone(),
            group_name: group.clone()
                .or_else(|| path.namespace().map(str::to_string))
                .unwrap_or_default(),
            // institution level unless known to take effect per collection
            is_institutional: !catalog.is_collection_scoped(resource),
            path,
        });
    }
    Ok(entries)
}

fn insert(root: &mut Children, entry: Entry) {
    let Some((leaf, parents)) = entry.path.segments().split_last() else {
        return;
    };
    let mut children = root;
    for segment in parents {
        let node = children.entry(segment.clone())
            .or_insert_with(|| RegistryNode {
                label: segment.clone(),
                group_name: entry.group_name.clone(),
                is_institutional: true,
                .. Default::default()
            });
        children = &mut node.children;
    }
    let node = children.entry(leaf.clone()).or_default();
    node.label = entry.label;
    union_into(&mut node.actions, &entry.actions);
    node.group_name = entry.group_name;
    node.is_institutional = entry.is_institutional;
}

// Attach the synthetic wildcard child at every level that has children,
// returning the union of the actions found under the given children and
// whether all of them are institution level.
fn attach_any(children: &mut Children) -> (Vec<String>, bool) {
    let mut actions = Vec::new();
    let mut institutional = true;
    for (segment, node) in children.iter_mut() {
        if segment == ANY {
            continue;
        }
        union_into(&mut actions, &node.actions);
        institutional &= node.is_institutional;
        if node.children.is_empty() {
            continue;
        }
        let (below, below_institutional) = attach_any(&mut node.children);
        union_into(&mut actions, &below);
        // an intermediate node is only institutional if all below it are
        if node.actions.is_empty() {
            node.is_institutional = below_institutional;
        }
        institutional &= below_institutional;
    }
    if !children.is_empty() {
        let any = children.entry(ANY.to_string())
            .or_insert_with(|| RegistryNode {
                label: ANY.to_string(),
                .. Default::default()
            });
        union_into(&mut any.actions, &actions);
        let any_actions = any.actions.clone();
        any.is_institutional = institutional;
        actions = any_actions;
    }
    (actions, institutional)
}

impl Registry {
    pub fn new(catalog: Catalog) -> Result<Self, Error> {
        let mut root = Children::new();
        let entries = entries(&catalog)?;
        let n = entries.len();
        for entry in entries {
            insert(&mut root, entry);
        }
        attach_any(&mut root);
        // the root wildcard always exists, even for an empty catalog
        root.entry(ANY.to_string())
            .or_insert_with(|| RegistryNode {
                label: ANY.to_string(),
                .. Default::default()
            });
        log::debug!("registry built from {n} resource entries");

        let tools = catalog.tools
            .iter()
            .map(|tool| ToolEntry {
                name: tool.name.to_lowercase(),
                label: tool.label.clone(),
                tables: tool.tables.iter().map(|t| t.to_lowercase()).collect(),
            })
            .collect::<Vec<_>>();
        let table_tools = tools.iter()
            .enumerate()
            .fold(BTreeMap::<String, Vec<usize>>::new(), |mut acc, (idx, tool)| {
                for table in tool.tables.iter() {
                    acc.entry(table.clone()).or_default().push(idx);
                }
                acc
            });
        Ok(Self { catalog, root, tools, table_tools })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn root(&self) -> &Children {
        &self.root
    }

    pub fn lookup(&self, path: &ResourcePath) -> Option<&RegistryNode> {
        let (leaf, parents) = path.segments().split_last()?;
        self.children_at(parents)?.get(leaf)
    }

    /// The children found at the prefix; `None` once the prefix walks
    /// off the known tree.
    pub fn children_at(&self, prefix: &[String]) -> Option<&Children> {
        prefix.iter()
            .try_fold(&self.root, |children, segment| children
                .get(segment)
                .map(|node| &node.children)
            )
    }

    /// Every action that may be granted on the resource.  Tool resources
    /// always expose the CRUD vocabulary, whether or not they are known.
    pub fn all_actions_under(&self, path: &ResourcePath) -> Vec<String> {
        if path.is_tool_path() {
            return crud();
        }
        let Some(node) = self.lookup(path) else {
            return Vec::new();
        };
        let mut actions = node.actions.clone();
        if let Some(any) = node.children.get(ANY) {
            union_into(&mut actions, &any.actions);
        }
        actions
    }

    /// Unknown resources are never institution level.
    pub fn is_institutional(&self, resource: &str) -> bool {
        self.lookup(&ResourcePath::parse(resource))
            .map(|node| node.is_institutional)
            .unwrap_or(false)
    }

    pub fn tools(&self) -> &[ToolEntry] {
        &self.tools
    }

    pub fn tool(&self, name: &str) -> Option<&ToolEntry> {
        self.tools.iter()
            .find(|tool| tool.name.eq_ignore_ascii_case(name))
    }

    /// The tools a table belongs to, in catalog order.
    pub fn tools_for_table(&self, table: &str) -> impl Iterator<Item = &ToolEntry> {
        self.table_tools
            .get(&table.to_lowercase())
            .into_iter()
            .flatten()
            .map(|idx| &self.tools[*idx])
    }

    /// Every declared resource with actions, in path order.
    pub fn leaves(&self) -> Vec<(ResourcePath, &RegistryNode)> {
        fn walk<'a>(
            prefix: &ResourcePath,
            children: &'a Children,
            acc: &mut Vec<(ResourcePath, &'a RegistryNode)>,
        ) {
            for (segment, node) in children.iter() {
                if segment == ANY {
                    continue;
                }
                let path = if prefix.is_empty() {
                    ResourcePath::parse(segment)
                } else {
                    prefix.join(segment)
                };
                if !node.actions.is_empty() {
                    acc.push((path.clone(), node));
                }
                walk(&path, &node.children, acc);
            }
        }
        let mut acc = Vec::new();
        walk(&ResourcePath::default(), &self.root, &mut acc);
        acc
    }
}

impl Registry {
    /// Leaf resources keyed by their group name.
    pub fn groups(&self) -> BTreeMap<&str, Vec<ResourcePath>> {
        self.leaves()
            .into_iter()
            .fold(BTreeMap::new(), |mut acc, (path, node)| {
                acc.entry(node.group_name.as_str()).or_default().push(path);
                acc
            })
    }
}

impl RegistryNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}
