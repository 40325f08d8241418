//! Catalog tree types shown in the host's data catalog pane

use serde::{Deserialize, Serialize};

/// A node in the catalog tree (catalog, schema, table or column)
///
/// Nodes are built bottom-up: children are sorted before they are attached
/// with [`CatalogItem::with_children`], and there is no way to mutate a node
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogItem {
    qualified_identifier: String,
    query_name: String,
    label: String,
    type_label: String,
    children: Vec<CatalogItem>,
}

impl CatalogItem {
    /// Create a leaf node
    pub fn new(
        qualified_identifier: impl Into<String>,
        query_name: impl Into<String>,
        label: impl Into<String>,
        type_label: impl Into<String>,
    ) -> Self {
        Self {
            qualified_identifier: qualified_identifier.into(),
            query_name: query_name.into(),
            label: label.into(),
            type_label: type_label.into(),
            children: Vec::new(),
        }
    }

    /// Attach already-sorted children
    pub fn with_children(mut self, children: Vec<CatalogItem>) -> Self {
        self.children = children;
        self
    }

    /// Fully delimited path, unique within a snapshot
    pub fn qualified_identifier(&self) -> &str {
        &self.qualified_identifier
    }

    /// Text that can be pasted verbatim into generated SQL
    pub fn query_name(&self) -> &str {
        &self.query_name
    }

    /// Display name
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Short type/kind code
    pub fn type_label(&self) -> &str {
        &self.type_label
    }

    pub fn children(&self) -> &[CatalogItem] {
        &self.children
    }

    /// Labels of the direct children, in order
    pub fn child_labels(&self) -> Vec<&str> {
        self.children.iter().map(|c| c.label.as_str()).collect()
    }

    fn find(&self, qualified_identifier: &str) -> Option<&CatalogItem> {
        if self.qualified_identifier == qualified_identifier {
            return Some(self);
        }
        self.children
            .iter()
            .find_map(|child| child.find(qualified_identifier))
    }

    fn count(&self) -> usize {
        1 + self.children.iter().map(CatalogItem::count).sum::<usize>()
    }
}

/// Root of the catalog tree: the ordered list of catalogs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    items: Vec<CatalogItem>,
}

impl Catalog {
    /// Create a catalog from top-level items
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self { items }
    }

    /// An empty catalog (nothing indexed yet)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Top-level (catalog) labels, in order
    pub fn labels(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.label()).collect()
    }

    /// Look up any node in the tree by its qualified identifier
    pub fn find(&self, qualified_identifier: &str) -> Option<&CatalogItem> {
        self.items
            .iter()
            .find_map(|item| item.find(qualified_identifier))
    }

    /// Total number of nodes in the tree
    pub fn node_count(&self) -> usize {
        self.items.iter().map(CatalogItem::count).sum()
    }
}
