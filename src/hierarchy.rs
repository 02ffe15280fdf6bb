use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use crate::{title_from_segment, Document};

pub type NodeId = usize;

/// A node in the page tree. Nodes live in the `Hierarchy` arena; parent and
/// child references are arena indexes, never owning pointers.
#[derive(Debug)]
pub struct PageNode {
    /// Stringified relative path; empty for the root.
    pub id: String,
    pub title: String,
    pub path: PathBuf,
    pub document: Option<Document>,
    pub weight: i32,
    pub confluence_id: Option<String>,
    pub is_virtual: bool,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl PageNode {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// The built page tree plus its lookup indexes.
#[derive(Debug)]
pub struct Hierarchy {
    nodes: Vec<PageNode>,
    root: NodeId,
    nodes_by_path: HashMap<String, NodeId>,
    nodes_by_id: HashMap<String, NodeId>,
    nodes_by_stem: HashMap<String, NodeId>,
    orphans: Vec<Document>,
    virtual_nodes: Vec<NodeId>,
}

pub fn path_key(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(segment) => segment.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

impl Hierarchy {
    /// Builds the tree from a flat document list. Index documents become
    /// directory pages; directories without an index become virtual nodes.
    pub fn build(documents: Vec<Document>) -> Hierarchy {
        Builder::new().build(documents)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &PageNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get_by_path(&self, path: &str) -> Option<NodeId> {
        self.nodes_by_path.get(path).copied()
    }

    pub fn get_by_id(&self, id: &str) -> Option<NodeId> {
        self.nodes_by_id.get(id).copied()
    }

    /// Resolves the basename of an internal link (file stem or directory
    /// segment) to a node. First match in tree order wins.
    pub fn resolve_stem(&self, basename: &str) -> Option<NodeId> {
        self.nodes_by_stem.get(basename).copied()
    }

    pub fn orphans(&self) -> &[Document] {
        &self.orphans
    }

    pub fn virtual_nodes(&self) -> &[NodeId] {
        &self.virtual_nodes
    }

    pub fn paths(&self) -> impl Iterator<Item = (&String, &NodeId)> {
        self.nodes_by_path.iter()
    }

    /// Depth of a node below the root; the root itself is depth 0.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            depth += 1;
            current = parent;
        }
        depth
    }

    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![];
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            out.push(parent);
            current = parent;
        }
        out
    }

    /// Pre-order walk in presentation order (children already sorted).
    pub fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            for child in self.nodes[id].children.iter().rev() {
                stack.push(*child);
            }
        }
        out
    }
}

struct Builder {
    nodes: Vec<PageNode>,
    nodes_by_path: HashMap<String, NodeId>,
    nodes_by_id: HashMap<String, NodeId>,
    orphans: Vec<Document>,
    virtual_nodes: Vec<NodeId>,
}

impl Builder {
    fn new() -> Self {
        Builder {
            nodes: vec![],
            nodes_by_path: HashMap::new(),
            nodes_by_id: HashMap::new(),
            orphans: vec![],
            virtual_nodes: vec![],
        }
    }

    fn build(mut self, documents: Vec<Document>) -> Hierarchy {
        let mut root_index = None;
        let mut index_docs = vec![];
        let mut page_docs = vec![];

        for doc in documents {
            if doc.is_index() && doc.depth() == 1 {
                root_index = Some(doc);
            } else if doc.is_index() {
                index_docs.push(doc);
            } else {
                page_docs.push(doc);
            }
        }

        let root = self.create_root(root_index);

        // Index documents shallowest-first, so a parent directory's page
        // exists before any nested directory attaches to it.
        index_docs.sort_by_key(|doc| doc.depth());

        for doc in index_docs {
            self.place_index_document(doc);
        }

        for doc in page_docs {
            self.place_page_document(doc);
        }

        self.sort_children(root);

        let nodes_by_stem = self.build_stem_index(root);

        Hierarchy {
            nodes: self.nodes,
            root,
            nodes_by_path: self.nodes_by_path,
            nodes_by_id: self.nodes_by_id,
            nodes_by_stem,
            orphans: self.orphans,
            virtual_nodes: self.virtual_nodes,
        }
    }

    fn create_root(&mut self, root_index: Option<Document>) -> NodeId {
        let node = match root_index {
            Some(doc) => {
                let alias = path_key(doc.path());
                let id = self.push_node(PageNode {
                    id: String::new(),
                    title: doc.title().to_string(),
                    path: PathBuf::new(),
                    weight: doc.weight(),
                    confluence_id: doc.confluence_id_hint().map(str::to_string),
                    document: Some(doc),
                    is_virtual: false,
                    parent: None,
                    children: vec![],
                });
                self.nodes_by_path.insert(alias, id);
                id
            }
            None => self.push_node(PageNode {
                id: String::new(),
                title: "Home".to_string(),
                path: PathBuf::new(),
                document: None,
                weight: 0,
                confluence_id: None,
                is_virtual: true,
                parent: None,
                children: vec![],
            }),
        };

        self.nodes_by_path.insert(String::new(), node);
        node
    }

    /// Materialises the directory page an index document governs.
    fn place_index_document(&mut self, doc: Document) {
        let dir: PathBuf = doc.path().parent().unwrap_or(Path::new("")).to_path_buf();
        let key = path_key(&dir);

        if self.nodes_by_path.contains_key(&key) {
            // A second index for the same directory cannot be placed.
            self.orphans.push(doc);
            return;
        }

        let grandparent = dir.parent().unwrap_or(Path::new("")).to_path_buf();
        let parent_id = self.ensure_directory(&grandparent);

        let alias = path_key(doc.path());
        let id = self.push_node(PageNode {
            id: key.clone(),
            title: doc.title().to_string(),
            path: dir,
            weight: doc.weight(),
            confluence_id: doc.confluence_id_hint().map(str::to_string),
            document: Some(doc),
            is_virtual: false,
            parent: Some(parent_id),
            children: vec![],
        });
        self.attach(parent_id, id);
        self.nodes_by_path.insert(key, id);
        self.nodes_by_path.insert(alias, id);
    }

    fn place_page_document(&mut self, doc: Document) {
        let key = path_key(doc.path());
        if self.nodes_by_path.contains_key(&key) {
            self.orphans.push(doc);
            return;
        }

        let dir = doc.path().parent().unwrap_or(Path::new("")).to_path_buf();
        let parent_id = self.ensure_directory(&dir);

        let id = self.push_node(PageNode {
            id: key.clone(),
            title: doc.title().to_string(),
            path: doc.path().to_path_buf(),
            weight: doc.weight(),
            confluence_id: doc.confluence_id_hint().map(str::to_string),
            document: Some(doc),
            is_virtual: false,
            parent: Some(parent_id),
            children: vec![],
        });
        self.attach(parent_id, id);
        self.nodes_by_path.insert(key, id);
    }

    /// Returns the node for a directory, materialising the ancestor chain
    /// with virtual nodes where no index document exists.
    fn ensure_directory(&mut self, dir: &Path) -> NodeId {
        let key = path_key(dir);
        if let Some(id) = self.nodes_by_path.get(&key) {
            return *id;
        }

        let parent_dir = dir.parent().unwrap_or(Path::new("")).to_path_buf();
        let parent_id = self.ensure_directory(&parent_dir);

        let segment = dir
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default();

        let id = self.push_node(PageNode {
            id: key.clone(),
            title: title_from_segment(segment),
            path: dir.to_path_buf(),
            document: None,
            weight: 0,
            confluence_id: None,
            is_virtual: true,
            parent: Some(parent_id),
            children: vec![],
        });
        self.attach(parent_id, id);
        self.nodes_by_path.insert(key, id);
        self.virtual_nodes.push(id);

        id
    }

    fn push_node(&mut self, node: PageNode) -> NodeId {
        let id = self.nodes.len();
        self.nodes_by_id.insert(node.id.clone(), id);
        self.nodes.push(node);
        id
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent].children.push(child);
    }

    /// Presentation order: weight ascending, then title case-insensitive
    /// ascending. The sort is stable, so insertion order breaks ties.
    fn sort_children(&mut self, id: NodeId) {
        let mut children = std::mem::take(&mut self.nodes[id].children);
        children.sort_by(|a, b| {
            let a = &self.nodes[*a];
            let b = &self.nodes[*b];
            a.weight
                .cmp(&b.weight)
                .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
        });

        for child in &children {
            self.sort_children(*child);
        }
        self.nodes[id].children = children;
    }

    fn build_stem_index(&self, root: NodeId) -> HashMap<String, NodeId> {
        let mut index = HashMap::new();
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];

            // Directory pages answer to their directory segment name,
            // leaf pages to their file stem.
            let stem = if node.document.as_ref().map(|d| d.is_index()).unwrap_or(false)
                || node.is_virtual
            {
                node.path.file_name().and_then(|s| s.to_str())
            } else {
                node.path.file_stem().and_then(|s| s.to_str())
            };

            if let Some(stem) = stem {
                index.entry(stem.to_string()).or_insert(id);
            }

            for child in node.children.iter().rev() {
                stack.push(*child);
            }
        }

        index
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Config;
    use std::path::Path;

    fn config() -> Config {
        Config::from_yaml_str(
            Path::new("project"),
            indoc! {"
            space:
              key: DOCS
            confluence:
              url: https://example.atlassian.net/wiki
            "},
        )
        .unwrap()
    }

    fn page(path: &str, raw: &str, config: &Config) -> Document {
        Document::new(Path::new(path), raw.to_string(), config, None).unwrap()
    }

    fn build(paths: &[(&str, &str)]) -> Hierarchy {
        let config = config();
        let docs = paths
            .iter()
            .map(|(path, raw)| page(path, raw, &config))
            .collect();
        Hierarchy::build(docs)
    }

    #[test]
    fn root_binds_to_a_top_level_index() {
        let hierarchy = build(&[("index.md", "# Welcome\n"), ("guide.md", "# Guide\n")]);

        let root = hierarchy.node(hierarchy.root());
        assert!(!root.is_virtual);
        assert_eq!(root.title, "Welcome");
        assert_eq!(root.id, "");
        assert_eq!(root.children.len(), 1);

        // The index document is reachable by its own path too
        assert_eq!(hierarchy.get_by_path("index.md"), Some(hierarchy.root()));
    }

    #[test]
    fn root_without_index_is_virtual_home() {
        let hierarchy = build(&[("guide.md", "# Guide\n")]);

        let root = hierarchy.node(hierarchy.root());
        assert!(root.is_virtual);
        assert_eq!(root.title, "Home");
    }

    #[test]
    fn nested_index_binds_to_its_directory() {
        let hierarchy = build(&[
            ("docs/index.md", "# Documentation\n"),
            ("docs/setup.md", "# Setup\n"),
        ]);

        let dir = hierarchy.get_by_path("docs").unwrap();
        let node = hierarchy.node(dir);
        assert!(!node.is_virtual);
        assert_eq!(node.title, "Documentation");

        // Both lookup forms resolve to the same node
        assert_eq!(hierarchy.get_by_path("docs/index.md"), Some(dir));

        let setup = hierarchy.get_by_path("docs/setup.md").unwrap();
        assert_eq!(hierarchy.node(setup).parent, Some(dir));
    }

    #[test]
    fn directories_without_index_become_virtual() {
        let hierarchy = build(&[("guides/deep/page.md", "# Page\n")]);

        let guides = hierarchy.get_by_path("guides").unwrap();
        let deep = hierarchy.get_by_path("guides/deep").unwrap();

        assert!(hierarchy.node(guides).is_virtual);
        assert!(hierarchy.node(deep).is_virtual);
        assert_eq!(hierarchy.node(guides).title, "Guides");
        assert_eq!(hierarchy.virtual_nodes().len(), 2);

        let page = hierarchy.get_by_path("guides/deep/page.md").unwrap();
        assert_eq!(hierarchy.node(page).parent, Some(deep));
        assert_eq!(hierarchy.node(deep).parent, Some(guides));
    }

    #[test]
    fn children_sort_by_weight_then_title() {
        let hierarchy = build(&[
            ("zebra.md", "# Zebra\n"),
            ("apple.md", "---\nweight: 5\n---\n# Apple\n"),
            ("Mango.md", "# mango\n"),
            ("banana.md", "# Banana\n"),
        ]);

        let root = hierarchy.node(hierarchy.root());
        let titles: Vec<&str> = root
            .children
            .iter()
            .map(|c| hierarchy.node(*c).title.as_str())
            .collect();

        // weight 0 sorts before weight 5; titles compare lowercased
        assert_eq!(titles, vec!["Banana", "mango", "Zebra", "Apple"]);
    }

    #[test]
    fn every_indexed_path_is_reachable_from_the_root() {
        let hierarchy = build(&[
            ("index.md", "# Home\n"),
            ("a.md", "# A\n"),
            ("docs/index.md", "# Docs\n"),
            ("docs/nested/page.md", "# Page\n"),
        ]);

        let reachable: std::collections::HashSet<NodeId> =
            hierarchy.walk().into_iter().collect();

        for (path, id) in hierarchy.paths() {
            assert!(
                reachable.contains(id),
                "path {} points at unreachable node",
                path
            );
        }
    }

    #[test]
    fn parent_and_child_pointers_agree() {
        let hierarchy = build(&[
            ("index.md", "# Home\n"),
            ("docs/index.md", "# Docs\n"),
            ("docs/a.md", "# A\n"),
            ("docs/deep/b.md", "# B\n"),
        ]);

        for id in hierarchy.walk() {
            let node = hierarchy.node(id);
            if let Some(parent) = node.parent {
                let count = hierarchy
                    .node(parent)
                    .children
                    .iter()
                    .filter(|c| **c == id)
                    .count();
                assert_eq!(count, 1);
            }
            for child in &node.children {
                assert_eq!(hierarchy.node(*child).parent, Some(id));
            }
        }
    }

    #[test]
    fn duplicate_paths_become_orphans() {
        let config = config();
        let docs = vec![
            page("a.md", "# First\n", &config),
            page("a.md", "# Second\n", &config),
        ];
        let hierarchy = Hierarchy::build(docs);

        assert_eq!(hierarchy.orphans().len(), 1);
    }

    #[test]
    fn confluence_id_hint_is_preserved() {
        let hierarchy = build(&[("page.md", "---\nconfluence_id: '777'\n---\n# P\n")]);

        let id = hierarchy.get_by_path("page.md").unwrap();
        assert_eq!(hierarchy.node(id).confluence_id.as_deref(), Some("777"));
    }

    #[test]
    fn depths_count_from_the_root() {
        let hierarchy = build(&[("a/b/c.md", "# C\n")]);

        let c = hierarchy.get_by_path("a/b/c.md").unwrap();
        assert_eq!(hierarchy.depth(c), 3);
        assert_eq!(hierarchy.depth(hierarchy.root()), 0);
    }

    #[test]
    fn stems_resolve_to_nodes() {
        let hierarchy = build(&[
            ("guide/index.md", "# The Guide\n"),
            ("guide/setup.md", "# Setup\n"),
        ]);

        let setup = hierarchy.resolve_stem("setup").unwrap();
        assert_eq!(hierarchy.node(setup).title, "Setup");

        let guide = hierarchy.resolve_stem("guide").unwrap();
        assert_eq!(hierarchy.node(guide).title, "The Guide");
    }
}
