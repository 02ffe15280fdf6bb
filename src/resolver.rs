use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use crate::hierarchy::{path_key, Hierarchy, NodeId};
use crate::markdown::UrlKind;

/// Pure queries over a built hierarchy: link resolution, ancestry, and
/// structural validation.
pub struct Resolver<'h> {
    hierarchy: &'h Hierarchy,
    index_file: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLink {
    pub source: NodeId,
    pub target: NodeId,
    pub text: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokenLink {
    pub source_path: PathBuf,
    pub text: String,
    pub href: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HierarchyStats {
    pub total_nodes: usize,
    pub real_nodes: usize,
    pub virtual_nodes: usize,
    pub max_depth: usize,
}

impl<'h> Resolver<'h> {
    pub fn new(hierarchy: &'h Hierarchy, index_file: &str) -> Self {
        Resolver {
            hierarchy,
            index_file: index_file.to_string(),
        }
    }

    /// Resolves every internal link of every bound document against the
    /// tree. Unresolvable links are simply absent from the result; use
    /// `find_broken_links` to surface them.
    pub fn resolve_links(&self) -> Vec<ResolvedLink> {
        self.scan_links().0
    }

    pub fn find_broken_links(&self) -> Vec<BrokenLink> {
        self.scan_links().1
    }

    fn scan_links(&self) -> (Vec<ResolvedLink>, Vec<BrokenLink>) {
        let mut resolved = vec![];
        let mut broken = vec![];

        for source in self.hierarchy.walk() {
            let node = self.hierarchy.node(source);
            let doc = match &node.document {
                Some(doc) => doc,
                None => continue,
            };

            let base_dir = doc.path().parent().unwrap_or(Path::new("")).to_path_buf();

            for link in doc.links() {
                let target_path = match &link.kind {
                    UrlKind::Local(path) => normalize(&base_dir, path),
                    _ => continue,
                };

                match self.locate(&target_path) {
                    Some(target) => resolved.push(ResolvedLink {
                        source,
                        target,
                        text: link.text.clone(),
                        href: link.href.clone(),
                    }),
                    None => broken.push(BrokenLink {
                        source_path: doc.path().to_path_buf(),
                        text: link.text.clone(),
                        href: link.href.clone(),
                    }),
                }
            }
        }

        (resolved, broken)
    }

    /// Match order: exact path, path with `.md` appended, path joined with
    /// the index file, path with `.md` stripped.
    fn locate(&self, path: &Path) -> Option<NodeId> {
        let key = path_key(path);

        if let Some(id) = self.hierarchy.get_by_path(&key) {
            return Some(id);
        }

        if let Some(id) = self.hierarchy.get_by_path(&format!("{}.md", key)) {
            return Some(id);
        }

        let with_index = if key.is_empty() {
            self.index_file.clone()
        } else {
            format!("{}/{}", key, self.index_file)
        };
        if let Some(id) = self.hierarchy.get_by_path(&with_index) {
            return Some(id);
        }

        if let Some(stripped) = key.strip_suffix(".md") {
            if let Some(id) = self.hierarchy.get_by_path(stripped) {
                return Some(id);
            }
        }

        None
    }

    /// Walks `b`'s root-path in reverse against the set of `a`'s ancestors
    /// (including `a` itself).
    pub fn find_common_ancestor(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        let mut ancestors_of_a: HashSet<NodeId> = HashSet::new();
        ancestors_of_a.insert(a);
        for ancestor in self.hierarchy.ancestors(a) {
            ancestors_of_a.insert(ancestor);
        }

        let mut current = Some(b);
        while let Some(id) = current {
            if ancestors_of_a.contains(&id) {
                return Some(id);
            }
            current = self.hierarchy.node(id).parent;
        }

        None
    }

    /// Relative reference from `a`'s containing directory to `b`: enough
    /// `../` to climb to the common ancestor, then the segments down to
    /// `b`. Empty for `a == b`, and `.` when nothing else remains.
    pub fn compute_relative_path(&self, a: NodeId, b: NodeId) -> String {
        if a == b {
            return String::new();
        }

        let common = match self.find_common_ancestor(a, b) {
            Some(common) => common,
            None => return String::new(),
        };

        let depth_a = self.hierarchy.depth(a);
        let depth_common = self.hierarchy.depth(common);
        let steps_up = depth_a.saturating_sub(depth_common + 1);

        let mut segments = vec![];
        let mut current = b;
        while current != common {
            let node = self.hierarchy.node(current);
            if let Some(segment) = node.path.file_name().and_then(|s| s.to_str()) {
                segments.push(segment.to_string());
            }
            current = match node.parent {
                Some(parent) => parent,
                None => break,
            };
        }
        segments.reverse();

        let mut out = "../".repeat(steps_up);
        out.push_str(&segments.join("/"));

        if out.is_empty() {
            ".".to_string()
        } else {
            out
        }
    }

    /// Structural defects: unreachable nodes, parent/child pointer
    /// mismatches, duplicate node ids. An empty list means well-formed.
    pub fn validate(&self) -> Vec<String> {
        let mut defects = vec![];

        let reachable: HashSet<NodeId> = self.hierarchy.walk().into_iter().collect();
        if reachable.len() != self.hierarchy.len() {
            for id in 0..self.hierarchy.len() {
                if !reachable.contains(&id) {
                    defects.push(format!(
                        "node `{}` is not reachable from the root",
                        self.hierarchy.node(id).id
                    ));
                }
            }
        }

        let mut seen_ids = HashSet::new();
        for id in 0..self.hierarchy.len() {
            let node = self.hierarchy.node(id);

            if !seen_ids.insert(node.id.as_str()) {
                defects.push(format!("duplicate node id `{}`", node.id));
            }

            if let Some(parent) = node.parent {
                let occurrences = self
                    .hierarchy
                    .node(parent)
                    .children
                    .iter()
                    .filter(|c| **c == id)
                    .count();
                if occurrences != 1 {
                    defects.push(format!(
                        "node `{}` appears {} times in its parent's children",
                        node.id, occurrences
                    ));
                }
            }

            for child in &node.children {
                if self.hierarchy.node(*child).parent != Some(id) {
                    defects.push(format!(
                        "child `{}` does not point back at `{}`",
                        self.hierarchy.node(*child).id,
                        node.id
                    ));
                }
            }
        }

        defects
    }

    /// Records each resolved link's source under its target.
    pub fn build_backlinks(&self) -> HashMap<NodeId, Vec<NodeId>> {
        let mut backlinks: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for link in self.resolve_links() {
            backlinks.entry(link.target).or_default().push(link.source);
        }
        backlinks
    }

    pub fn stats(&self) -> HierarchyStats {
        let mut stats = HierarchyStats::default();
        for id in self.hierarchy.walk() {
            stats.total_nodes += 1;
            if self.hierarchy.node(id).is_virtual {
                stats.virtual_nodes += 1;
            } else {
                stats.real_nodes += 1;
            }
            stats.max_depth = stats.max_depth.max(self.hierarchy.depth(id));
        }
        stats
    }
}

/// Resolves `href` against `base_dir`, folding `.` and `..` segments. A
/// leading `/` makes the reference root-relative.
fn normalize(base_dir: &Path, href: &Path) -> PathBuf {
    let mut segments: Vec<String> = if href.has_root() {
        vec![]
    } else {
        base_dir
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str().map(str::to_string),
                _ => None,
            })
            .collect()
    };

    for component in href.components() {
        match component {
            Component::Normal(segment) => {
                if let Some(segment) = segment.to_str() {
                    segments.push(segment.to_string());
                }
            }
            Component::ParentDir => {
                segments.pop();
            }
            _ => {}
        }
    }

    segments.iter().collect()
}
