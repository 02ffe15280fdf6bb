use std::collections::HashSet;

use crate::checksum;
use crate::hierarchy::{path_key, Hierarchy, NodeId};
use crate::markdown::converter::{stub_page_body, ConverterOptions, StorageConverter};
use crate::state::SyncState;

/// One step of a sync plan. The payload each kind carries is exactly what
/// its executor step needs; invalid combinations are unrepresentable.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    Create {
        node: NodeId,
        path: String,
        title: String,
        body: String,
        content_hash: String,
        parent_path: Option<String>,
        reason: String,
    },
    Update {
        node: NodeId,
        confluence_id: String,
        path: String,
        title: String,
        body: String,
        content_hash: String,
        parent_id: Option<String>,
        parent_path: Option<String>,
        reason: String,
    },
    Move {
        node: NodeId,
        confluence_id: String,
        path: String,
        new_parent_id: Option<String>,
        parent_path: Option<String>,
        reason: String,
    },
    Skip {
        node: NodeId,
        confluence_id: String,
        path: String,
        reason: String,
    },
    Delete {
        confluence_id: String,
        path: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Create,
    Update,
    Move,
    Skip,
    Delete,
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Move => "move",
            ActionKind::Skip => "skip",
            ActionKind::Delete => "delete",
        }
    }
}

impl SyncAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            SyncAction::Create { .. } => ActionKind::Create,
            SyncAction::Update { .. } => ActionKind::Update,
            SyncAction::Move { .. } => ActionKind::Move,
            SyncAction::Skip { .. } => ActionKind::Skip,
            SyncAction::Delete { .. } => ActionKind::Delete,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            SyncAction::Create { path, .. }
            | SyncAction::Update { path, .. }
            | SyncAction::Move { path, .. }
            | SyncAction::Skip { path, .. }
            | SyncAction::Delete { path, .. } => path,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            SyncAction::Create { reason, .. }
            | SyncAction::Update { reason, .. }
            | SyncAction::Move { reason, .. }
            | SyncAction::Skip { reason, .. }
            | SyncAction::Delete { reason, .. } => reason,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ActionCounts {
    pub creates: usize,
    pub updates: usize,
    pub moves: usize,
    pub skips: usize,
    pub deletes: usize,
}

/// The totally-ordered list of actions one sync intends to apply: creates
/// parents-first, then updates, moves, skips, and finally deletes
/// children-first.
#[derive(Debug)]
pub struct SyncPlan {
    pub space_key: String,
    pub root_page_id: Option<String>,
    pub actions: Vec<SyncAction>,
}

impl SyncPlan {
    pub fn counts(&self) -> ActionCounts {
        let mut counts = ActionCounts::default();
        for action in &self.actions {
            match action.kind() {
                ActionKind::Create => counts.creates += 1,
                ActionKind::Update => counts.updates += 1,
                ActionKind::Move => counts.moves += 1,
                ActionKind::Skip => counts.skips += 1,
                ActionKind::Delete => counts.deletes += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    pub force: bool,
    pub delete_orphans: bool,
}

pub struct DiffEngine<'h> {
    hierarchy: &'h Hierarchy,
    converter_options: ConverterOptions,
    strip_frontmatter: bool,
}

impl<'h> DiffEngine<'h> {
    pub fn new(
        hierarchy: &'h Hierarchy,
        converter_options: ConverterOptions,
        strip_frontmatter: bool,
    ) -> Self {
        DiffEngine {
            hierarchy,
            converter_options,
            strip_frontmatter,
        }
    }

    /// The state key a node syncs under: the document's relative path, or
    /// the directory path for virtual nodes.
    pub fn state_key(&self, id: NodeId) -> String {
        let node = self.hierarchy.node(id);
        match &node.document {
            Some(doc) => path_key(doc.path()),
            None => path_key(&node.path),
        }
    }

    /// Renders a node's body to storage format. Content hashes are taken
    /// over this rendered output, so converter changes trigger updates the
    /// same way source edits do.
    pub fn render(&self, id: NodeId) -> String {
        let resolver = |basename: &str| {
            self.hierarchy
                .resolve_stem(basename)
                .map(|target| self.hierarchy.node(target).title.clone())
        };
        let converter =
            StorageConverter::new(self.converter_options.clone()).with_resolver(&resolver);

        let node = self.hierarchy.node(id);
        match &node.document {
            Some(doc) => {
                let source = if self.strip_frontmatter {
                    doc.body()
                } else {
                    doc.raw()
                };
                converter.convert(source)
            }
            None => stub_page_body(),
        }
    }

    pub fn plan(
        &self,
        state: &SyncState,
        root_page_id: Option<&str>,
        options: DiffOptions,
    ) -> SyncPlan {
        let mut creates = vec![];
        let mut updates = vec![];
        let mut moves = vec![];
        let mut skips = vec![];

        let mut tree_keys = HashSet::new();

        for id in self.hierarchy.walk() {
            let node = self.hierarchy.node(id);

            // A virtual root stands for the configured root page itself
            // and is never synced as a page of its own.
            if node.is_root() && node.is_virtual {
                continue;
            }

            let path = self.state_key(id);
            tree_keys.insert(path.clone());

            let body = self.render(id);
            let content_hash = checksum::content_hash(body.as_bytes());
            let parent_id = self.parent_id_from_state(id, state, root_page_id);
            let parent_path = node.parent.map(|parent| self.state_key(parent));
            let title = node.title.clone();

            let page_state = state.page(&path).filter(|ps| !ps.confluence_id.is_empty());

            match page_state {
                None => {
                    // A frontmatter hint binds the page to an existing
                    // remote id instead of creating a duplicate.
                    if let Some(hint) = &node.confluence_id {
                        updates.push(SyncAction::Update {
                            node: id,
                            confluence_id: hint.clone(),
                            path,
                            title,
                            body,
                            content_hash,
                            parent_id,
                            parent_path,
                            reason: "Bound to existing page".to_string(),
                        });
                    } else {
                        creates.push(SyncAction::Create {
                            node: id,
                            path,
                            title,
                            body,
                            content_hash,
                            parent_path,
                            reason: "New page".to_string(),
                        });
                    }
                }
                Some(ps) => {
                    let parent_changed = parent_id != ps.parent_id;

                    if options.force {
                        updates.push(SyncAction::Update {
                            node: id,
                            confluence_id: ps.confluence_id.clone(),
                            path,
                            title,
                            body,
                            content_hash,
                            parent_id,
                            parent_path,
                            reason: "Force update".to_string(),
                        });
                    } else if content_hash != ps.content_hash {
                        let reason = if parent_changed {
                            "Content and parent changed"
                        } else {
                            "Content changed"
                        };
                        updates.push(SyncAction::Update {
                            node: id,
                            confluence_id: ps.confluence_id.clone(),
                            path,
                            title,
                            body,
                            content_hash,
                            parent_id,
                            parent_path,
                            reason: reason.to_string(),
                        });
                    } else if title != ps.title {
                        updates.push(SyncAction::Update {
                            node: id,
                            confluence_id: ps.confluence_id.clone(),
                            path,
                            title,
                            body,
                            content_hash,
                            parent_id,
                            parent_path,
                            reason: "Title changed".to_string(),
                        });
                    } else if parent_changed {
                        moves.push(SyncAction::Move {
                            node: id,
                            confluence_id: ps.confluence_id.clone(),
                            path,
                            new_parent_id: parent_id,
                            parent_path,
                            reason: "Parent changed".to_string(),
                        });
                    } else {
                        skips.push(SyncAction::Skip {
                            node: id,
                            confluence_id: ps.confluence_id.clone(),
                            path,
                            reason: "Unchanged".to_string(),
                        });
                    }
                }
            }
        }

        // Parents before children; the walk is already pre-order, the sort
        // keeps it that way explicitly.
        creates.sort_by_key(|action| match action {
            SyncAction::Create { node, .. } => self.hierarchy.depth(*node),
            _ => 0,
        });

        let mut deletes = vec![];
        if options.delete_orphans {
            for (path, ps) in &state.pages {
                if !tree_keys.contains(path) {
                    deletes.push(SyncAction::Delete {
                        confluence_id: ps.confluence_id.clone(),
                        path: path.clone(),
                        reason: "Orphaned".to_string(),
                    });
                }
            }
            // Children first, so a page is never deleted before its
            // descendants.
            deletes.sort_by(|a, b| {
                let depth = |action: &SyncAction| action.path().split('/').count();
                depth(b).cmp(&depth(a)).then_with(|| a.path().cmp(b.path()))
            });
        }

        let mut actions = creates;
        actions.append(&mut updates);
        actions.append(&mut moves);
        actions.append(&mut skips);
        actions.append(&mut deletes);

        SyncPlan {
            space_key: state.space_key.clone(),
            root_page_id: root_page_id.map(str::to_string),
            actions,
        }
    }

    /// Parent id as known at diff time: the configured root for top-level
    /// nodes, the parent's recorded id otherwise. Freshly created parents
    /// are resolved later by the executor.
    fn parent_id_from_state(
        &self,
        id: NodeId,
        state: &SyncState,
        root_page_id: Option<&str>,
    ) -> Option<String> {
        let node = self.hierarchy.node(id);

        let parent = match node.parent {
            None => return root_page_id.map(str::to_string),
            Some(parent) => parent,
        };

        let parent_node = self.hierarchy.node(parent);
        if parent_node.is_root() && parent_node.is_virtual {
            return root_page_id.map(str::to_string);
        }

        state
            .page(&self.state_key(parent))
            .filter(|ps| !ps.confluence_id.is_empty())
            .map(|ps| ps.confluence_id.clone())
            .or_else(|| root_page_id.map(str::to_string))
    }
}
