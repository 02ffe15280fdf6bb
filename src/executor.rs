use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::confluence::client::{CreatePageRequest, UpdatePageRequest};
use crate::confluence::ConfluenceClient;
use crate::diff::{ActionKind, SyncAction, SyncPlan};
use crate::hierarchy::{Hierarchy, NodeId};
use crate::state::{PageState, StateStore, SyncState};
use crate::{Config, Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeStatus {
    Executed,
    Skipped,
    DryRun,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub kind: ActionKind,
    pub path: String,
    pub reason: String,
    pub status: OutcomeStatus,
}

/// Per-action outcomes of one executed plan, plus the overall error that
/// stopped it, if any.
#[derive(Debug, Default)]
pub struct SyncResult {
    pub outcomes: Vec<ActionOutcome>,
    pub warnings: Vec<String>,
    pub error: Option<Error>,
    pub dry_run: bool,
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Walks a plan sequentially against the remote. Actions run in plan
/// order; newly minted page ids are propagated to later creates through
/// `created_ids`. Any failure stops the walk, persists the state
/// accumulated so far, and is reported in the result.
pub struct Executor<'a> {
    client: &'a ConfluenceClient,
    store: &'a StateStore,
    hierarchy: &'a Hierarchy,
    content_dir: PathBuf,
    space_key: String,
    dry_run: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> Executor<'a> {
    pub fn new(
        client: &'a ConfluenceClient,
        store: &'a StateStore,
        hierarchy: &'a Hierarchy,
        config: &Config,
    ) -> Self {
        Executor {
            client,
            store,
            hierarchy,
            content_dir: config.content_dir(),
            space_key: config.space_key().to_string(),
            dry_run: false,
            cancel: None,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Cancellation is checked between actions; the in-flight call is
    /// allowed to finish.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn run(&self, plan: &SyncPlan, state: &mut SyncState) -> Result<SyncResult> {
        let mut result = SyncResult {
            dry_run: self.dry_run,
            ..SyncResult::default()
        };
        let mut created_ids: HashMap<String, String> = HashMap::new();

        state.root_page_id = plan.root_page_id.clone();

        for action in &plan.actions {
            if self.cancelled() {
                result.error = Some(Error::Generic("Cancelled".to_string()));
                self.store.save(state)?;
                return Ok(result);
            }

            if self.dry_run {
                result.outcomes.push(ActionOutcome {
                    kind: action.kind(),
                    path: action.path().to_string(),
                    reason: action.reason().to_string(),
                    status: OutcomeStatus::DryRun,
                });
                continue;
            }

            let status = match self.execute(action, state, &mut created_ids, &mut result) {
                Ok(status) => status,
                Err(err) => {
                    result.outcomes.push(ActionOutcome {
                        kind: action.kind(),
                        path: action.path().to_string(),
                        reason: action.reason().to_string(),
                        status: OutcomeStatus::Failed(err.to_string()),
                    });
                    result.error = Some(err);
                    // Keep what the successful actions achieved
                    self.store.save(state)?;
                    return Ok(result);
                }
            };

            result.outcomes.push(ActionOutcome {
                kind: action.kind(),
                path: action.path().to_string(),
                reason: action.reason().to_string(),
                status,
            });
        }

        if !self.dry_run {
            state.last_sync = Some(Utc::now());
            self.store.save(state)?;
        }

        Ok(result)
    }

    fn execute(
        &self,
        action: &SyncAction,
        state: &mut SyncState,
        created_ids: &mut HashMap<String, String>,
        result: &mut SyncResult,
    ) -> Result<OutcomeStatus> {
        match action {
            SyncAction::Create {
                node,
                path,
                title,
                body,
                content_hash,
                parent_path,
                ..
            } => {
                let ancestor =
                    self.resolve_parent(None, parent_path.as_deref(), created_ids, state);

                let page = self.client.create_page(&CreatePageRequest {
                    title: title.clone(),
                    space_key: self.space_key.clone(),
                    body: body.clone(),
                    ancestor: ancestor.clone(),
                })?;

                created_ids.insert(path.clone(), page.id.clone());
                state.upsert(
                    path,
                    PageState {
                        confluence_id: page.id.clone(),
                        content_hash: content_hash.clone(),
                        title: title.clone(),
                        parent_id: ancestor,
                        version: 1,
                    },
                );

                self.upload_attachments(*node, &page.id, result)?;
                Ok(OutcomeStatus::Executed)
            }

            SyncAction::Update {
                node,
                confluence_id,
                path,
                title,
                body,
                content_hash,
                parent_id,
                parent_path,
                ..
            } => {
                let ancestor = self.resolve_parent(
                    parent_id.as_deref(),
                    parent_path.as_deref(),
                    created_ids,
                    state,
                );

                let current = self.client.get_page(confluence_id)?;
                let next_version = current.version_number() + 1;

                self.client.update_page(&UpdatePageRequest {
                    page_id: confluence_id.clone(),
                    title: title.clone(),
                    space_key: self.space_key.clone(),
                    body: body.clone(),
                    version: next_version,
                    ancestor: ancestor.clone(),
                })?;

                state.upsert(
                    path,
                    PageState {
                        confluence_id: confluence_id.clone(),
                        content_hash: content_hash.clone(),
                        title: title.clone(),
                        parent_id: ancestor,
                        version: next_version,
                    },
                );

                self.upload_attachments(*node, confluence_id, result)?;
                Ok(OutcomeStatus::Executed)
            }

            SyncAction::Delete {
                confluence_id,
                path,
                ..
            } => {
                self.client.delete_page(confluence_id)?;
                state.remove(path);
                Ok(OutcomeStatus::Executed)
            }

            SyncAction::Move {
                confluence_id,
                path,
                new_parent_id,
                parent_path,
                ..
            } => {
                let target = self.resolve_parent(
                    new_parent_id.as_deref(),
                    parent_path.as_deref(),
                    created_ids,
                    state,
                );

                match &target {
                    Some(parent) => self.client.move_page(confluence_id, parent)?,
                    None => {
                        result.warnings.push(format!(
                            "{}: no target parent to move under, leaving in place",
                            path
                        ));
                        return Ok(OutcomeStatus::Skipped);
                    }
                }

                if let Some(ps) = state.page(path).cloned() {
                    state.upsert(
                        path,
                        PageState {
                            parent_id: target,
                            ..ps
                        },
                    );
                }
                Ok(OutcomeStatus::Executed)
            }

            SyncAction::Skip { .. } => Ok(OutcomeStatus::Skipped),
        }
    }

    /// The explicit parent id wins; otherwise ids minted earlier in this
    /// run, then the persisted state, then the configured root. Creates
    /// run parents-first, so a child always finds its parent here.
    fn resolve_parent(
        &self,
        parent_id: Option<&str>,
        parent_path: Option<&str>,
        created_ids: &HashMap<String, String>,
        state: &SyncState,
    ) -> Option<String> {
        if let Some(id) = parent_id {
            return Some(id.to_string());
        }

        if let Some(path) = parent_path {
            if let Some(id) = created_ids.get(path) {
                return Some(id.clone());
            }
            if let Some(ps) = state.page(path).filter(|ps| !ps.confluence_id.is_empty()) {
                return Some(ps.confluence_id.clone());
            }
        }

        state.root_page_id.clone()
    }

    /// Uploads every local image the node's document references. Missing
    /// files and duplicate-name rejections degrade to warnings; anything
    /// else halts the sync like any other remote failure.
    fn upload_attachments(
        &self,
        node: NodeId,
        page_id: &str,
        result: &mut SyncResult,
    ) -> Result<()> {
        let doc = match &self.hierarchy.node(node).document {
            Some(doc) => doc,
            None => return Ok(()),
        };

        let base_dir = doc
            .path()
            .parent()
            .map(|p| self.content_dir.join(p))
            .unwrap_or_else(|| self.content_dir.clone());

        for image in doc.images() {
            if image.is_external() {
                continue;
            }

            let file = base_dir.join(&image.destination);
            if !file.exists() {
                result.warnings.push(format!(
                    "{}: referenced image {} does not exist",
                    doc.path().display(),
                    image.destination
                ));
                continue;
            }

            match self.client.upload_attachment(page_id, &file) {
                Ok(()) => {}
                Err(Error::Validation(message)) => {
                    result
                        .warnings
                        .push(format!("{}: {}", image.destination, message));
                }
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::diff::{DiffEngine, DiffOptions};
    use crate::markdown::converter::ConverterOptions;
    use crate::Document;
    use std::path::Path;
    use tempfile::TempDir;

    fn config(url: &str) -> Config {
        Config::from_yaml_str(
            Path::new("project"),
            &format!(
                indoc! {"
                space:
                  key: DOCS
                confluence:
                  url: {}
                  username: me@example.com
                  apiToken: secret
                  retryCount: 1
                "},
                url
            ),
        )
        .unwrap()
    }

    fn build(pages: &[(&str, &str)], config: &Config) -> Hierarchy {
        let docs = pages
            .iter()
            .map(|(path, raw)| {
                Document::new(Path::new(path), raw.to_string(), config, None).unwrap()
            })
            .collect();
        Hierarchy::build(docs)
    }

    fn run_plan(
        server_url: &str,
        pages: &[(&str, &str)],
        state: &mut SyncState,
        root_page_id: Option<&str>,
        dry_run: bool,
    ) -> (SyncResult, TempDir) {
        let config = config(server_url);
        let hierarchy = build(pages, &config);
        let engine = DiffEngine::new(&hierarchy, ConverterOptions::default(), true);
        let plan = engine.plan(state, root_page_id, DiffOptions::default());

        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let client = ConfluenceClient::new(&config)
            .unwrap()
            .with_retry_delay(std::time::Duration::from_millis(1));

        let result = Executor::new(&client, &store, &hierarchy, &config)
            .dry_run(dry_run)
            .run(&plan, state)
            .unwrap();

        (result, dir)
    }

    #[test]
    fn child_create_carries_the_parents_fresh_id() {
        let mut server = mockito::Server::new();
        let parent = server
            .mock("POST", "/rest/api/content")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "title": "Docs"
            })))
            .with_status(200)
            .with_body(r#"{"id":"900","title":"Docs","version":{"number":1}}"#)
            .expect(1)
            .create();
        let child = server
            .mock("POST", "/rest/api/content")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "title": "Child",
                "ancestors": [{"id": "900"}]
            })))
            .with_status(200)
            .with_body(r#"{"id":"901","title":"Child","version":{"number":1}}"#)
            .expect(1)
            .create();

        let mut state = SyncState::empty("DOCS", None);
        let (result, _dir) = run_plan(
            &server.url(),
            &[
                ("docs/index.md", "# Docs\n"),
                ("docs/child.md", "# Child\n"),
            ],
            &mut state,
            None,
            false,
        );

        assert!(result.is_success());
        parent.assert();
        child.assert();

        assert_eq!(state.page("docs/index.md").unwrap().confluence_id, "900");
        let child_state = state.page("docs/child.md").unwrap();
        assert_eq!(child_state.confluence_id, "901");
        assert_eq!(child_state.parent_id.as_deref(), Some("900"));
        assert_eq!(child_state.version, 1);
        assert!(state.last_sync.is_some());
    }

    #[test]
    fn update_fetches_the_version_and_bumps_it() {
        let mut server = mockito::Server::new();
        let fetch = server
            .mock("GET", "/rest/api/content/300")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"id":"300","title":"Old","version":{"number":6}}"#)
            .expect(1)
            .create();
        let update = server
            .mock("PUT", "/rest/api/content/300")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "version": {"number": 7}
            })))
            .with_status(200)
            .with_body(r#"{"id":"300","title":"Page","version":{"number":7}}"#)
            .expect(1)
            .create();

        let mut state = SyncState::empty("DOCS", None);
        state.upsert(
            "page.md",
            PageState {
                confluence_id: "300".into(),
                content_hash: "sha256:stale".into(),
                title: "Page".into(),
                parent_id: None,
                version: 6,
            },
        );

        let (result, _dir) = run_plan(
            &server.url(),
            &[("page.md", "# Page\n")],
            &mut state,
            None,
            false,
        );

        assert!(result.is_success());
        fetch.assert();
        update.assert();
        assert_eq!(state.page("page.md").unwrap().version, 7);
    }

    #[test]
    fn delete_removes_the_state_entry() {
        let mut server = mockito::Server::new();
        let delete = server
            .mock("DELETE", "/rest/api/content/400")
            .with_status(204)
            .expect(1)
            .create();

        let config = config(&server.url());
        let hierarchy = build(&[], &config);
        let engine = DiffEngine::new(&hierarchy, ConverterOptions::default(), true);

        let mut state = SyncState::empty("DOCS", None);
        state.upsert(
            "old.md",
            PageState {
                confluence_id: "400".into(),
                content_hash: "sha256:aa".into(),
                title: "Old".into(),
                parent_id: None,
                version: 2,
            },
        );

        let plan = engine.plan(
            &state,
            None,
            DiffOptions {
                delete_orphans: true,
                ..DiffOptions::default()
            },
        );

        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let client = ConfluenceClient::new(&config).unwrap();

        let result = Executor::new(&client, &store, &hierarchy, &config)
            .run(&plan, &mut state)
            .unwrap();

        assert!(result.is_success());
        delete.assert();
        assert!(state.page("old.md").is_none());
    }

    #[test]
    fn dry_run_touches_nothing() {
        let mut server = mockito::Server::new();
        let create = server
            .mock("POST", "/rest/api/content")
            .with_status(200)
            .with_body("{}")
            .expect(0)
            .create();

        let mut state = SyncState::empty("DOCS", None);
        let (result, dir) = run_plan(
            &server.url(),
            &[("page.md", "# Page\n")],
            &mut state,
            None,
            true,
        );

        assert!(result.is_success());
        assert!(result.dry_run);
        assert!(result
            .outcomes
            .iter()
            .all(|o| o.status == OutcomeStatus::DryRun));
        create.assert();

        assert!(state.page("page.md").is_none());
        assert!(!dir.path().join("state.json").exists());
    }

    #[test]
    fn failure_stops_the_plan_and_keeps_partial_state() {
        let mut server = mockito::Server::new();
        let first = server
            .mock("POST", "/rest/api/content")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "title": "Alpha"
            })))
            .with_status(200)
            .with_body(r#"{"id":"910","title":"Alpha","version":{"number":1}}"#)
            .expect(1)
            .create();
        let second = server
            .mock("POST", "/rest/api/content")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "title": "Beta"
            })))
            .with_status(403)
            .with_body(r#"{"message":"no permission"}"#)
            .expect(1)
            .create();

        let mut state = SyncState::empty("DOCS", None);
        let (result, dir) = run_plan(
            &server.url(),
            &[("alpha.md", "# Alpha\n"), ("beta.md", "# Beta\n")],
            &mut state,
            None,
            false,
        );

        assert!(!result.is_success());
        first.assert();
        second.assert();

        // The first create survived into persisted state
        assert_eq!(state.page("alpha.md").unwrap().confluence_id, "910");
        assert!(state.page("beta.md").is_none());
        assert!(state.last_sync.is_none());
        assert!(dir.path().join("state.json").exists());

        let failed = result
            .outcomes
            .iter()
            .find(|o| o.path == "beta.md")
            .unwrap();
        assert!(matches!(failed.status, OutcomeStatus::Failed(_)));
    }

    #[test]
    fn cancellation_writes_partial_state() {
        let server = mockito::Server::new();
        let mut state = SyncState::empty("DOCS", None);

        let config = config(&server.url());
        let hierarchy = build(&[("page.md", "# Page\n")], &config);
        let engine = DiffEngine::new(&hierarchy, ConverterOptions::default(), true);
        let plan = engine.plan(&state, None, DiffOptions::default());

        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let client = ConfluenceClient::new(&config).unwrap();

        let flag = Arc::new(AtomicBool::new(true));
        let result = Executor::new(&client, &store, &hierarchy, &config)
            .with_cancel_flag(flag)
            .run(&plan, &mut state)
            .unwrap();

        assert_eq!(result.error.unwrap().to_string(), "Cancelled");
        assert!(result.outcomes.is_empty());
        assert!(dir.path().join("state.json").exists());
        assert!(state.last_sync.is_none());
    }
}
