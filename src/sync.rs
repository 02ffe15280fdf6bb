use std::time::Instant;

use bunt::termcolor::{ColorChoice, StandardStream};

use crate::config::Config;
use crate::confluence::ConfluenceClient;
use crate::diff::{ActionKind, DiffEngine, DiffOptions, SyncPlan};
use crate::executor::Executor;
use crate::hierarchy::Hierarchy;
use crate::markdown::converter::ConverterOptions;
use crate::resolver::Resolver;
use crate::state::StateStore;
use crate::{docs_finder, Error, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub force: bool,
    pub dry_run: bool,
}

pub struct SyncCommand {}

impl SyncCommand {
    pub fn run(config: Config, options: SyncOptions) -> Result<()> {
        let mut stdout = stdout_stream(&config);

        bunt::writeln!(stdout, "{$bold}{$blue}ConSync | Sync{/$}{/$}")?;

        let hierarchy = load_hierarchy(&config, &mut stdout)?;

        let client = ConfluenceClient::new(&config)?;
        client.test_connection()?;
        let space = client.get_space(config.space_key())?;
        bunt::writeln!(
            stdout,
            "Syncing into space {$bold}{}{/$} ({})",
            space.key,
            space.name
        )?;

        let root_page_id = resolve_root_page(&client, &config)?;

        let store = StateStore::new(config.state_file());
        let mut state = store.load(config.space_key(), root_page_id.as_deref());

        let engine = DiffEngine::new(&hierarchy, converter_options(&config), config.strip_frontmatter());
        let plan = engine.plan(
            &state,
            root_page_id.as_deref(),
            DiffOptions {
                force: options.force || config.update_unchanged(),
                delete_orphans: config.delete_orphans(),
            },
        );

        print_plan_summary(&plan, &mut stdout)?;

        let start = Instant::now();
        let result = Executor::new(&client, &store, &hierarchy, &config)
            .dry_run(options.dry_run)
            .run(&plan, &mut state)?;
        let duration = start.elapsed();

        for warning in &result.warnings {
            bunt::writeln!(stdout, "{$bold}{$yellow}WARNING{/$}{/$} {}", warning)?;
        }

        if let Some(error) = result.error {
            bunt::writeln!(stdout, "\n{$bold}{$red}Sync failed{/$}{/$}: {}", &error)?;
            return Err(error);
        }

        if options.dry_run {
            bunt::writeln!(stdout, "\n{$bold}Dry run{/$}: no remote calls were made")?;
        } else {
            bunt::writeln!(stdout, "\nSynced in {$bold}{:?}{/$}", duration)?;
        }

        Ok(())
    }
}

pub struct StatusCommand {}

impl StatusCommand {
    /// Prints the plan without touching the remote. The root page id comes
    /// from the configuration alone; a configured root title is resolved
    /// only during an actual sync.
    pub fn run(config: Config) -> Result<()> {
        let mut stdout = stdout_stream(&config);

        bunt::writeln!(stdout, "{$bold}{$blue}ConSync | Status{/$}{/$}")?;

        let hierarchy = load_hierarchy(&config, &mut stdout)?;
        let resolver = Resolver::new(&hierarchy, config.index_file());
        let stats = resolver.stats();

        bunt::writeln!(
            stdout,
            "{$bold}{}{/$} pages ({} from files, {} generated), max depth {}",
            stats.total_nodes,
            stats.real_nodes,
            stats.virtual_nodes,
            stats.max_depth
        )?;

        let store = StateStore::new(config.state_file());
        let state = store.load(config.space_key(), config.root_page_id());

        let engine = DiffEngine::new(&hierarchy, converter_options(&config), config.strip_frontmatter());
        let plan = engine.plan(
            &state,
            config.root_page_id(),
            DiffOptions {
                force: config.update_unchanged(),
                delete_orphans: config.delete_orphans(),
            },
        );

        bunt::writeln!(stdout, "")?;
        for action in &plan.actions {
            match action.kind() {
                ActionKind::Create => {
                    bunt::writeln!(stdout, "  {$green}create{/$} {}", action.path())?
                }
                ActionKind::Update => bunt::writeln!(
                    stdout,
                    "  {$yellow}update{/$} {} ({})",
                    action.path(),
                    action.reason()
                )?,
                ActionKind::Move => {
                    bunt::writeln!(stdout, "  {$cyan}move{/$}   {}", action.path())?
                }
                ActionKind::Skip => {
                    bunt::writeln!(stdout, "  skip   {}", action.path())?
                }
                ActionKind::Delete => {
                    bunt::writeln!(stdout, "  {$red}delete{/$} {}", action.path())?
                }
            }
        }

        print_plan_summary(&plan, &mut stdout)?;

        Ok(())
    }
}

pub struct CheckCommand {}

impl CheckCommand {
    pub fn run(config: Config) -> Result<()> {
        let mut stdout = stdout_stream(&config);

        bunt::writeln!(stdout, "{$bold}{$blue}ConSync | Check{/$}{/$}")?;

        let hierarchy = load_hierarchy(&config, &mut stdout)?;
        let resolver = Resolver::new(&hierarchy, config.index_file());

        let broken = resolver.find_broken_links();
        if broken.is_empty() {
            bunt::writeln!(stdout, "{$green}No broken links{/$}")?;
            return Ok(());
        }

        for link in &broken {
            bunt::writeln!(
                stdout,
                "  {$red}broken{/$} {} -> {}",
                link.source_path.display(),
                link.href
            )?;
        }

        Err(Error::broken_links(
            broken
                .into_iter()
                .map(|link| format!("{} -> {}", link.source_path.display(), link.href))
                .collect(),
        ))
    }
}

pub struct ResetCommand {}

impl ResetCommand {
    pub fn run(config: Config) -> Result<()> {
        let mut stdout = stdout_stream(&config);

        let store = StateStore::new(config.state_file());
        store.reset()?;

        bunt::writeln!(
            stdout,
            "Removed sync state at {$bold}{}{/$}",
            store.path().display()
        )?;
        Ok(())
    }
}

fn stdout_stream(config: &Config) -> StandardStream {
    if config.color_enabled() {
        StandardStream::stdout(ColorChoice::Auto)
    } else {
        StandardStream::stdout(ColorChoice::Never)
    }
}

fn converter_options(config: &Config) -> ConverterOptions {
    ConverterOptions {
        space_key: Some(config.space_key().to_string()),
        toc: config.toc(),
    }
}

fn load_hierarchy(config: &Config, mut stdout: &mut StandardStream) -> Result<Hierarchy> {
    let (docs, skipped) = docs_finder::find(config);

    for warning in &skipped {
        bunt::writeln!(stdout, "{$bold}{$yellow}WARNING{/$}{/$} {}", warning)?;
    }

    let content_dir_display = config.content_dir().display().to_string();
    bunt::writeln!(
        stdout,
        "Loaded {$bold}{}{/$} documents from {$bold}{}{/$}\n",
        docs.len(),
        content_dir_display
    )?;

    let hierarchy = Hierarchy::build(docs);

    for orphan in hierarchy.orphans() {
        bunt::writeln!(
            stdout,
            "{$bold}{$yellow}WARNING{/$}{/$} could not place {}",
            orphan.path().display()
        )?;
    }

    Ok(hierarchy)
}

fn resolve_root_page(client: &ConfluenceClient, config: &Config) -> Result<Option<String>> {
    // An explicit id wins over a configured title
    if let Some(id) = config.root_page_id() {
        return Ok(Some(id.to_string()));
    }

    if let Some(title) = config.root_page_title() {
        return match client.get_page_by_title(config.space_key(), title)? {
            Some(page) => Ok(Some(page.id)),
            None => Err(Error::NotFound(format!(
                "root page titled `{}` in space {}",
                title,
                config.space_key()
            ))),
        };
    }

    Ok(None)
}

fn print_plan_summary(plan: &SyncPlan, mut stdout: &mut StandardStream) -> Result<()> {
    let counts = plan.counts();
    bunt::writeln!(
        stdout,
        "\nPlan: {$green}{} create{/$}, {$yellow}{} update{/$}, {$cyan}{} move{/$}, \
         {} skip, {$red}{} delete{/$}",
        counts.creates,
        counts.updates,
        counts.moves,
        counts.skips,
        counts.deletes
    )?;
    Ok(())
}
