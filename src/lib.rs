#[macro_use]
extern crate lazy_static;

#[cfg(test)]
#[macro_use]
extern crate indoc;

pub mod checksum;
pub mod config;
pub mod confluence;
pub mod diff;
pub mod docs_finder;
pub mod error;
pub mod executor;
pub mod frontmatter;
pub mod hierarchy;
pub mod markdown;
pub mod resolver;
pub mod state;
pub mod sync;

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

pub use config::Config;
pub use error::Error;

use config::TitleSource;
use frontmatter::Frontmatter;
use markdown::parser::{MarkdownParser, ParsedMarkdown};
use markdown::{Heading, Image, Link};

pub type Result<T> = std::result::Result<T, error::Error>;

/// One parsed Markdown file. Created during loading, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// The relative path inside the content directory
    path: PathBuf,
    absolute_path: PathBuf,
    raw: String,
    frontmatter: Frontmatter,
    title: String,
    markdown: ParsedMarkdown,
    modified: Option<SystemTime>,
    hash: String,
    is_index: bool,
}

impl Document {
    /// Loads a document from disk and parses it.
    ///
    /// Must be provided both the absolute path to the file, and the relative
    /// path inside the content directory.
    pub fn load(absolute_path: &Path, relative_path: &Path, config: &Config) -> Result<Self> {
        let raw = fs::read_to_string(absolute_path)
            .map_err(|err| Error::parse(absolute_path, err.to_string()))?;
        let modified = fs::metadata(absolute_path)
            .and_then(|meta| meta.modified())
            .ok();

        let mut doc = Document::new(relative_path, raw, config, modified)?;
        doc.absolute_path = absolute_path.to_path_buf();
        Ok(doc)
    }

    /// Creates a new document from its raw components.
    pub fn new(
        path: &Path,
        raw: String,
        config: &Config,
        modified: Option<SystemTime>,
    ) -> Result<Self> {
        let frontmatter = frontmatter::parse(&raw)
            .map_err(|err| Error::parse(path, format!("invalid frontmatter: {}", err)))?;

        let hash = checksum::content_hash(raw.as_bytes());
        let markdown = MarkdownParser::new().parse(frontmatter::without(&raw));
        let is_index = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.eq_ignore_ascii_case(config.index_file()))
            .unwrap_or(false);

        let title = resolve_title(path, &frontmatter, &markdown, config);

        Ok(Document {
            path: path.to_path_buf(),
            absolute_path: path.to_path_buf(),
            raw,
            frontmatter,
            title,
            markdown,
            modified,
            hash,
            is_index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn absolute_path(&self) -> &Path {
        &self.absolute_path
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The document body with any leading frontmatter block removed.
    pub fn body(&self) -> &str {
        frontmatter::without(&self.raw)
    }

    pub fn frontmatter(&self) -> &Frontmatter {
        &self.frontmatter
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn headings(&self) -> &[Heading] {
        &self.markdown.headings
    }

    pub fn links(&self) -> &[Link] {
        &self.markdown.links
    }

    pub fn images(&self) -> &[Image] {
        &self.markdown.images
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// `sha256:`-prefixed hash of the raw file content.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn is_index(&self) -> bool {
        self.is_index
    }

    pub fn weight(&self) -> i32 {
        self.frontmatter.weight
    }

    pub fn confluence_id_hint(&self) -> Option<&str> {
        self.frontmatter.confluence_id.as_deref()
    }

    /// Number of path segments; `guide/setup.md` has depth 2.
    pub fn depth(&self) -> usize {
        self.path
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .count()
    }
}

fn resolve_title(
    path: &Path,
    frontmatter: &Frontmatter,
    markdown: &ParsedMarkdown,
    config: &Config,
) -> String {
    let from_frontmatter = if config.use_frontmatter_title() {
        frontmatter.title.clone()
    } else {
        None
    };
    let from_heading = markdown.first_h1().map(|h| h.title.clone());
    let from_filename = || title_from_path(path, config.index_file());

    match config.title_source() {
        TitleSource::Filename => from_filename(),
        TitleSource::Frontmatter => from_frontmatter
            .or(from_heading)
            .unwrap_or_else(from_filename),
        TitleSource::FirstHeading => from_heading
            .or(from_frontmatter)
            .unwrap_or_else(from_filename),
    }
}

/// Derives a title from a file or directory name: extension stripped,
/// `-`/`_` become spaces, each word is capitalised. An index file takes its
/// parent directory's name, or `Home` at the tree root.
pub fn title_from_path(path: &Path, index_file: &str) -> String {
    let index_stem = Path::new(index_file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("index")
        .to_string();

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    if stem.eq_ignore_ascii_case(&index_stem) {
        return match path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str()) {
            Some(dir) if !dir.is_empty() => title_from_segment(dir),
            _ => "Home".to_string(),
        };
    }

    title_from_segment(stem)
}

/// The slug rule for a single path segment.
pub fn title_from_segment(segment: &str) -> String {
    let spaced = segment.replace(['-', '_'], " ");

    spaced
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
