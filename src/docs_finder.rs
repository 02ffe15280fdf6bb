use std::ffi::OsStr;
use std::path::Path;
use std::sync::mpsc::channel;

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::config::Config;
use crate::Document;

/// Loads every Markdown file under the content directory. Files that fail
/// to parse are skipped; the sync proceeds without them.
pub fn find(config: &Config) -> (Vec<Document>, Vec<String>) {
    walk_dir(config.content_dir(), config)
}

fn walk_dir<P: AsRef<Path>>(dir: P, config: &Config) -> (Vec<Document>, Vec<String>) {
    let current_dir: &Path = dir.as_ref();

    let (sender, receiver) = channel();

    WalkDir::new(current_dir)
        .follow_links(true)
        .into_iter()
        .par_bridge()
        .for_each_with(sender, |sender, entry| {
            if let Ok(entry) = entry {
                if entry.file_type().is_file() && entry.path().extension() == Some(OsStr::new("md"))
                {
                    let relative = entry
                        .path()
                        .strip_prefix(config.content_dir())
                        .expect("walked file outside the content dir");

                    sender
                        .send(Document::load(entry.path(), relative, config))
                        .expect("document channel closed");
                }
            }
        });

    let mut docs = vec![];
    let mut skipped = vec![];

    for result in receiver.iter() {
        match result {
            Ok(doc) => docs.push(doc),
            Err(err) => skipped.push(err.to_string()),
        }
    }

    docs.par_sort_by(|a, b| a.path().cmp(b.path()));

    (docs, skipped)
}
