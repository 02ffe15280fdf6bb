use pulldown_cmark::{Event, Tag};
use regex::Regex;

use crate::markdown::extension::{Extension, Output};
use crate::markdown::Heading;

lazy_static! {
    static ref NON_ANCHOR: Regex = Regex::new(r"[^a-z0-9\s-]").unwrap();
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

/// Collects headings and their anchors while the event stream passes by.
pub struct HeadingCollector {
    pub current_heading: Option<Heading>,
}

impl Extension for HeadingCollector {
    fn process_event<'a>(
        &mut self,
        _events: &mut Vec<Event<'a>>,
        event: &Event<'a>,
    ) -> (Option<Vec<Output<'a>>>, bool) {
        match event.to_owned() {
            Event::Start(Tag::Heading(level @ 1..=6)) => {
                self.current_heading = Some(Heading {
                    level,
                    anchor: String::new(),
                    title: String::new(),
                });
            }
            Event::End(Tag::Heading(_)) => {
                if let Some(mut heading) = self.current_heading.take() {
                    heading.anchor = anchor_for(&heading.title);
                    return (Some(vec![Output::Heading(heading)]), false);
                }
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(heading) = &mut self.current_heading {
                    heading.title.push_str(&text);
                }
            }
            _ => {}
        }
        (None, false)
    }
}

/// Anchor rule: lowercase, drop anything outside `[a-z0-9\s-]`, collapse
/// whitespace runs to a single `-`, trim leading/trailing `-`.
pub fn anchor_for(text: &str) -> String {
    let lowered = text.to_lowercase();
    let cleaned = NON_ANCHOR.replace_all(&lowered, "");
    let dashed = WHITESPACE_RUN.replace_all(cleaned.trim(), "-");
    dashed.trim_matches('-').to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn anchors_follow_the_sanitising_rule() {
        assert_eq!(anchor_for("Getting Started"), "getting-started");
        assert_eq!(anchor_for("What's New?"), "whats-new");
        assert_eq!(anchor_for("  spaced   out  "), "spaced-out");
        assert_eq!(anchor_for("C++ API"), "c-api");
        assert_eq!(anchor_for("already-dashed"), "already-dashed");
        assert_eq!(anchor_for("---"), "");
    }
}
