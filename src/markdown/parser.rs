use pulldown_cmark::{Event, Options, Parser};

use super::{
    extension::{Extension, Output},
    extensions::{headings::HeadingCollector, links::LinkScanner},
    Heading, Image, Link,
};

/// Runs the extraction extensions over a document's event stream. The
/// converter does its own walk; this parser only gathers the metadata the
/// hierarchy and resolver need.
pub struct MarkdownParser {
    pub extensions: Vec<Box<dyn Extension>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedMarkdown {
    pub headings: Vec<Heading>,
    pub links: Vec<Link>,
    pub images: Vec<Image>,
}

impl ParsedMarkdown {
    pub fn first_h1(&self) -> Option<&Heading> {
        self.headings.iter().find(|h| h.level == 1)
    }
}

pub fn parse_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

impl MarkdownParser {
    pub fn new() -> Self {
        let extensions: Vec<Box<dyn Extension>> = vec![
            Box::new(HeadingCollector {
                current_heading: None,
            }),
            Box::new(LinkScanner {
                current_link: None,
                current_image: None,
            }),
        ];

        MarkdownParser { extensions }
    }

    pub fn parse(&mut self, input: &str) -> ParsedMarkdown {
        let parser = Parser::new_ext(input, parse_options());

        let mut events: Vec<Event> = Vec::new();
        let mut parsed = ParsedMarkdown::default();

        for ev in parser {
            let event = ev.to_owned();

            let mut handled = false;
            for extension in &mut self.extensions {
                let (output, is_handled) = extension.process_event(&mut events, &event);

                handle_output(output, &mut events, &mut parsed);

                if is_handled {
                    handled = true;
                    break;
                }
            }

            if !handled {
                events.push(event);
            }
        }

        for extension in &mut self.extensions {
            let output = extension.end_of_doc(&mut events);
            handle_output(output, &mut events, &mut parsed);
        }

        parsed
    }
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new()
    }
}

fn handle_output<'a>(
    output: Option<Vec<Output<'a>>>,
    events: &mut Vec<Event<'a>>,
    parsed: &mut ParsedMarkdown,
) {
    if let Some(output) = output {
        output.into_iter().for_each(|result| match result {
            Output::Event(ev) => events.push(ev),
            Output::Link(link) => parsed.links.push(link),
            Output::Heading(heading) => parsed.headings.push(heading),
            Output::Image(image) => parsed.images.push(image),
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::markdown::UrlKind;
    use std::path::PathBuf;

    #[test]
    fn extracts_headings_with_anchors() {
        let mut parser = MarkdownParser::new();
        let parsed = parser.parse("# My Heading\n\ntext\n\n## What's Next?\n");

        assert_eq!(parsed.headings.len(), 2);
        assert_eq!(parsed.headings[0].title, "My Heading");
        assert_eq!(parsed.headings[0].anchor, "my-heading");
        assert_eq!(parsed.headings[0].level, 1);
        assert_eq!(parsed.headings[1].anchor, "whats-next");
    }

    #[test]
    fn extracts_links_and_images() {
        let mut parser = MarkdownParser::new();
        let parsed = parser.parse(
            "[local](other.md) and [remote](https://example.com)\n\n![logo](img/logo.png)\n",
        );

        assert_eq!(parsed.links.len(), 2);
        assert_eq!(parsed.links[0].text, "local");
        assert_eq!(
            parsed.links[0].kind,
            UrlKind::Local(PathBuf::from("other.md"))
        );
        assert_eq!(parsed.links[1].text, "remote");

        assert_eq!(parsed.images.len(), 1);
        assert_eq!(parsed.images[0].destination, "img/logo.png");
        assert!(!parsed.images[0].is_external());
    }

    #[test]
    fn first_h1_skips_lower_levels() {
        let mut parser = MarkdownParser::new();
        let parsed = parser.parse("## Minor\n\n# Major\n");

        assert_eq!(parsed.first_h1().unwrap().title, "Major");
    }
}
