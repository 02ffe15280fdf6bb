use std::path::PathBuf;

use pulldown_cmark::{Event, Tag};

use crate::markdown::extension::{Extension, Output};
use crate::markdown::{is_internal_href, Image, Link, UrlKind};

/// Collects every link and image reference in the document, classifying
/// hrefs as local pages, remote URLs, or same-page anchors.
pub struct LinkScanner {
    pub current_link: Option<Link>,
    pub current_image: Option<Image>,
}

impl Extension for LinkScanner {
    fn process_event<'a>(
        &mut self,
        _events: &mut Vec<Event<'a>>,
        event: &Event<'a>,
    ) -> (Option<Vec<Output<'a>>>, bool) {
        match event.to_owned() {
            Event::Start(Tag::Link(_, url, _)) => {
                self.current_link = Some(Link {
                    text: String::new(),
                    href: url.to_string(),
                    kind: classify(&url),
                });
            }
            Event::End(Tag::Link(_, _, _)) => {
                if let Some(link) = self.current_link.take() {
                    return (Some(vec![Output::Link(link)]), false);
                }
            }
            Event::Start(Tag::Image(_, url, _)) => {
                self.current_image = Some(Image {
                    alt: String::new(),
                    destination: url.to_string(),
                });
            }
            Event::End(Tag::Image(_, _, _)) => {
                if let Some(image) = self.current_image.take() {
                    return (Some(vec![Output::Image(image)]), false);
                }
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(image) = &mut self.current_image {
                    image.alt.push_str(&text);
                } else if let Some(link) = &mut self.current_link {
                    link.text.push_str(&text);
                }
            }
            _ => {}
        }
        (None, false)
    }
}

fn classify(href: &str) -> UrlKind {
    if let Some(anchor) = href.strip_prefix('#') {
        UrlKind::Anchor(anchor.to_string())
    } else if is_internal_href(href) {
        let without_fragment = href.split('#').next().unwrap_or(href);
        UrlKind::Local(PathBuf::from(without_fragment))
    } else {
        UrlKind::Remote(href.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classifies_hrefs() {
        assert_eq!(
            classify("other.md"),
            UrlKind::Local(PathBuf::from("other.md"))
        );
        assert_eq!(
            classify("guide/setup.md#install"),
            UrlKind::Local(PathBuf::from("guide/setup.md"))
        );
        assert_eq!(
            classify("https://example.com"),
            UrlKind::Remote("https://example.com".into())
        );
        assert_eq!(classify("#section"), UrlKind::Anchor("section".into()));
        assert_eq!(
            classify("report.pdf"),
            UrlKind::Remote("report.pdf".into())
        );
    }
}
