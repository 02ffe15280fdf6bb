use std::collections::HashMap;

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag};
use serde::Deserialize;

use super::parser::parse_options;
use super::storage::StorageBuilder;
use super::{is_internal_href, link_basename};

lazy_static! {
    /// Fence info strings Confluence knows under a different name. The
    /// table is fixed so the same input always renders the same output.
    static ref LANGUAGE_ALIASES: HashMap<&'static str, &'static str> = {
        let mut aliases = HashMap::new();
        aliases.insert("js", "javascript");
        aliases.insert("jsx", "javascript");
        aliases.insert("ts", "typescript");
        aliases.insert("py", "python");
        aliases.insert("rb", "ruby");
        aliases.insert("sh", "bash");
        aliases.insert("shell", "bash");
        aliases.insert("zsh", "bash");
        aliases.insert("yml", "yaml");
        aliases.insert("kt", "kotlin");
        aliases.insert("golang", "go");
        aliases.insert("c++", "cpp");
        aliases.insert("cs", "csharp");
        aliases.insert("dockerfile", "docker");
        aliases
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TocPosition {
    None,
    Top,
    Bottom,
}

#[derive(Debug, Clone)]
pub struct TocOptions {
    pub position: TocPosition,
    pub max_level: u32,
}

impl Default for TocOptions {
    fn default() -> Self {
        TocOptions {
            position: TocPosition::None,
            max_level: 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConverterOptions {
    pub space_key: Option<String>,
    pub toc: TocOptions,
}

/// Resolves the basename of an internal link (no directories, no `.md`,
/// no fragment) to the title of the target page, if one exists.
pub type LinkResolver<'a> = dyn Fn(&str) -> Option<String> + 'a;

/// Walks a CommonMark event stream and emits Confluence Storage Format.
pub struct StorageConverter<'a> {
    options: ConverterOptions,
    resolver: Option<&'a LinkResolver<'a>>,
}

impl<'a> StorageConverter<'a> {
    pub fn new(options: ConverterOptions) -> Self {
        StorageConverter {
            options,
            resolver: None,
        }
    }

    pub fn with_resolver(mut self, resolver: &'a LinkResolver<'a>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn convert(&self, markdown: &str) -> String {
        let events: Vec<Event> = Parser::new_ext(markdown, parse_options()).collect();

        let mut builder = StorageBuilder::new();

        if self.options.toc.position == TocPosition::Top {
            self.emit_toc(&mut builder);
        }

        let mut renderer = Renderer {
            converter: self,
            builder: &mut builder,
            events: &events,
            list_stack: vec![],
            in_table_head: false,
            code_block: None,
            link: None,
            image: None,
        };
        renderer.run();

        if self.options.toc.position == TocPosition::Bottom {
            self.emit_toc(&mut builder);
        }

        builder.finish()
    }

    fn emit_toc(&self, builder: &mut StorageBuilder) {
        builder.macro_open("toc");
        builder.macro_param("maxLevel", &self.options.toc.max_level.to_string());
        builder.macro_close();
    }

    fn resolve(&self, basename: &str) -> Option<String> {
        self.resolver.and_then(|r| r(basename))
    }
}

/// Body generated for a directory page that has no index document: a short
/// note plus the `children` macro so the page lists its own subtree.
pub fn stub_page_body() -> String {
    let mut builder = StorageBuilder::new();
    builder.open("p");
    builder.open("em");
    builder.text("This page groups the pages below.");
    builder.close("em");
    builder.close("p");
    builder.macro_open("children");
    builder.macro_close();
    builder.finish()
}

enum ListKind {
    Bullet,
    Ordered,
    Task,
}

enum LinkState {
    /// Plain `<a>` element already opened; children stream through.
    Plain,
    /// An `ac:link` page reference; inline children are collapsed into the
    /// CDATA body text.
    Page {
        title: String,
        anchor: Option<String>,
        text: String,
    },
}

struct ImageState {
    destination: String,
    alt: String,
}

struct CodeBlockState {
    language: Option<String>,
    code: String,
}

struct Renderer<'e, 'a> {
    converter: &'e StorageConverter<'a>,
    builder: &'e mut StorageBuilder,
    events: &'e [Event<'e>],
    list_stack: Vec<ListKind>,
    in_table_head: bool,
    code_block: Option<CodeBlockState>,
    link: Option<LinkState>,
    image: Option<ImageState>,
}

impl<'e, 'a> Renderer<'e, 'a> {
    fn run(&mut self) {
        let events = self.events;
        for (idx, event) in events.iter().enumerate() {
            self.event(idx, event);
        }
    }

    fn event(&mut self, idx: usize, event: &Event) {
        match event {
            Event::Start(tag) => self.start_tag(idx, tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => self.text(text),
            Event::Code(code) => self.inline_code(code),
            Event::Html(html) => {
                if self.swallowing_inline() {
                    return;
                }
                self.builder.raw(html);
            }
            Event::SoftBreak => self.text(" "),
            Event::HardBreak => {
                if !self.swallowing_inline() {
                    self.builder.self_closing("br");
                }
            }
            Event::Rule => self.builder.self_closing("hr"),
            Event::TaskListMarker(checked) => self.task_marker(*checked),
            Event::FootnoteReference(_) => {}
        }
    }

    /// True while an `ac:link` body or image alt text is being captured;
    /// inline markup inside those collapses to plain text.
    fn swallowing_inline(&self) -> bool {
        matches!(self.link, Some(LinkState::Page { .. })) || self.image.is_some()
    }

    fn start_tag(&mut self, idx: usize, tag: &Tag) {
        if self.swallowing_inline() {
            return;
        }

        match tag {
            Tag::Paragraph => self.builder.open("p"),
            Tag::Heading(level) => self.builder.open(&format!("h{}", level)),
            Tag::BlockQuote => self.builder.open("blockquote"),
            Tag::CodeBlock(kind) => {
                let language = match kind {
                    CodeBlockKind::Fenced(info) => normalize_language(info),
                    CodeBlockKind::Indented => None,
                };
                self.code_block = Some(CodeBlockState {
                    language,
                    code: String::new(),
                });
            }
            Tag::List(Some(_)) => {
                self.list_stack.push(ListKind::Ordered);
                self.builder.open("ol");
            }
            Tag::List(None) => {
                if self.list_is_tasklist(idx) {
                    self.list_stack.push(ListKind::Task);
                    self.builder.open("ac:task-list");
                } else {
                    self.list_stack.push(ListKind::Bullet);
                    self.builder.open("ul");
                }
            }
            Tag::Item => {
                if !matches!(self.list_stack.last(), Some(ListKind::Task)) {
                    self.builder.open("li");
                }
            }
            Tag::Table(_) => self.builder.open("table"),
            Tag::TableHead => {
                self.in_table_head = true;
                self.builder.open("tr");
            }
            Tag::TableRow => self.builder.open("tr"),
            Tag::TableCell => {
                if self.in_table_head {
                    self.builder.open("th");
                } else {
                    self.builder.open("td");
                }
            }
            Tag::Emphasis => self.builder.open("em"),
            Tag::Strong => self.builder.open("strong"),
            Tag::Strikethrough => self.builder.open("s"),
            Tag::Link(_, destination, _) => self.start_link(destination),
            Tag::Image(_, destination, _) => {
                self.image = Some(ImageState {
                    destination: destination.to_string(),
                    alt: String::new(),
                });
            }
            Tag::FootnoteDefinition(_) => {}
        }
    }

    fn end_tag(&mut self, tag: &Tag) {
        match tag {
            Tag::Link(_, _, _) => {
                self.end_link();
                return;
            }
            Tag::Image(_, _, _) => {
                self.end_image();
                return;
            }
            _ => {}
        }

        if self.swallowing_inline() {
            return;
        }

        match tag {
            Tag::Paragraph => self.builder.close("p"),
            Tag::Heading(level) => self.builder.close(&format!("h{}", level)),
            Tag::BlockQuote => self.builder.close("blockquote"),
            Tag::CodeBlock(_) => self.end_code_block(),
            Tag::List(_) => match self.list_stack.pop() {
                Some(ListKind::Ordered) => self.builder.close("ol"),
                Some(ListKind::Task) => self.builder.close("ac:task-list"),
                _ => self.builder.close("ul"),
            },
            Tag::Item => {
                if matches!(self.list_stack.last(), Some(ListKind::Task)) {
                    self.builder.close("span");
                    self.builder.close("ac:task-body");
                    self.builder.close("ac:task");
                } else {
                    self.builder.close("li");
                }
            }
            Tag::Table(_) => self.builder.close("table"),
            Tag::TableHead => {
                self.in_table_head = false;
                self.builder.close("tr");
            }
            Tag::TableRow => self.builder.close("tr"),
            Tag::TableCell => {
                if self.in_table_head {
                    self.builder.close("th");
                } else {
                    self.builder.close("td");
                }
            }
            Tag::Emphasis => self.builder.close("em"),
            Tag::Strong => self.builder.close("strong"),
            Tag::Strikethrough => self.builder.close("s"),
            _ => {}
        }
    }

    fn start_link(&mut self, destination: &str) {
        if is_internal_href(destination) {
            let basename = link_basename(destination);
            if let Some(title) = self.converter.resolve(&basename) {
                let anchor = destination.split('#').nth(1).map(str::to_string);
                self.link = Some(LinkState::Page {
                    title,
                    anchor,
                    text: String::new(),
                });
                return;
            }
        }

        // External, anchor-only, and unresolvable links all render as a
        // plain anchor element.
        self.builder.open_with_attrs("a", &[("href", destination)]);
        self.link = Some(LinkState::Plain);
    }

    fn end_link(&mut self) {
        match self.link.take() {
            Some(LinkState::Plain) => self.builder.close("a"),
            Some(LinkState::Page {
                title,
                anchor,
                text,
            }) => {
                match &anchor {
                    Some(anchor) => self
                        .builder
                        .open_with_attrs("ac:link", &[("ac:anchor", anchor.as_str())]),
                    None => self.builder.open("ac:link"),
                }

                let mut attrs: Vec<(&str, &str)> = vec![("ri:content-title", title.as_str())];
                if let Some(key) = &self.converter.options.space_key {
                    attrs.push(("ri:space-key", key.as_str()));
                }
                self.builder.self_closing_with_attrs("ri:page", &attrs);

                let body = if text.is_empty() { &title } else { &text };
                self.builder.open("ac:plain-text-link-body");
                self.builder.cdata(body);
                self.builder.close("ac:plain-text-link-body");
                self.builder.close("ac:link");
            }
            None => {}
        }
    }

    fn end_image(&mut self) {
        let image = match self.image.take() {
            Some(image) => image,
            None => return,
        };

        if image.alt.is_empty() {
            self.builder.open("ac:image");
        } else {
            self.builder
                .open_with_attrs("ac:image", &[("ac:alt", &image.alt)]);
        }

        if image.destination.starts_with("http://") || image.destination.starts_with("https://") {
            self.builder
                .self_closing_with_attrs("ri:url", &[("ri:value", &image.destination)]);
        } else {
            let filename = image
                .destination
                .rsplit('/')
                .next()
                .unwrap_or(&image.destination);
            self.builder
                .self_closing_with_attrs("ri:attachment", &[("ri:filename", filename)]);
        }

        self.builder.close("ac:image");
    }

    fn end_code_block(&mut self) {
        let block = match self.code_block.take() {
            Some(block) => block,
            None => return,
        };

        self.builder.macro_open("code");
        if let Some(language) = &block.language {
            self.builder.macro_param("language", language);
        }
        self.builder
            .macro_plain_text_body(block.code.trim_end_matches('\n'));
        self.builder.macro_close();
    }

    fn task_marker(&mut self, checked: bool) {
        self.builder.open("ac:task");
        self.builder.open("ac:task-status");
        self.builder
            .raw(if checked { "complete" } else { "incomplete" });
        self.builder.close("ac:task-status");
        self.builder.open("ac:task-body");
        self.builder.open("span");
    }

    fn text(&mut self, text: &str) {
        if let Some(block) = &mut self.code_block {
            block.code.push_str(text);
        } else if let Some(image) = &mut self.image {
            image.alt.push_str(text);
        } else if let Some(LinkState::Page { text: body, .. }) = &mut self.link {
            body.push_str(text);
        } else {
            self.builder.text(text);
        }
    }

    fn inline_code(&mut self, code: &str) {
        if let Some(image) = &mut self.image {
            image.alt.push_str(code);
        } else if let Some(LinkState::Page { text: body, .. }) = &mut self.link {
            body.push_str(code);
        } else {
            self.builder.open("code");
            self.builder.text(code);
            self.builder.close("code");
        }
    }

    /// Looks ahead to the matching `End(List)` to decide whether this
    /// bullet list is a task list. Markers inside nested lists belong to
    /// those lists and are ignored here.
    fn list_is_tasklist(&self, start_idx: usize) -> bool {
        let mut depth = 0usize;
        for event in &self.events[start_idx + 1..] {
            match event {
                Event::Start(Tag::List(_)) => depth += 1,
                Event::End(Tag::List(_)) => {
                    if depth == 0 {
                        return false;
                    }
                    depth -= 1;
                }
                Event::TaskListMarker(_) if depth == 0 => return true,
                _ => {}
            }
        }
        false
    }
}

fn normalize_language(info: &str) -> Option<String> {
    let token = info.split_whitespace().next()?.to_lowercase();
    if token.is_empty() {
        return None;
    }
    Some(
        LANGUAGE_ALIASES
            .get(token.as_str())
            .map(|canonical| canonical.to_string())
            .unwrap_or(token),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    fn convert(markdown: &str) -> String {
        StorageConverter::new(ConverterOptions::default()).convert(markdown)
    }

    #[test]
    fn paragraphs_and_headings() {
        assert_eq!(
            convert("# Title\n\nSome text\n"),
            "<h1>Title</h1><p>Some text</p>"
        );
    }

    #[test]
    fn inline_formatting() {
        assert_eq!(
            convert("Some **bold** and *italic* and `code`\n"),
            "<p>Some <strong>bold</strong> and <em>italic</em> and <code>code</code></p>"
        );
    }

    #[test]
    fn text_is_escaped() {
        assert_eq!(convert("a < b & c\n"), "<p>a &lt; b &amp; c</p>");
    }

    #[test]
    fn tight_list_items_have_no_paragraphs() {
        assert_eq!(
            convert("- one\n- two\n"),
            "<ul><li>one</li><li>two</li></ul>"
        );
    }

    #[test]
    fn loose_list_items_keep_paragraphs() {
        assert_eq!(
            convert("- one\n\n- two\n"),
            "<ul><li><p>one</p></li><li><p>two</p></li></ul>"
        );
    }

    #[test]
    fn ordered_lists() {
        assert_eq!(
            convert("1. first\n2. second\n"),
            "<ol><li>first</li><li>second</li></ol>"
        );
    }

    #[test]
    fn fenced_code_becomes_a_code_macro() {
        assert_eq!(
            convert("```rust\nfn main() {}\n```\n"),
            "<ac:structured-macro ac:name=\"code\" ac:schema-version=\"1\">\
             <ac:parameter ac:name=\"language\">rust</ac:parameter>\
             <ac:plain-text-body><![CDATA[fn main() {}]]></ac:plain-text-body>\
             </ac:structured-macro>"
        );
    }

    #[test]
    fn code_languages_are_normalised() {
        let output = convert("```js\nlet x = 1;\n```\n");
        assert!(output.contains("<ac:parameter ac:name=\"language\">javascript</ac:parameter>"));
    }

    #[test]
    fn indented_code_has_no_language() {
        let output = convert("    plain code\n");
        assert!(output.contains("<ac:plain-text-body><![CDATA[plain code]]></ac:plain-text-body>"));
        assert!(!output.contains("ac:parameter"));
    }

    #[test]
    fn external_links_are_anchors() {
        assert_eq!(
            convert("[site](https://example.com?a=1&b=2)\n"),
            "<p><a href=\"https://example.com?a=1&amp;b=2\">site</a></p>"
        );
    }

    #[test]
    fn anchor_only_links_pass_through() {
        assert_eq!(
            convert("[below](#details)\n"),
            "<p><a href=\"#details\">below</a></p>"
        );
    }

    #[test]
    fn internal_links_resolve_to_page_references() {
        let resolver = |basename: &str| {
            if basename == "setup" {
                Some("Setup Guide".to_string())
            } else {
                None
            }
        };
        let converter =
            StorageConverter::new(ConverterOptions::default()).with_resolver(&resolver);

        assert_eq!(
            converter.convert("[how to set up](guide/setup.md)\n"),
            "<p><ac:link>\
             <ri:page ri:content-title=\"Setup Guide\"/>\
             <ac:plain-text-link-body><![CDATA[how to set up]]></ac:plain-text-link-body>\
             </ac:link></p>"
        );
    }

    #[test]
    fn internal_links_carry_anchor_and_space_key() {
        let resolver = |_: &str| Some("Setup Guide".to_string());
        let options = ConverterOptions {
            space_key: Some("DOCS".to_string()),
            ..ConverterOptions::default()
        };
        let converter = StorageConverter::new(options).with_resolver(&resolver);

        assert_eq!(
            converter.convert("[jump](setup.md#install)\n"),
            "<p><ac:link ac:anchor=\"install\">\
             <ri:page ri:content-title=\"Setup Guide\" ri:space-key=\"DOCS\"/>\
             <ac:plain-text-link-body><![CDATA[jump]]></ac:plain-text-link-body>\
             </ac:link></p>"
        );
    }

    #[test]
    fn unresolvable_internal_links_fall_back_to_anchors() {
        assert_eq!(
            convert("[gone](missing.md)\n"),
            "<p><a href=\"missing.md\">gone</a></p>"
        );
    }

    #[test]
    fn external_images_use_ri_url() {
        assert_eq!(
            convert("![logo](https://example.com/logo.png)\n"),
            "<p><ac:image ac:alt=\"logo\">\
             <ri:url ri:value=\"https://example.com/logo.png\"/>\
             </ac:image></p>"
        );
    }

    #[test]
    fn local_images_use_attachment_basenames() {
        assert_eq!(
            convert("![](img/diagram.png)\n"),
            "<p><ac:image><ri:attachment ri:filename=\"diagram.png\"/></ac:image></p>"
        );
    }

    #[test]
    fn tables_render_header_and_body_rows() {
        assert_eq!(
            convert("| A | B |\n|---|---|\n| 1 | 2 |\n"),
            "<table><tr><th>A</th><th>B</th></tr><tr><td>1</td><td>2</td></tr></table>"
        );
    }

    #[test]
    fn task_lists_become_task_macros() {
        assert_eq!(
            convert("- [x] done\n- [ ] pending\n"),
            "<ac:task-list>\
             <ac:task><ac:task-status>complete</ac:task-status>\
             <ac:task-body><span>done</span></ac:task-body></ac:task>\
             <ac:task><ac:task-status>incomplete</ac:task-status>\
             <ac:task-body><span>pending</span></ac:task-body></ac:task>\
             </ac:task-list>"
        );
    }

    #[test]
    fn plain_bullet_lists_stay_plain() {
        let output = convert("- plain\n- items\n");
        assert!(!output.contains("ac:task-list"));
    }

    #[test]
    fn breaks_and_rules() {
        assert_eq!(convert("a\nb\n"), "<p>a b</p>");
        assert_eq!(convert("a  \nb\n"), "<p>a<br/>b</p>");
        assert_eq!(convert("---\n"), "<hr/>");
    }

    #[test]
    fn blockquotes() {
        assert_eq!(
            convert("> quoted\n"),
            "<blockquote><p>quoted</p></blockquote>"
        );
    }

    #[test]
    fn raw_html_passes_through() {
        assert_eq!(
            convert("<div class=\"x\">kept</div>\n"),
            "<div class=\"x\">kept</div>\n"
        );
    }

    #[test]
    fn toc_positions() {
        let toc = |position| ConverterOptions {
            toc: TocOptions {
                position,
                max_level: 2,
            },
            ..ConverterOptions::default()
        };

        let top = StorageConverter::new(toc(TocPosition::Top)).convert("# H\n");
        assert!(top.starts_with(
            "<ac:structured-macro ac:name=\"toc\" ac:schema-version=\"1\">\
             <ac:parameter ac:name=\"maxLevel\">2</ac:parameter></ac:structured-macro>"
        ));
        assert!(top.ends_with("<h1>H</h1>"));

        let bottom = StorageConverter::new(toc(TocPosition::Bottom)).convert("# H\n");
        assert!(bottom.starts_with("<h1>H</h1>"));
        assert!(bottom.ends_with("</ac:structured-macro>"));

        let none = StorageConverter::new(toc(TocPosition::None)).convert("# H\n");
        assert_eq!(none, "<h1>H</h1>");
    }

    #[test]
    fn conversion_is_deterministic() {
        let input = "# T\n\n[a](b.md) `code`\n\n```py\nx\n```\n";
        assert_eq!(convert(input), convert(input));
    }

    #[test]
    fn stub_body_lists_children() {
        let body = stub_page_body();
        assert!(body.starts_with("<p><em>"));
        assert!(body.contains("ac:name=\"children\""));
    }
}
