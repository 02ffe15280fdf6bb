/// Append-only buffer for Confluence Storage Format fragments. Everything
/// that goes through `text()` or an attribute value is XML-escaped; CDATA
/// sections are split so they can never contain a bare `]]>`.
#[derive(Debug, Default)]
pub struct StorageBuilder {
    buf: String,
}

impl StorageBuilder {
    pub fn new() -> Self {
        StorageBuilder { buf: String::new() }
    }

    pub fn open(&mut self, tag: &str) {
        self.buf.push('<');
        self.buf.push_str(tag);
        self.buf.push('>');
    }

    pub fn open_with_attrs(&mut self, tag: &str, attrs: &[(&str, &str)]) {
        self.buf.push('<');
        self.buf.push_str(tag);
        for (name, value) in attrs {
            self.buf.push(' ');
            self.buf.push_str(name);
            self.buf.push_str("=\"");
            self.buf.push_str(&escape_xml(value));
            self.buf.push('"');
        }
        self.buf.push('>');
    }

    pub fn close(&mut self, tag: &str) {
        self.buf.push_str("</");
        self.buf.push_str(tag);
        self.buf.push('>');
    }

    pub fn self_closing(&mut self, tag: &str) {
        self.buf.push('<');
        self.buf.push_str(tag);
        self.buf.push_str("/>");
    }

    pub fn self_closing_with_attrs(&mut self, tag: &str, attrs: &[(&str, &str)]) {
        self.buf.push('<');
        self.buf.push_str(tag);
        for (name, value) in attrs {
            self.buf.push(' ');
            self.buf.push_str(name);
            self.buf.push_str("=\"");
            self.buf.push_str(&escape_xml(value));
            self.buf.push('"');
        }
        self.buf.push_str("/>");
    }

    /// Emits XML-escaped character data.
    pub fn text(&mut self, text: &str) {
        self.buf.push_str(&escape_xml(text));
    }

    /// Emits pre-escaped XHTML verbatim. Used for passthrough HTML and
    /// macro fragments the converter assembles itself.
    pub fn raw(&mut self, xhtml: &str) {
        self.buf.push_str(xhtml);
    }

    /// Emits a CDATA section. Any `]]>` inside the content is split across
    /// two sections so the output stays well-formed.
    pub fn cdata(&mut self, content: &str) {
        self.buf.push_str("<![CDATA[");
        self.buf.push_str(&content.split("]]>").collect::<Vec<_>>().join("]]]]><![CDATA[>"));
        self.buf.push_str("]]>");
    }

    pub fn macro_open(&mut self, name: &str) {
        self.open_with_attrs(
            "ac:structured-macro",
            &[("ac:name", name), ("ac:schema-version", "1")],
        );
    }

    pub fn macro_param(&mut self, name: &str, value: &str) {
        self.open_with_attrs("ac:parameter", &[("ac:name", name)]);
        self.text(value);
        self.close("ac:parameter");
    }

    pub fn macro_plain_text_body(&mut self, body: &str) {
        self.open("ac:plain-text-body");
        self.cdata(body);
        self.close("ac:plain-text-body");
    }

    pub fn macro_close(&mut self) {
        self.close("ac:structured-macro");
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

pub fn escape_xml(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
