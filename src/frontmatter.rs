use std::collections::BTreeMap;

use serde_yaml::Value;

/// Typed view over a document's YAML frontmatter block. Keys we do not
/// recognise are kept verbatim in `custom`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frontmatter {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub author: Option<String>,
    pub date: Option<String>,
    pub weight: i32,
    pub nav: bool,
    pub confluence_id: Option<String>,
    pub parent: Option<String>,
    pub custom: BTreeMap<String, Value>,
}

impl Frontmatter {
    pub fn empty() -> Self {
        Frontmatter {
            nav: true,
            ..Frontmatter::default()
        }
    }
}

/// Parses the frontmatter block of `raw`, if any. A `---` fence that is
/// never closed means the document has no frontmatter.
pub fn parse(raw: &str) -> Result<Frontmatter, serde_yaml::Error> {
    match fence_span(raw) {
        None => Ok(Frontmatter::empty()),
        Some((start, end)) => from_yaml_str(&raw[start..end]),
    }
}

/// Returns `raw` with any leading frontmatter block removed.
pub fn without(raw: &str) -> &str {
    match fence_span(raw) {
        None => raw,
        Some((_, end)) => {
            let rest = &raw[end..];
            // Skip the closing fence line itself
            match rest.find('\n') {
                Some(idx) => &rest[idx + 1..],
                None => "",
            }
        }
    }
}

/// Locates the byte span of the YAML between the opening and closing `---`
/// fences. The opening fence must be the first non-whitespace line.
fn fence_span(raw: &str) -> Option<(usize, usize)> {
    let trimmed_start = raw.len() - raw.trim_start().len();
    let after_leading = &raw[trimmed_start..];

    if !after_leading.starts_with("---") {
        return None;
    }

    let first_line_end = after_leading.find('\n')?;
    if after_leading[3..first_line_end].trim() != "" {
        return None;
    }

    let body_start = trimmed_start + first_line_end + 1;
    let mut offset = body_start;

    for line in raw[body_start..].split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some((body_start, offset));
        }
        offset += line.len();
    }

    None
}

fn from_yaml_str(yaml: &str) -> Result<Frontmatter, serde_yaml::Error> {
    let value: Value = serde_yaml::from_str(yaml)?;

    let mut fm = Frontmatter::empty();
    let mapping = match value {
        Value::Mapping(m) => m,
        _ => return Ok(fm),
    };

    for (key, value) in mapping {
        let key = match key {
            Value::String(k) => k,
            other => {
                fm.custom.insert(scalar_to_string(&other), value);
                continue;
            }
        };

        match key.as_str() {
            "title" => fm.title = Some(scalar_to_string(&value)),
            "description" => fm.description = Some(scalar_to_string(&value)),
            "author" => fm.author = Some(scalar_to_string(&value)),
            "date" => fm.date = Some(scalar_to_string(&value)),
            "parent" => fm.parent = Some(scalar_to_string(&value)),
            "confluence_id" => fm.confluence_id = Some(scalar_to_string(&value)),
            "weight" => fm.weight = value.as_i64().unwrap_or(0) as i32,
            "nav" => fm.nav = value.as_bool().unwrap_or(true),
            "tags" => fm.tags = parse_tags(&value),
            _ => {
                fm.custom.insert(key, value);
            }
        }
    }

    Ok(fm)
}

/// Tags can come as a YAML sequence or a comma-separated string.
fn parse_tags(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(seq) => seq.iter().map(scalar_to_string).collect(),
        Value::String(s) => s
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        _ => vec![],
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => serde_yaml::to_string(other)
            .unwrap_or_default()
            .trim_start_matches("---")
            .trim()
            .to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_recognised_fields() {
        let raw = indoc! {"
        ---
        title: My Page
        weight: 3
        nav: false
        confluence_id: '123456'
        tags:
          - alpha
          - beta
        ---
        # Body
        "};

        let fm = parse(raw).unwrap();
        assert_eq!(fm.title.as_deref(), Some("My Page"));
        assert_eq!(fm.weight, 3);
        assert!(!fm.nav);
        assert_eq!(fm.confluence_id.as_deref(), Some("123456"));
        assert_eq!(fm.tags, vec!["alpha", "beta"]);
    }

    #[test]
    fn tags_accept_a_comma_string() {
        let fm = parse("---\ntags: one, two , three\n---\n").unwrap();
        assert_eq!(fm.tags, vec!["one", "two", "three"]);
    }

    #[test]
    fn unknown_keys_go_to_custom() {
        let fm = parse("---\ntitle: T\nowner: platform-team\n---\n").unwrap();
        assert_eq!(
            fm.custom.get("owner"),
            Some(&Value::String("platform-team".into()))
        );
    }

    #[test]
    fn unterminated_fence_means_no_frontmatter() {
        let raw = "---\ntitle: never closed\n\nSome content";
        let fm = parse(raw).unwrap();
        assert_eq!(fm.title, None);
        assert_eq!(without(raw), raw);
    }

    #[test]
    fn without_strips_the_block() {
        let raw = "---\ntitle: T\n---\n# Heading\n";
        assert_eq!(without(raw), "# Heading\n");
    }

    #[test]
    fn without_handles_leading_blank_lines() {
        let raw = "\n\n---\ntitle: T\n---\nbody";
        let fm = parse(raw).unwrap();
        assert_eq!(fm.title.as_deref(), Some("T"));
        assert_eq!(without(raw), "body");
    }

    #[test]
    fn defaults_apply_without_frontmatter() {
        let fm = parse("just text").unwrap();
        assert_eq!(fm.weight, 0);
        assert!(fm.nav);
    }
}
