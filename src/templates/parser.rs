//! Parses a reasoning-template source document: a `---`-fenced metadata
//! header followed by the template body.
//!
//! Hand-rolled rather than pulling in a YAML crate — the schema is a fixed
//! half-dozen scalar/list fields, the same choice made for small fixed-shape
//! text formats in `backend/src/patterns/types.rs` rather than reaching for
//! a generic serialization crate.

#[derive(Debug, Clone)]
pub struct ParsedTemplate {
    pub name: String,
    pub domain: Option<String>,
    pub complexity: Option<String>,
    pub methodology: Option<String>,
    pub keywords: Vec<String>,
    pub description: String,
    pub body: String,
}

/// Parse failure reason, logged as a warning by the caller and the file
/// skipped (spec §6: "parsing failures skip the file with a warning").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    MissingHeaderFence,
    MissingName,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::MissingHeaderFence => write!(f, "missing --- metadata fence"),
            ParseError::MissingName => write!(f, "metadata header has no `name` field"),
        }
    }
}

pub fn parse(source: &str) -> Result<ParsedTemplate, ParseError> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let mut lines = source.lines();

    match lines.next() {
        Some(first) if first.trim() == "---" => {}
        _ => return Err(ParseError::MissingHeaderFence),
    }

    let mut header_lines = Vec::new();
    let mut closed = false;
    let mut rest_lines = Vec::new();
    for line in lines.by_ref() {
        if line.trim() == "---" {
            closed = true;
            break;
        }
        header_lines.push(line);
    }
    if !closed {
        return Err(ParseError::MissingHeaderFence);
    }
    rest_lines.extend(lines);

    let mut name = None;
    let mut domain = None;
    let mut complexity = None;
    let mut methodology = None;
    let mut keywords = Vec::new();
    let mut description = None;

    for line in header_lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim().to_string();
        match key.as_str() {
            "name" => name = Some(value),
            "domain" => domain = Some(value),
            "complexity" => complexity = Some(value),
            "methodology" => methodology = Some(value),
            "description" => description = Some(value),
            "keywords" => {
                keywords = value
                    .split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect();
            }
            _ => {}
        }
    }

    let name = name.ok_or(ParseError::MissingName)?;
    let body = rest_lines.join("\n").trim().to_string();

    Ok(ParsedTemplate {
        name,
        domain,
        complexity,
        methodology,
        keywords,
        description: description.unwrap_or_default(),
        body,
    })
}

/// Slugify a template name into a stable id: lowercase, non-alphanumeric
/// runs collapsed to a single hyphen, trimmed of leading/trailing hyphens.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_hyphen = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen && !out.is_empty() {
            out.push('-');
            last_was_hyphen = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_header() {
        let src = "---\nname: Root Cause Analysis\ndomain: debugging\nkeywords: bug, trace, root cause\ndescription: Find the root cause\n---\nStep 1. Gather evidence.\n";
        let parsed = parse(src).unwrap();
        assert_eq!(parsed.name, "Root Cause Analysis");
        assert_eq!(parsed.domain.as_deref(), Some("debugging"));
        assert_eq!(parsed.keywords, vec!["bug", "trace", "root cause"]);
        assert_eq!(parsed.body, "Step 1. Gather evidence.");
    }

    #[test]
    fn missing_fence_is_an_error() {
        assert_eq!(parse("no header here").unwrap_err(), ParseError::MissingHeaderFence);
    }

    #[test]
    fn missing_name_is_an_error() {
        let src = "---\ndomain: x\n---\nbody";
        assert_eq!(parse(src).unwrap_err(), ParseError::MissingName);
    }

    #[test]
    fn slugify_collapses_and_trims() {
        assert_eq!(slugify("Root Cause  Analysis!!"), "root-cause-analysis");
        assert_eq!(slugify("  leading"), "leading");
    }
}
