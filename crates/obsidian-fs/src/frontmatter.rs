//! YAML front-matter split/parse/serialize and whole-note read/write.

use std::fmt;
use std::path::Path;

use crate::value::{FrontMatterValue, OrderedMap};

/// The line-ending style a note was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }

    /// Detect from content: CRLF if the first line terminator found is `\r\n`.
    pub fn detect(content: &str) -> LineEnding {
        if let Some(idx) = content.find('\n') {
            if idx > 0 && content.as_bytes()[idx - 1] == b'\r' {
                return LineEnding::CrLf;
            }
        }
        LineEnding::Lf
    }
}

/// A note split into front-matter, content, and formatting metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNote {
    pub frontmatter: OrderedMap,
    pub content: String,
    pub line_ending: LineEnding,
    pub bom: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Two identical keys at the front-matter's top level.
    DuplicateKey { key: String, line: usize },
    /// The YAML between the `---` delimiters didn't parse.
    InvalidYaml { message: String, line: usize },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::DuplicateKey { key, line } => {
                write!(f, "duplicate front-matter key '{key}' at line {line}")
            }
            ParseError::InvalidYaml { message, line } => {
                write!(f, "invalid front-matter YAML near line {line}: {message}")
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Codec for the `---\n...\n---\n` front-matter block at the start of a note.
pub struct FrontMatterCodec;

impl FrontMatterCodec {
    /// Split raw content into an (optional) front-matter YAML slice and the
    /// remaining body. Front-matter must begin at byte 0 (after an optional
    /// BOM, stripped by the caller).
    pub fn split(raw: &str) -> (Option<&str>, &str) {
        if !raw.starts_with("---") {
            return (None, raw);
        }
        let after_opening = &raw[3..];
        let content_start = if let Some(rest) = after_opening.strip_prefix("\r\n") {
            rest
        } else if let Some(rest) = after_opening.strip_prefix('\n') {
            rest
        } else {
            return (None, raw);
        };

        match Self::find_closing_delimiter(content_start) {
            Some(close_pos) => {
                let yaml = &content_start[..close_pos];
                let after_close = &content_start[close_pos + 3..];
                let content = after_close
                    .strip_prefix("\r\n")
                    .or_else(|| after_close.strip_prefix('\n'))
                    .unwrap_or(after_close);
                (Some(yaml), content)
            }
            None => (None, raw),
        }
    }

    fn find_closing_delimiter(s: &str) -> Option<usize> {
        let mut pos = 0;
        for line in s.lines() {
            if line == "---" || line == "---\r" {
                return Some(pos);
            }
            pos += line.len() + 1;
        }
        None
    }

    /// Parse front-matter YAML into an ordered, typed map.
    ///
    /// Empty YAML between the delimiters parses to an empty map. Duplicate
    /// top-level keys are rejected even though the underlying YAML parser
    /// would silently keep the last one, since silently dropping a key is
    /// exactly the kind of front-matter corruption this codec exists to
    /// prevent.
    pub fn parse(yaml: &str) -> Result<OrderedMap, ParseError> {
        if let Some((key, line)) = Self::first_duplicate_key(yaml) {
            return Err(ParseError::DuplicateKey { key, line });
        }

        let value: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(|e| {
            let line = e.location().map(|l| l.line()).unwrap_or(1);
            ParseError::InvalidYaml {
                message: e.to_string(),
                line,
            }
        })?;

        match FrontMatterValue::from_yaml(value) {
            FrontMatterValue::Map(map) => Ok(map),
            FrontMatterValue::Null => Ok(OrderedMap::new()),
            _ => Ok(OrderedMap::new()),
        }
    }

    /// Scan top-level (column-0) `key:` lines for a duplicate, ignoring
    /// anything indented (nested maps/sequences) or inside a literal/folded
    /// block scalar.
    fn first_duplicate_key(yaml: &str) -> Option<(String, usize)> {
        let mut seen = std::collections::HashSet::new();
        let mut in_block_scalar = false;
        let mut block_scalar_indent: Option<usize> = None;

        for (idx, raw_line) in yaml.lines().enumerate() {
            let line_no = idx + 1;
            if raw_line.trim().is_empty() || raw_line.trim_start().starts_with('#') {
                continue;
            }

            let indent = raw_line.len() - raw_line.trim_start().len();

            if in_block_scalar {
                if let Some(base) = block_scalar_indent {
                    if indent > base || raw_line.trim().is_empty() {
                        continue;
                    }
                }
                in_block_scalar = false;
            }

            if indent != 0 {
                continue;
            }

            let Some(colon) = raw_line.find(':') else {
                continue;
            };
            let key = raw_line[..colon].trim();
            if key.is_empty() || key.starts_with('-') || key.starts_with('"') || key.starts_with('\'')
            {
                continue;
            }
            if !seen.insert(key.to_string()) {
                return Some((key.to_string(), line_no));
            }

            let value_part = raw_line[colon + 1..].trim();
            if value_part.starts_with('|') || value_part.starts_with('>') {
                in_block_scalar = true;
                block_scalar_indent = Some(indent);
            }
        }
        None
    }

    /// Serialize front-matter back to a YAML block (without delimiters).
    pub fn serialize(frontmatter: &OrderedMap) -> String {
        if frontmatter.is_empty() {
            return String::new();
        }
        let mut mapping = serde_yaml::Mapping::new();
        for (k, v) in frontmatter.iter() {
            mapping.insert(serde_yaml::Value::String(k.clone()), v.to_yaml());
        }
        serde_yaml::to_string(&serde_yaml::Value::Mapping(mapping)).unwrap_or_default()
    }
}

/// Read a note from disk, splitting front-matter and detecting line ending
/// style and BOM so a later write can reproduce them exactly.
pub fn read_note(path: &Path) -> std::io::Result<ParsedNote> {
    let bytes = std::fs::read(path)?;
    let bom = bytes.starts_with(&[0xEF, 0xBB, 0xBF]);
    let text_bytes = if bom { &bytes[3..] } else { &bytes[..] };
    let raw = String::from_utf8_lossy(text_bytes).into_owned();
    let line_ending = LineEnding::detect(&raw);

    let (yaml, content) = FrontMatterCodec::split(&raw);
    let frontmatter = match yaml {
        Some(y) => FrontMatterCodec::parse(y).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?,
        None => OrderedMap::new(),
    };

    Ok(ParsedNote {
        frontmatter,
        content: content.to_string(),
        line_ending,
        bom,
    })
}

/// Serialize a note's front-matter + content back into a single string,
/// normalized to the requested line ending with exactly one trailing
/// line-ending byte.
pub fn write_note(note: &ParsedNote) -> String {
    let nl = note.line_ending.as_str();
    let mut out = String::new();

    if note.bom {
        out.push('\u{FEFF}');
    }

    if !note.frontmatter.is_empty() {
        let yaml = FrontMatterCodec::serialize(&note.frontmatter);
        out.push_str("---");
        out.push_str(nl);
        for line in yaml.lines() {
            out.push_str(line);
            out.push_str(nl);
        }
        out.push_str("---");
        out.push_str(nl);
    }

    out.push_str(&note.content);

    // Normalize all bare \n to the requested line ending (cheap when already
    // matching), then ensure exactly one trailing line ending.
    let normalized = if note.line_ending == LineEnding::CrLf {
        normalize_to_crlf(&out)
    } else {
        out.replace("\r\n", "\n")
    };

    let trimmed = trim_trailing_newlines(&normalized, nl);
    format!("{trimmed}{nl}")
}

fn normalize_to_crlf(s: &str) -> String {
    let lf_only = s.replace("\r\n", "\n");
    lf_only.replace('\n', "\r\n")
}

fn trim_trailing_newlines<'a>(s: &'a str, nl: &str) -> &'a str {
    let mut end = s.len();
    while end >= nl.len() && &s[end - nl.len()..end] == nl {
        end -= nl.len();
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_note_with_frontmatter() {
        let raw = "---\ntitle: Test\n---\n\nContent here";
        let (yaml, content) = FrontMatterCodec::split(raw);
        assert_eq!(yaml, Some("title: Test\n"));
        assert_eq!(content, "\nContent here");
    }

    #[test]
    fn split_note_without_frontmatter() {
        let raw = "Just content, no frontmatter";
        let (yaml, content) = FrontMatterCodec::split(raw);
        assert!(yaml.is_none());
        assert_eq!(content, raw);
    }

    #[test]
    fn split_incomplete_frontmatter_is_not_frontmatter() {
        let raw = "---\ntitle: Test\nNo closing delimiter";
        let (yaml, content) = FrontMatterCodec::split(raw);
        assert!(yaml.is_none());
        assert_eq!(content, raw);
    }

    #[test]
    fn empty_frontmatter_parses_to_empty_map() {
        let map = FrontMatterCodec::parse("").unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn parses_scalar_types() {
        let yaml = "count: 3\nratio: 1.5\ndone: true\nname: hi\nempty: null\n";
        let map = FrontMatterCodec::parse(yaml).unwrap();
        assert_eq!(map.get("count"), Some(&FrontMatterValue::Int(3)));
        assert_eq!(map.get("ratio"), Some(&FrontMatterValue::Float(1.5)));
        assert_eq!(map.get("done"), Some(&FrontMatterValue::Bool(true)));
        assert_eq!(map.get("empty"), Some(&FrontMatterValue::Null));
    }

    #[test]
    fn yes_no_are_not_booleans() {
        let map = FrontMatterCodec::parse("flag: yes\n").unwrap();
        assert_eq!(
            map.get("flag"),
            Some(&FrontMatterValue::String("yes".to_string()))
        );
    }

    #[test]
    fn parses_date_scalar() {
        let map = FrontMatterCodec::parse("created: 2026-01-05\n").unwrap();
        assert!(matches!(map.get("created"), Some(FrontMatterValue::Date(_))));
    }

    #[test]
    fn rejects_duplicate_top_level_keys() {
        let err = FrontMatterCodec::parse("title: A\ntitle: B\n").unwrap_err();
        assert!(matches!(err, ParseError::DuplicateKey { .. }));
    }

    #[test]
    fn nested_keys_do_not_count_as_duplicates() {
        let yaml = "author:\n  name: A\ntags:\n  name: B\n";
        assert!(FrontMatterCodec::parse(yaml).is_ok());
    }

    #[test]
    fn invalid_yaml_carries_line_hint() {
        let err = FrontMatterCodec::parse("key: [unterminated\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidYaml { .. }));
    }

    #[test]
    fn round_trips_without_frontmatter_lf() {
        let note = ParsedNote {
            frontmatter: OrderedMap::new(),
            content: "Hello\nWorld".to_string(),
            line_ending: LineEnding::Lf,
            bom: false,
        };
        assert_eq!(write_note(&note), "Hello\nWorld\n");
    }

    #[test]
    fn round_trips_with_frontmatter_preserving_crlf() {
        let mut fm = OrderedMap::new();
        fm.insert("title".to_string(), FrontMatterValue::String("Hi".to_string()));
        let note = ParsedNote {
            frontmatter: fm,
            content: "Body text".to_string(),
            line_ending: LineEnding::CrLf,
            bom: false,
        };
        let written = write_note(&note);
        assert!(written.starts_with("---\r\n"));
        assert!(written.ends_with("Body text\r\n"));
        assert!(!written.contains("\n\r\n\r\n"));
    }

    #[test]
    fn write_always_ends_with_exactly_one_newline() {
        let note = ParsedNote {
            frontmatter: OrderedMap::new(),
            content: "Body\n\n\n".to_string(),
            line_ending: LineEnding::Lf,
            bom: false,
        };
        let written = write_note(&note);
        assert!(written.ends_with("Body\n"));
        assert!(!written.ends_with("Body\n\n"));
    }

    #[test]
    fn detects_crlf() {
        assert_eq!(LineEnding::detect("a\r\nb"), LineEnding::CrLf);
        assert_eq!(LineEnding::detect("a\nb"), LineEnding::Lf);
        assert_eq!(LineEnding::detect("no newline"), LineEnding::Lf);
    }

    #[test]
    fn bom_round_trips_through_read_and_write() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("note.md");
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"Hello\n");
        std::fs::write(&path, &bytes).unwrap();

        let note = read_note(&path).unwrap();
        assert!(note.bom);

        let written = write_note(&note);
        assert!(written.starts_with('\u{FEFF}'));
        assert_eq!(written.as_bytes()[..3], [0xEF, 0xBB, 0xBF]);
    }

    #[test]
    fn no_bom_stays_absent_on_write() {
        let note = ParsedNote {
            frontmatter: OrderedMap::new(),
            content: "Hello".to_string(),
            line_ending: LineEnding::Lf,
            bom: false,
        };
        let written = write_note(&note);
        assert!(!written.starts_with('\u{FEFF}'));
    }
}
