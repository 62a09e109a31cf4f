//! Heading extraction, section lookup, and indentation-aware insertion (§4.8).

use regex::Regex;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq)]
pub struct Heading {
    pub level: u8,
    pub text: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub name: String,
    pub level: u8,
    pub start_line: usize,
    pub content_start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Append,
    Prepend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    Plain,
    Bullet,
    Task,
    Numbered,
    TimestampBullet,
}

pub struct SectionEditor;

impl SectionEditor {
    /// Scan line-by-line, skipping lines inside fenced code blocks. An
    /// unclosed fence swallows the rest of the file.
    pub fn extract_headings(md: &str) -> Vec<Heading> {
        let heading_re = Regex::new(r"^(#{1,6})\s+(.*)$").expect("static heading pattern is valid");
        let mut headings = Vec::new();
        let mut in_fence = false;

        for (i, line) in md.lines().enumerate() {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }
            if let Some(caps) = heading_re.captures(line) {
                let level = caps[1].len() as u8;
                let text = caps[2].trim().to_string();
                headings.push(Heading { level, text, line: i });
            }
        }
        headings
    }

    /// Case-insensitive exact-text match; first occurrence wins.
    pub fn find_section(md: &str, name: &str) -> Option<Section> {
        let target = normalize_section_name(name);
        let headings = Self::extract_headings(md);
        let lines: Vec<&str> = md.lines().collect();

        let (idx, heading) = headings
            .iter()
            .enumerate()
            .find(|(_, h)| normalize_section_name(&h.text) == target)?;

        let start_line = heading.line;
        let content_start_line = start_line + 1;
        let end_line = headings[idx + 1..]
            .iter()
            .find(|h| h.level <= heading.level)
            .map(|h| h.line.saturating_sub(1))
            .unwrap_or(lines.len().saturating_sub(1));

        Some(Section {
            name: heading.text.clone(),
            level: heading.level,
            start_line,
            content_start_line,
            end_line,
        })
    }

    pub fn insert_in_section(md: &str, section: &Section, payload: &str, position: InsertPosition, preserve_list_nesting: bool) -> String {
        let mut lines: Vec<String> = md.lines().map(String::from).collect();
        let section_lines: Vec<String> = lines[section.content_start_line..=section.end_line.min(lines.len().saturating_sub(1))].to_vec();

        let indent = detect_list_indent(&section_lines, position);
        let payload_lines = format_payload(payload, indent, preserve_list_nesting);

        let first_content_line = section_lines.iter().find(|l| !l.trim().is_empty());
        let is_placeholder = matches!(position, InsertPosition::Append)
            && first_content_line.map(|l| is_empty_placeholder(l)).unwrap_or(false);

        if is_placeholder {
            let placeholder_idx = section_lines
                .iter()
                .position(|l| is_empty_placeholder(l))
                .map(|i| section.content_start_line + i)
                .unwrap();
            lines.splice(placeholder_idx..=placeholder_idx, payload_lines);
        } else {
            match position {
                InsertPosition::Append => {
                    let insert_at = (section.end_line + 1).min(lines.len());
                    lines.splice(insert_at..insert_at, payload_lines);
                }
                InsertPosition::Prepend => {
                    lines.splice(section.content_start_line..section.content_start_line, payload_lines);
                }
            }
        }

        let collapsed = collapse_blank_runs(lines, section.content_start_line);
        let mut out = collapsed.join("\n");
        if md.ends_with('\n') {
            out.push('\n');
        }
        out
    }

    /// Idempotent: if `text` already starts with the target marker, it is
    /// returned unchanged.
    pub fn format_content(text: &str, format: ContentFormat, now_hh_mm: Option<&str>) -> String {
        let trimmed = text.trim_start();
        match format {
            ContentFormat::Plain => text.to_string(),
            ContentFormat::Bullet => {
                if trimmed.starts_with("- ") || trimmed.starts_with("* ") {
                    text.to_string()
                } else {
                    format!("- {text}")
                }
            }
            ContentFormat::Task => {
                if Regex::new(r"^[-*]\s\[[ xX]\]\s").unwrap().is_match(trimmed) {
                    text.to_string()
                } else {
                    format!("- [ ] {text}")
                }
            }
            ContentFormat::Numbered => {
                if Regex::new(r"^\d+\.\s").unwrap().is_match(trimmed) {
                    text.to_string()
                } else {
                    format!("1. {text}")
                }
            }
            ContentFormat::TimestampBullet => {
                if Regex::new(r"^[-*]\s\*\*\d{2}:\d{2}\*\*\s").unwrap().is_match(trimmed) {
                    text.to_string()
                } else {
                    let time = now_hh_mm.unwrap_or("00:00");
                    format!("- **{time}** {text}")
                }
            }
        }
    }
}

fn normalize_section_name(name: &str) -> String {
    name.trim_start_matches('#').trim().to_lowercase()
}

const LIST_ITEM_RE: &str = r"^(\s*)([-*+]\s\[[ xX]\]\s|[-*+]\s|\d+\.\s)";

fn detect_list_indent(section_lines: &[String], position: InsertPosition) -> String {
    let re = Regex::new(LIST_ITEM_RE).expect("static list-item pattern is valid");
    let iter: Box<dyn Iterator<Item = &String>> = match position {
        InsertPosition::Append => Box::new(section_lines.iter().rev()),
        InsertPosition::Prepend => Box::new(section_lines.iter()),
    };
    for line in iter {
        if let Some(caps) = re.captures(line) {
            return caps[1].to_string();
        }
    }
    String::new()
}

fn is_empty_placeholder(line: &str) -> bool {
    let patterns = [
        r"^\s*[-*+]\s*$",
        r"^\s*\d+\.\s*$",
        r"^\s*[-*+]\s*\[\s?[xX]?\]\s*$",
    ];
    patterns.iter().any(|p| Regex::new(p).unwrap().is_match(line))
}

fn format_payload(payload: &str, indent: String, preserve_list_nesting: bool) -> Vec<String> {
    let starts_with_list_marker = Regex::new(r"^\s*([-*+]|\d+\.)\s").unwrap().is_match(payload);
    let marker_column = marker_indent_width(payload);

    payload
        .lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                if preserve_list_nesting && starts_with_list_marker && !indent.is_empty() {
                    format!("{indent}{line}")
                } else {
                    line.to_string()
                }
            } else if is_inside_special_block(payload, i) {
                line.to_string()
            } else {
                format!("{}{}", " ".repeat(marker_column), line)
            }
        })
        .collect()
}

fn marker_indent_width(payload: &str) -> usize {
    let first = payload.lines().next().unwrap_or("");
    if Regex::new(r"^\s*-\s\[[ xX]\]\s").unwrap().is_match(first) {
        6
    } else if Regex::new(r"^\s*\d+\.\s").unwrap().is_match(first) {
        3
    } else if Regex::new(r"^\s*-\s\*\*\d{2}:\d{2}\*\*\s").unwrap().is_match(first) {
        2
    } else if Regex::new(r"^\s*[-*+]\s").unwrap().is_match(first) {
        2
    } else {
        0
    }
}

fn is_inside_special_block(payload: &str, line_index: usize) -> bool {
    let lines: Vec<&str> = payload.lines().collect();
    let mut in_fence = false;
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
        }
        let special = in_fence || trimmed.starts_with('|') || trimmed.starts_with('>');
        if i == line_index {
            return special;
        }
    }
    false
}

fn collapse_blank_runs(lines: Vec<String>, from_line: usize) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());
    let mut blank_run = 0;
    for (i, line) in lines.into_iter().enumerate() {
        if i < from_line {
            out.push(line);
            continue;
        }
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run <= 1 {
                out.push(line);
            }
        } else {
            blank_run = 0;
            out.push(line);
        }
    }
    out
}

pub fn not_found_with_section_suggestions(md: &str, requested: &str) -> EngineError {
    let suggestions: Vec<String> = SectionEditor::extract_headings(md).into_iter().map(|h| h.text).collect();
    EngineError::not_found(format!("section '{requested}' not found")).with_suggestions(suggestions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_headings_skips_fenced_code() {
        let md = "# Title\n```\n## Not a heading\n```\n## Real";
        let headings = SectionEditor::extract_headings(md);
        assert_eq!(headings.len(), 2);
        assert_eq!(headings[0].text, "Title");
        assert_eq!(headings[1].text, "Real");
    }

    #[test]
    fn find_section_is_case_insensitive() {
        let md = "# Notes\n\n## Priorities\ncontent\n\n## Next\nmore";
        let section = SectionEditor::find_section(md, "priorities").unwrap();
        assert_eq!(section.name, "Priorities");
        assert_eq!(section.level, 2);
    }

    #[test]
    fn placeholder_replacement_scenario_from_spec() {
        let md = "## Priorities\n1. \n\n## Next\n";
        let section = SectionEditor::find_section(md, "Priorities").unwrap();
        let result = SectionEditor::insert_in_section(md, &section, "1. First priority", InsertPosition::Append, true);
        assert_eq!(result, "## Priorities\n1. First priority\n\n## Next\n");
    }

    #[test]
    fn format_content_is_idempotent() {
        let once = SectionEditor::format_content("buy milk", ContentFormat::Bullet, None);
        let twice = SectionEditor::format_content(&once, ContentFormat::Bullet, None);
        assert_eq!(once, twice);
        assert_eq!(once, "- buy milk");
    }

    #[test]
    fn sequential_appends_preserve_indentation() {
        let mut md = "## Log\n- a\n".to_string();
        for label in ["b", "c", "d", "e"] {
            let section = SectionEditor::find_section(&md, "Log").unwrap();
            md = SectionEditor::insert_in_section(&md, &section, &format!("- {label}"), InsertPosition::Append, true);
        }
        for line in md.lines().skip(1) {
            assert!(line.starts_with("- "));
        }
    }
}
