//! Deterministic text → (tokens, token set, stems) pipeline (§4.1).
//!
//! Stemming follows the classical Porter algorithm; the rule ordering and
//! m-count guards mirror Porter's own paper rather than any crate, since the
//! stopword list and surface-form rules here are specific to this engine.

use std::collections::HashSet;

use stopwords::STOPWORDS;

#[derive(Debug, Clone, Default)]
pub struct TokenizedText {
    pub tokens: Vec<String>,
    pub token_set: HashSet<String>,
    pub stems: HashSet<String>,
}

/// Tokenize `text` per §4.1: strip front-matter and fences, pull wikilink
/// targets in as plain tokens, strip inline formatting, split on non-letters,
/// lowercase, drop short tokens and stopwords.
pub fn tokenize(text: &str) -> TokenizedText {
    let without_frontmatter = strip_front_matter(text);
    let without_fences = strip_fenced_code(&without_frontmatter);
    let with_link_targets = inline_wikilink_targets(&without_fences);
    let without_formatting = strip_inline_formatting(&with_link_targets);

    let mut tokens = Vec::new();
    let mut token_set = HashSet::new();
    let mut stems = HashSet::new();

    for raw in split_words(&without_formatting) {
        let lower = raw.to_lowercase();
        if lower.chars().count() < 3 {
            continue;
        }
        if STOPWORDS.contains(&lower.as_str()) {
            continue;
        }
        stems.insert(stem(&lower));
        tokens.push(lower.clone());
        token_set.insert(lower);
    }

    TokenizedText {
        tokens,
        token_set,
        stems,
    }
}

fn strip_front_matter(text: &str) -> String {
    let trimmed_start = text.trim_start_matches(['\u{feff}']);
    if !trimmed_start.starts_with("---") {
        return text.to_string();
    }
    let mut lines = trimmed_start.lines();
    let Some(first) = lines.next() else {
        return text.to_string();
    };
    if first.trim_end() != "---" {
        return text.to_string();
    }
    let mut consumed = first.len() + 1;
    for line in lines {
        consumed += line.len() + 1;
        if line.trim_end() == "---" {
            return trimmed_start[consumed.min(trimmed_start.len())..].to_string();
        }
    }
    text.to_string()
}

fn strip_fenced_code(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_fence = false;
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Replace `[[Target|Display]]` / `[[Target]]` with `Target` so its words
/// become ordinary tokens, per §4.1.
fn inline_wikilink_targets(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut i = 0;
    while i < len {
        if chars[i] == '[' && i + 1 < len && chars[i + 1] == '[' {
            if let Some(close) = find_close(&chars, i + 2) {
                let inner: String = chars[i + 2..close].iter().collect();
                let target = inner.split('|').next().unwrap_or("").trim();
                let target = target.split('#').next().unwrap_or(target);
                out.push(' ');
                out.push_str(target);
                out.push(' ');
                i = close + 2;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn find_close(chars: &[char], start: usize) -> Option<usize> {
    let len = chars.len();
    let mut i = start;
    while i + 1 < len {
        if chars[i] == ']' && chars[i + 1] == ']' {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn strip_inline_formatting(text: &str) -> String {
    let mut out = text.to_string();
    for marker in ["~~", "**", "*", "`"] {
        out = strip_paired_marker(&out, marker);
    }
    out
}

fn strip_paired_marker(text: &str, marker: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(marker) {
        result.push_str(&rest[..start]);
        let after_marker = &rest[start + marker.len()..];
        if let Some(end) = after_marker.find(marker) {
            result.push_str(&after_marker[..end]);
            rest = &after_marker[end + marker.len()..];
        } else {
            result.push_str(after_marker);
            rest = "";
            break;
        }
    }
    result.push_str(rest);
    result
}

fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_alphabetic() || c.is_numeric() {
            current.push(c);
        } else if !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Two stems "share a root" per §4.1: common prefix ≥ 4 chars, equal to
/// `min(len_a, len_b)` truncated to 5.
pub fn share_root(a: &str, b: &str) -> bool {
    let bound = a.len().min(b.len()).min(5);
    if bound < 4 {
        return false;
    }
    a.chars().take(bound).eq(b.chars().take(bound))
}

// --- Porter stemmer -------------------------------------------------------

fn is_consonant(chars: &[char], i: usize) -> bool {
    match chars[i] {
        'a' | 'e' | 'i' | 'o' | 'u' => false,
        'y' => {
            if i == 0 {
                true
            } else {
                !is_consonant(chars, i - 1)
            }
        }
        _ => true,
    }
}

/// `m`: the number of consonant-vowel sequences in `chars[..end]`.
fn measure(chars: &[char], end: usize) -> usize {
    let mut m = 0;
    let mut i = 0;
    while i < end && is_consonant(chars, i) {
        i += 1;
    }
    loop {
        while i < end && !is_consonant(chars, i) {
            i += 1;
        }
        if i >= end {
            break;
        }
        m += 1;
        while i < end && is_consonant(chars, i) {
            i += 1;
        }
        if i >= end {
            break;
        }
    }
    m
}

fn contains_vowel(chars: &[char], end: usize) -> bool {
    (0..end).any(|i| !is_consonant(chars, i))
}

fn ends_double_consonant(chars: &[char]) -> bool {
    let n = chars.len();
    n >= 2 && chars[n - 1] == chars[n - 2] && is_consonant(chars, n - 1)
}

fn cvc(chars: &[char], end: usize) -> bool {
    if end < 3 {
        return false;
    }
    let (a, b, c) = (end - 3, end - 2, end - 1);
    is_consonant(chars, a)
        && !is_consonant(chars, b)
        && is_consonant(chars, c)
        && !matches!(chars[c], 'w' | 'x' | 'y')
}

fn ends_with(chars: &[char], end: usize, suffix: &str) -> bool {
    let suf: Vec<char> = suffix.chars().collect();
    if suf.len() > end {
        return false;
    }
    chars[end - suf.len()..end] == suf[..]
}

fn replace_end(word: &mut Vec<char>, end: usize, remove: &str, with: &str) -> usize {
    let remove_len = remove.chars().count();
    let new_end = end - remove_len;
    let with_chars: Vec<char> = with.chars().collect();
    word.truncate(new_end);
    word.extend(with_chars.iter());
    new_end + with_chars.len()
}

/// Apply the classical Porter stemming algorithm to a lowercase word.
pub fn stem(word: &str) -> String {
    if word.chars().count() <= 2 {
        return word.to_string();
    }
    let mut w: Vec<char> = word.chars().collect();
    let mut end = w.len();

    // Step 1a
    if ends_with(&w, end, "sses") {
        end = replace_end(&mut w, end, "sses", "ss");
    } else if ends_with(&w, end, "ies") {
        end = replace_end(&mut w, end, "ies", "i");
    } else if ends_with(&w, end, "ss") {
        // unchanged
    } else if ends_with(&w, end, "s") {
        end = replace_end(&mut w, end, "s", "");
    }

    // Step 1b
    let mut step1b_yy = false;
    if ends_with(&w, end, "eed") {
        if measure(&w, end - 3) > 0 {
            end = replace_end(&mut w, end, "eed", "ee");
        }
    } else if (ends_with(&w, end, "ed") && contains_vowel(&w, end - 2))
        || (ends_with(&w, end, "ing") && contains_vowel(&w, end - 3))
    {
        let stem_end = if ends_with(&w, end, "ed") { end - 2 } else { end - 3 };
        w.truncate(stem_end);
        end = stem_end;
        step1b_yy = true;
    }

    if step1b_yy {
        if ends_with(&w, end, "at") || ends_with(&w, end, "bl") || ends_with(&w, end, "iz") {
            w.insert(end, 'e');
            end += 1;
        } else if ends_double_consonant(&w[..end]) && !matches!(w[end - 1], 'l' | 's' | 'z') {
            w.truncate(end - 1);
            end -= 1;
        } else if measure(&w, end) == 1 && cvc(&w, end) {
            w.insert(end, 'e');
            end += 1;
        }
    }

    // Step 1c
    if ends_with(&w, end, "y") && contains_vowel(&w, end - 1) {
        w[end - 1] = 'i';
    }

    macro_rules! try_rule {
        ($suffix:expr, $replacement:expr, $min_m:expr) => {
            if ends_with(&w, end, $suffix) {
                let stem_len = end - $suffix.chars().count();
                if measure(&w, stem_len) > $min_m {
                    end = replace_end(&mut w, end, $suffix, $replacement);
                    true
                } else {
                    false
                }
            } else {
                false
            }
        };
    }

    // Step 2
    let step2 = [
        ("ational", "ate"),
        ("tional", "tion"),
        ("enci", "ence"),
        ("anci", "ance"),
        ("izer", "ize"),
        ("bli", "ble"),
        ("alli", "al"),
        ("entli", "ent"),
        ("eli", "e"),
        ("ousli", "ous"),
        ("ization", "ize"),
        ("ation", "ate"),
        ("ator", "ate"),
        ("alism", "al"),
        ("iveness", "ive"),
        ("fulness", "ful"),
        ("ousness", "ous"),
        ("aliti", "al"),
        ("iviti", "ive"),
        ("biliti", "ble"),
    ];
    for (suf, rep) in step2 {
        if try_rule!(suf, rep, 0) {
            break;
        }
    }

    // Step 3
    let step3 = [
        ("icate", "ic"),
        ("ative", ""),
        ("alize", "al"),
        ("iciti", "ic"),
        ("ical", "ic"),
        ("ful", ""),
        ("ness", ""),
    ];
    for (suf, rep) in step3 {
        if try_rule!(suf, rep, 0) {
            break;
        }
    }

    // Step 4
    let step4 = [
        "al", "ance", "ence", "er", "ic", "able", "ible", "ant", "ement", "ment", "ent", "ism",
        "ate", "iti", "ous", "ive", "ize",
    ];
    for suf in step4 {
        if ends_with(&w, end, suf) {
            let stem_len = end - suf.chars().count();
            if measure(&w, stem_len) > 1 {
                end = stem_len;
                w.truncate(end);
            }
            break;
        }
    }
    if ends_with(&w, end, "ion") {
        let stem_len = end - 3;
        if measure(&w, stem_len) > 1 && stem_len > 0 && matches!(w[stem_len - 1], 's' | 't') {
            end = stem_len;
            w.truncate(end);
        }
    }

    // Step 5a
    if ends_with(&w, end, "e") {
        let stem_len = end - 1;
        if measure(&w, stem_len) > 1 || (measure(&w, stem_len) == 1 && !cvc(&w, stem_len)) {
            end = stem_len;
            w.truncate(end);
        }
    }

    // Step 5b
    if measure(&w, end) > 1 && ends_double_consonant(&w[..end]) && w.last() == Some(&'l') {
        end -= 1;
        w.truncate(end);
    }

    w.into_iter().take(end).collect()
}

mod stopwords {
    /// Expanded stopword list per §4.1: common function words plus the
    /// mandatory categories (verbs, time words, generic nouns, qualifiers,
    /// adjective fillers).
    pub static STOPWORDS: &[&str] = &[
        // common articles / prepositions / pronouns
        "the", "and", "for", "are", "but", "not", "you", "all", "can", "her", "was", "one",
        "our", "out", "day", "get", "has", "him", "his", "how", "man", "new", "now", "old",
        "see", "two", "way", "who", "boy", "did", "its", "let", "put", "say", "she", "too",
        "use", "with", "from", "this", "that", "have", "they", "been", "were", "their", "what",
        "when", "which", "will", "would", "there", "into", "about", "than", "then", "them",
        "these", "those", "some", "such", "only", "also", "over", "more", "most", "other",
        "into", "through", "during", "before", "after", "above", "below", "between", "under",
        // mandatory verb forms
        "create", "created", "creating", "work", "worked", "working", "test", "testing",
        "tested", "build", "building", "built", "fix", "fixed", "start", "started", "complete",
        "completed", "update", "updated", "release", "released", "finish", "finished",
        // mandatory time words
        "today", "yesterday", "tomorrow", "morning", "weekly", "daily", "monthly", "quarterly",
        "currently", "recently",
        // mandatory generic nouns
        "thing", "things", "something", "stuff", "message", "file",
        // mandatory qualifiers
        "really", "actually", "basically", "probably", "simply", "quickly",
        // mandatory adjective fillers
        "good", "better", "different", "important",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_short_tokens_and_stopwords() {
        let t = tokenize("Working on the API with a new team");
        assert!(!t.token_set.contains("the"));
        assert!(!t.token_set.contains("working"));
        assert!(t.token_set.contains("api"));
        assert!(t.token_set.contains("team"));
    }

    #[test]
    fn inlines_wikilink_target_words() {
        let t = tokenize("See [[Model Context Protocol|MCP]] docs");
        assert!(t.token_set.contains("model"));
        assert!(t.token_set.contains("context"));
        assert!(t.token_set.contains("protocol"));
    }

    #[test]
    fn strips_front_matter_and_fences() {
        let text = "---\ntitle: secretword\n---\n```\ncodeword here\n```\nactual body content";
        let t = tokenize(text);
        assert!(!t.token_set.contains("secretword"));
        assert!(!t.token_set.contains("codeword"));
        assert!(t.token_set.contains("actual"));
    }

    #[test]
    fn stems_plurals_and_ing_forms() {
        assert_eq!(stem("caresses"), "caress");
        assert_eq!(stem("ponies"), "poni");
        assert_eq!(stem("relational"), "relate");
        assert_eq!(stem("agreed"), "agre");
        assert_eq!(stem("plastered"), "plaster");
        assert_eq!(stem("motoring"), "motor");
    }

    #[test]
    fn share_root_requires_four_char_common_prefix() {
        assert!(share_root("connect", "connection"));
        assert!(!share_root("cat", "car"));
    }
}
