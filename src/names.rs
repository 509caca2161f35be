//! Reading and extending the `<names>` block of an element document.
//!
//! Only the names block is inspected; the rest of the document is treated as
//! opaque text and is never rewritten.

use quick_xml::escape::{escape, unescape};
use regex::Regex;
use std::sync::OnceLock;

const CLOSING_MARKER: &str = "</names>";
const DEFAULT_INDENT: &str = "    ";

fn names_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<names>.*?</names>").expect("valid names block regex"))
}

fn entry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<name\s+lang="([^"]*)"\s*>(.*?)</name>"#).expect("valid entry regex")
    })
}

fn entry_indent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n([ \t]*)<name\s").expect("valid indent regex"))
}

/// One `<name lang="..">..</name>` entry, borrowed from the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameEntry<'a> {
    pub lang: &'a str,
    /// Raw (still escaped, untrimmed) entry text
    pub raw_text: &'a str,
}

impl NameEntry<'_> {
    /// Trimmed text with markup entities decoded.
    pub fn text(&self) -> String {
        decode(self.raw_text.trim())
    }
}

/// Decode the predefined markup entities. Text that is not valid escaped
/// markup (a stray `&`, say) is returned as written.
fn decode(raw: &str) -> String {
    match unescape(raw) {
        Ok(text) => text.into_owned(),
        Err(_) => raw.to_string(),
    }
}

/// The first names block of the document, markers included.
pub fn names_block(content: &str) -> Option<&str> {
    names_block_re().find(content).map(|m| m.as_str())
}

/// All name entries of the document's names block, in document order.
pub fn name_entries(content: &str) -> Vec<NameEntry<'_>> {
    let Some(block) = names_block(content) else {
        return Vec::new();
    };

    entry_re()
        .captures_iter(block)
        .filter_map(|caps| {
            Some(NameEntry {
                lang: caps.get(1)?.as_str(),
                raw_text: caps.get(2)?.as_str(),
            })
        })
        .collect()
}

/// Decoded, trimmed text of the entry for `lang`, if the block has one.
pub fn entry_text(content: &str, lang: &str) -> Option<String> {
    name_entries(content)
        .into_iter()
        .find(|entry| entry.lang == lang)
        .map(|entry| entry.text())
}

/// Pick the text to translate for this document.
///
/// Returns `None` when there is no names block, when an entry for
/// `target_lang` already exists, when no language of `priority` is present,
/// or when the chosen entry is empty. The first language of `priority` that
/// has an entry wins, even if its text is empty.
pub fn extract_source_text(content: &str, target_lang: &str, priority: &[String]) -> Option<String> {
    let entries = name_entries(content);

    if entries.iter().any(|entry| entry.lang == target_lang) {
        return None;
    }

    let text = priority
        .iter()
        .find_map(|lang| entries.iter().find(|entry| entry.lang == lang))?
        .text();

    (!text.is_empty()).then_some(text)
}

/// Leading whitespace of the line holding byte offset `at`, if nothing else
/// precedes `at` on that line.
fn line_indent(content: &str, at: usize) -> &str {
    let line_start = content[..at].rfind('\n').map_or(0, |i| i + 1);
    let prefix = &content[line_start..at];
    if prefix.chars().all(|c| c == ' ' || c == '\t') {
        prefix
    } else {
        ""
    }
}

/// Insert a `target_lang` entry holding `translated` into the names block.
///
/// The entry takes the indentation of the existing entries and goes on its
/// own line right before the closing marker, whose indentation and line
/// ending are kept. If the closing marker shares a line with the last entry,
/// it is moved to a line of its own aligned with `<names>`. When the whole
/// block is written on a single line the entry is placed directly before
/// `</names>`.
///
/// Returns the document unchanged and `false` if there is no names block or
/// the target entry already exists.
pub fn insert_entry(content: &str, target_lang: &str, translated: &str) -> (String, bool) {
    let Some(found) = names_block_re().find(content) else {
        return (content.to_string(), false);
    };
    let block = found.as_str();

    if entry_re()
        .captures_iter(block)
        .any(|caps| caps.get(1).map(|m| m.as_str()) == Some(target_lang))
    {
        return (content.to_string(), false);
    }

    let entry = format!(
        r#"<name lang="{}">{}</name>"#,
        escape(target_lang),
        escape(translated)
    );
    let newline = if block.contains("\r\n") { "\r\n" } else { "\n" };
    let indent = entry_indent_re()
        .captures(block)
        .and_then(|caps| caps.get(1))
        .map_or(DEFAULT_INDENT, |m| m.as_str());

    let body = &block[..block.len() - CLOSING_MARKER.len()];

    let mut new_block = String::with_capacity(block.len() + entry.len() + indent.len() + 2);
    match body.rfind('\n') {
        Some(line_break) if body[line_break + 1..].chars().all(|c| c == ' ' || c == '\t') => {
            let insert_at = if body[..line_break].ends_with('\r') {
                line_break - 1
            } else {
                line_break
            };
            new_block.push_str(&body[..insert_at]);
            new_block.push_str(newline);
            new_block.push_str(indent);
            new_block.push_str(&entry);
            new_block.push_str(&body[insert_at..]);
        }
        Some(_) => {
            // `</names>` trails the last entry: break it onto its own line
            // aligned with the opening marker
            new_block.push_str(body);
            new_block.push_str(newline);
            new_block.push_str(indent);
            new_block.push_str(&entry);
            new_block.push_str(newline);
            new_block.push_str(line_indent(content, found.start()));
        }
        None => {
            new_block.push_str(body);
            new_block.push_str(&entry);
        }
    }
    new_block.push_str(CLOSING_MARKER);

    let mut updated = String::with_capacity(content.len() + new_block.len() - block.len());
    updated.push_str(&content[..found.start()]);
    updated.push_str(&new_block);
    updated.push_str(&content[found.end()..]);

    (updated, true)
}
