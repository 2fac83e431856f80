/*!
 * Repairs for artifacts translators leave in markup.
 *
 * Engines treat markup they were never meant to see as prose: they insert
 * spaces inside braces, drop or double backslashes and duplicate lines.
 * The functions here undo the common cases. `finalize` runs the whole
 * post-translation sequence on a reassembled document.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashSet;

use super::normalize::{restore_accents, Normalized, Normalizer};
use super::scan::is_escaped;

static BIBLIOGRAPHY_COMMAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\\[ \t]*)*\b(bibliographystyle|bibliography)[ \t]*\{[ \t]*([^{}]*?)[ \t]*\}")
        .expect("bibliography pattern")
});

static BIBLIOGRAPHY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(bibliographystyle|bibliography)\s*\{([^}]*)\}").expect("bibliography line pattern")
});

static COLOR_MODEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\s*(RGB|HTML|CMYK|HSB|HSL|Gray|wave)\s*\}").expect("color model pattern")
});

static COLOR_TRIPLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*\}").expect("color triple pattern")
});

static COLOR_HEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\s+([A-F0-9]+)\s*\}|\{([A-F0-9]+)\s+\}").expect("color hex pattern"));

static STRING_AT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\string@").expect("string-at pattern"));

/// Restore a bibliography command mangled by a translator: missing or doubled
/// backslash, spaces after the backslash or inside the braces.
pub fn repair_bibliography(text: &str) -> String {
    BIBLIOGRAPHY_COMMAND
        .replace_all(text, |caps: &Captures| format!("\\{}{{{}}}", &caps[1], &caps[2]))
        .into_owned()
}

/// Drop lines repeating a bibliography command already seen with the same argument
pub fn dedup_bibliography(text: &str) -> String {
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    for line in text.split('\n') {
        if let Some(caps) = BIBLIOGRAPHY_LINE.captures(line) {
            let key = format!("{}:{}", &caps[1], &caps[2]);
            if !seen.insert(key) {
                debug!("Dropping duplicate bibliography line: {}", line.trim());
                continue;
            }
        }
        kept.push(line);
    }
    kept.join("\n")
}

/// Remove whitespace a translator inserted into color models and values
pub fn repair_color_models(text: &str) -> String {
    let text = COLOR_MODEL.replace_all(text, "{$1}");
    let text = COLOR_TRIPLE.replace_all(&text, "{$1,$2,$3}");
    COLOR_HEX
        .replace_all(&text, |caps: &Captures| {
            let value = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or_default();
            format!("{{{}}}", value)
        })
        .into_owned()
}

/// `\string@` confuses engines into emitting broken control sequences
pub fn sanitize_string_at(text: &str) -> String {
    STRING_AT.replace_all(text, " @").into_owned()
}

/// Escape every `%` not already escaped
pub fn escape_percent(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;
    for (pos, _) in text.match_indices('%') {
        if !is_escaped(bytes, pos) {
            output.push_str(&text[cursor..pos]);
            output.push_str("\\%");
            cursor = pos + 1;
        }
    }
    output.push_str(&text[cursor..]);
    output
}

/// Undo normalization and repair translator artifacts on a reassembled document.
///
/// `normalized` is the record produced when the source was normalized; its
/// text is not used.
pub fn finalize(text: &str, normalizer: &Normalizer, normalized: &Normalized) -> String {
    let text = normalizer.restore_specials(text);
    let text = restore_accents(&text, &normalized.accents);
    let text = normalizer.restore_private_blocks(&text, &normalized.private_blocks);
    let text = repair_bibliography(&text);
    let text = dedup_bibliography(&text);
    let text = repair_color_models(&text);
    escape_percent(&text)
}
