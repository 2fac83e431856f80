/*!
 * Protection and recovery of non-translatable spans.
 *
 * `protect` replaces every piece of markup in a text run (commands,
 * environments, math, bare brace groups and escape tokens) with a numbered
 * placeholder so that only prose reaches a translator. `recover` puts the
 * original spans back, tolerating the case and whitespace drift that
 * translation engines introduce around placeholders.
 */

use log::{debug, warn};
use regex::Regex;
use std::collections::HashSet;

use crate::app_config::StructureConfig;
use crate::errors::LatexError;

use super::scan::{
    char_len_at, find_delimited_end, find_group_end, letters_end, parse_arguments, parse_command,
    parse_environment, read_env_name, skip_inline_space, ArgKind,
};

/// What kind of markup a protected span holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    /// `\name[opt]{arg}` or a control symbol
    Command,
    /// `\begin{name} ... \end{name}`
    Environment,
    /// Inline or display math
    Math,
    /// A bare `{...}` group not attached to a command
    Group,
    /// An escape token produced by normalization
    Escape,
}

/// An excised run of markup and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct ProtectedSpan {
    /// Ordinal index, unique within the text run
    pub index: usize,
    pub kind: SpanKind,
    /// Exact original text
    pub original: String,
    /// Byte offset of the span in the unprotected text
    pub position: usize,
    /// A space was inserted before the placeholder
    pub pad_left: bool,
    /// A space was inserted after the placeholder
    pub pad_right: bool,
}

/// Result of `protect`
#[derive(Debug, Clone, PartialEq)]
pub struct ProtectedText {
    /// Text with placeholders in place of spans
    pub text: String,
    /// Spans ordered by index (which is also position order)
    pub spans: Vec<ProtectedSpan>,
}

/// Result of `recover`
#[derive(Debug, Clone, PartialEq)]
pub struct Recovery {
    pub text: String,
    /// Spans not cleanly recovered
    pub bad: usize,
    /// Spans extracted
    pub total: usize,
    /// Indices of the spans whose placeholder was lost
    pub lost: Vec<usize>,
}

/// A pair of math delimiters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathDelimiter {
    pub open: String,
    pub close: String,
}

impl MathDelimiter {
    fn new(open: &str, close: &str) -> Self {
        Self {
            open: open.to_string(),
            close: close.to_string(),
        }
    }
}

/// Classification of markup for one translation run.
///
/// A value of this type is threaded through every call; per-paragraph
/// discoveries go into a copy, never into a shared instance.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Commands never translated
    pub skip_commands: HashSet<String>,
    /// Environments never translated
    pub skip_environments: HashSet<String>,
    /// Math delimiters, longest opener first
    pub math_delimiters: Vec<MathDelimiter>,
    /// Formatting commands unwrapped before protection
    pub format_commands: Vec<String>,
    /// Bare words treated as commands when followed by a brace group
    pub protected_words: HashSet<String>,
    math_code: String,
    placeholder_pattern: Regex,
    escape_pattern: Regex,
    discovery_pattern: Regex,
}

impl Classification {
    /// Classification with the built-in lists and the given placeholder stem
    pub fn new(math_code: &str) -> Self {
        Self::from_structure(&StructureConfig {
            math_code: math_code.to_string(),
            ..StructureConfig::default()
        })
    }

    /// Build a classification from the configured structure lists
    pub fn from_structure(structure: &StructureConfig) -> Self {
        let code = regex::escape(&structure.math_code);
        Self {
            skip_commands: structure.skip_commands.iter().cloned().collect(),
            skip_environments: structure.skip_environments.iter().cloned().collect(),
            math_delimiters: vec![
                MathDelimiter::new("$$", "$$"),
                MathDelimiter::new("$", "$"),
                MathDelimiter::new("\\[", "\\]"),
                MathDelimiter::new("\\(", "\\)"),
            ],
            format_commands: structure.format_commands.clone(),
            protected_words: HashSet::new(),
            math_code: structure.math_code.clone(),
            placeholder_pattern: Regex::new(&format!(r"(?i){}\s*_\s*(\d+)", code))
                .expect("placeholder pattern is valid"),
            escape_pattern: Regex::new(&format!(r"^{}[A-Z]+\d*", code))
                .expect("escape pattern is valid"),
            discovery_pattern: Regex::new(&format!(r"{}[A-Z]+\d*\s+([A-Za-z]+)\s*\{{", code))
                .expect("discovery pattern is valid"),
        }
    }

    /// Placeholder stem
    pub fn math_code(&self) -> &str {
        &self.math_code
    }

    /// Placeholder token for a span index
    pub fn placeholder(&self, index: usize) -> String {
        format!("{}_{}", self.math_code, index)
    }

    /// Escape token used for a `\\` line break
    pub fn line_break_token(&self) -> String {
        format!("{}BS", self.math_code)
    }

    /// Pattern matching placeholders with case and whitespace drift
    pub fn placeholder_pattern(&self) -> &Regex {
        &self.placeholder_pattern
    }

    pub fn is_skip_command(&self, name: &str) -> bool {
        self.skip_commands.contains(name)
    }

    pub fn is_skip_environment(&self, name: &str) -> bool {
        self.skip_environments.contains(name.trim_end_matches('*'))
    }

    /// Copy of this classification that also protects bare words following
    /// escape tokens in `text` (e.g. `XMATHXBS bibliographystyle{plain}`).
    pub fn with_discovered_words(&self, text: &str) -> Classification {
        let discovered: Vec<String> = self
            .discovery_pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .filter(|word| !self.protected_words.contains(word))
            .collect();

        let mut local = self.clone();
        for word in discovered {
            debug!("Protecting bare word '{}' for this paragraph", word);
            local.protected_words.insert(word);
        }
        local
    }

    /// Offset one past the math span opening at `pos`, if any
    pub fn math_end(&self, text: &str, pos: usize) -> Option<usize> {
        let rest = &text[pos..];
        let delimiter = self
            .math_delimiters
            .iter()
            .find(|delimiter| rest.starts_with(delimiter.open.as_str()))?;
        find_delimited_end(text, pos, &delimiter.open, &delimiter.close)
    }

    /// Offset one past the escape token starting at `pos`, if any
    fn escape_end(&self, text: &str, pos: usize) -> Option<usize> {
        if !text[pos..].starts_with(self.math_code.as_str()) {
            return None;
        }
        let found = self.escape_pattern.find(&text[pos..])?;
        let end = pos + found.end();
        // A line break may carry a spacing argument, e.g. `\\[2pt]`
        if found.as_str().trim_end_matches(|c: char| c.is_ascii_digit()) == self.line_break_token() {
            let next = skip_inline_space(text, end);
            if text.as_bytes().get(next) == Some(&b'[') {
                if let Some(close) = find_group_end(text, next) {
                    return Some(close + 1);
                }
            }
        }
        Some(end)
    }
}

impl Default for Classification {
    fn default() -> Self {
        Self::from_structure(&StructureConfig::default())
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

fn at_word_start(text: &str, pos: usize) -> bool {
    text[..pos].chars().next_back().is_none_or(|c| !is_word_char(c))
}

/// Discover all protectable spans in `text` by a single left-to-right scan.
///
/// Returns `(start, end, kind)` triples in ascending, non-overlapping order.
fn discover_spans(text: &str, classification: &Classification) -> Vec<(usize, usize, SpanKind)> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if matches!(bytes[i], b'$' | b'\\') {
            if let Some(end) = classification.math_end(text, i) {
                found.push((i, end, SpanKind::Math));
                i = end;
                continue;
            }
        }

        match bytes[i] {
            b'\\' => {
                if let Some(env) = parse_environment(text, i) {
                    found.push((i, env.end, SpanKind::Environment));
                    i = env.end;
                    continue;
                }
                if let Some(cmd) = parse_command(text, i) {
                    let end = if cmd.name == "begin" || cmd.name == "end" {
                        if cmd.name == "begin" {
                            warn!("Unmatched environment opening at byte {}, protecting the header only", i);
                        }
                        read_env_name(text, letters_end(text, i + 1))
                            .map(|(_, end)| end)
                            .unwrap_or(cmd.end)
                    } else {
                        if cmd.truncated {
                            warn!("Unbalanced argument after \\{} at byte {}", cmd.name, i);
                        }
                        cmd.end
                    };
                    found.push((i, end, SpanKind::Command));
                    i = end;
                    continue;
                }
                if i + 1 < bytes.len() {
                    let end = i + 1 + char_len_at(text, i + 1);
                    found.push((i, end, SpanKind::Command));
                    i = end;
                } else {
                    i += 1;
                }
                continue;
            }
            b'{' => {
                match find_group_end(text, i) {
                    Some(close) => {
                        found.push((i, close + 1, SpanKind::Group));
                        i = close + 1;
                    }
                    None => {
                        warn!("Unbalanced brace at byte {}, leaving it in place", i);
                        i += 1;
                    }
                }
                continue;
            }
            _ => {}
        }

        if at_word_start(text, i) {
            if let Some(end) = classification.escape_end(text, i) {
                found.push((i, end, SpanKind::Escape));
                i = end;
                continue;
            }
            if bytes[i].is_ascii_alphabetic() && !classification.protected_words.is_empty() {
                let word_end = letters_end(text, i);
                if classification.protected_words.contains(&text[i..word_end]) {
                    let (args, end, _) = parse_arguments(text, word_end, true);
                    if args.iter().any(|arg| arg.kind == ArgKind::Brace) {
                        found.push((i, end, SpanKind::Command));
                        i = end;
                        continue;
                    }
                }
            }
        }

        i += char_len_at(text, i).max(1);
    }

    found
}

/// Replace every protectable span in `text` with a placeholder.
///
/// Spans are discovered first, then substituted from the last to the first
/// so earlier offsets stay valid.
pub fn protect(text: &str, classification: &Classification) -> ProtectedText {
    let found = discover_spans(text, classification);
    let mut spans: Vec<ProtectedSpan> = found
        .into_iter()
        .enumerate()
        .map(|(index, (start, end, kind))| ProtectedSpan {
            index,
            kind,
            original: text[start..end].to_string(),
            position: start,
            pad_left: false,
            pad_right: false,
        })
        .collect();

    let mut surrogate = text.to_string();
    for span in spans.iter_mut().rev() {
        let start = span.position;
        let end = start + span.original.len();
        span.pad_left = surrogate[..start].chars().next_back().is_some_and(is_word_char);
        span.pad_right = surrogate[end..].chars().next().is_some_and(is_word_char);

        let mut replacement = String::new();
        if span.pad_left {
            replacement.push(' ');
        }
        replacement.push_str(&classification.placeholder(span.index));
        if span.pad_right {
            replacement.push(' ');
        }
        surrogate.replace_range(start..end, &replacement);
    }

    debug!("Protected {} spans", spans.len());
    ProtectedText {
        text: surrogate,
        spans,
    }
}

/// Substitute every recognizable placeholder in `text` by its span.
///
/// Returns the restored text and, per span, how many times it was inserted.
/// Placeholders with an unknown index are dropped.
pub fn restore_placeholders(
    text: &str,
    spans: &[ProtectedSpan],
    classification: &Classification,
) -> (String, Vec<usize>) {
    let mut uses = vec![0usize; spans.len()];
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;

    for caps in classification.placeholder_pattern().captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() < cursor {
            continue;
        }
        let mut segment = &text[cursor..whole.start()];
        let span = caps
            .get(1)
            .and_then(|digits| digits.as_str().parse::<usize>().ok())
            .and_then(|index| spans.get(index));

        match span {
            Some(span) => {
                if span.pad_left {
                    segment = segment.strip_suffix(' ').unwrap_or(segment);
                }
                output.push_str(segment);
                output.push_str(&span.original);
                cursor = whole.end();
                if span.pad_right && text[cursor..].starts_with(' ') {
                    cursor += 1;
                }
                uses[span.index] += 1;
            }
            None => {
                warn!("Dropping placeholder '{}' with no matching span", whole.as_str());
                output.push_str(segment);
                cursor = whole.end();
            }
        }
    }
    output.push_str(&text[cursor..]);

    (output, uses)
}

/// Put the original spans back into translated text.
///
/// Placeholders are matched case-insensitively and with whitespace drift.
/// A duplicated placeholder inserts its span again. A lost placeholder is
/// counted as bad and its span appended at the end of the text; with
/// `tolerant = false` a lost placeholder is an error instead.
pub fn recover(
    translated: &str,
    spans: &[ProtectedSpan],
    classification: &Classification,
    tolerant: bool,
) -> Result<Recovery, LatexError> {
    let (mut text, uses) = restore_placeholders(translated, spans, classification);

    let lost: Vec<usize> = uses
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(index, _)| index)
        .collect();

    if !lost.is_empty() {
        if !tolerant {
            return Err(LatexError::PlaceholderMismatch {
                bad: lost.len(),
                total: spans.len(),
            });
        }
        warn!(
            "{} of {} protected objects lost in translation, appending them",
            lost.len(),
            spans.len()
        );
        for &index in &lost {
            if !text.is_empty() && !text.ends_with(char::is_whitespace) {
                text.push(' ');
            }
            text.push_str(&spans[index].original);
        }
    }

    Ok(Recovery {
        text,
        bad: lost.len(),
        total: spans.len(),
        lost,
    })
}

/// Unwrap formatting-only commands such as `\textbf{...}`, keeping their content.
///
/// Math and skipped environments are copied verbatim.
pub fn strip_format_commands(text: &str, classification: &Classification) -> String {
    if classification.format_commands.is_empty() {
        return text.to_string();
    }

    let bytes = text.as_bytes();
    let mut output = String::with_capacity(text.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if matches!(bytes[i], b'$' | b'\\') {
            if let Some(end) = classification.math_end(text, i) {
                i = end;
                continue;
            }
        }
        if bytes[i] != b'\\' {
            i += 1;
            continue;
        }
        if let Some(env) = parse_environment(text, i) {
            if classification.is_skip_environment(&env.name) {
                i = env.end;
                continue;
            }
        }
        match parse_command(text, i) {
            Some(cmd)
                if !cmd.starred
                    && !cmd.truncated
                    && cmd.args.len() == 1
                    && cmd.args[0].kind == ArgKind::Brace
                    && classification.format_commands.iter().any(|name| *name == cmd.name) =>
            {
                output.push_str(&text[copied..i]);
                let inner = &text[cmd.args[0].inner()];
                output.push_str(&strip_format_commands(inner, classification));
                copied = cmd.end;
                i = cmd.end;
            }
            Some(cmd) => i = letters_end(text, cmd.start + 1),
            None => i += 1 + text[i + 1..].chars().next().map(char::len_utf8).unwrap_or(0),
        }
    }
    output.push_str(&text[copied..]);
    output
}
