/*!
 * Document-level normalization before translation, and its inverse.
 *
 * Normalization runs once per document in this order:
 * 1. strip `%` comments
 * 2. rewrite `\mathbf` as `\boldsymbol`
 * 3. drop `\bibinfo{note}{...}`
 * 4. expand user macros
 * 5. fold `\makeatletter ... \makeatother` blocks into opaque tokens
 * 6. replace accent commands by precomposed characters
 * 7. replace escaped specials (`\%`, `\&`, `\\`, ...) by escape tokens
 */

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::{BTreeSet, HashMap};

use super::scan::{find_group_end, is_escaped, letters_end, parse_arguments, skip_inline_space, ArgKind};

/// Upper bound on macro expansion passes over a text segment
const MAX_EXPANSION_PASSES: usize = 8;

/// Escaped specials and the suffix of their escape token
const SPECIALS: &[(char, &str)] = &[
    ('\\', "BS"),
    ('%', "PCT"),
    ('&', "AMP"),
    ('#', "HASH"),
    ('$', "DOLLAR"),
    ('_', "US"),
];

/// Accent command, base letters and their precomposed forms (same order)
const ACCENTS: &[(&str, &str, &str)] = &[
    ("'", "aeiouyAEIOUYcnszCNSZ", "áéíóúýÁÉÍÓÚÝćńśźĆŃŚŹ"),
    ("`", "aeiouAEIOU", "àèìòùÀÈÌÒÙ"),
    ("^", "aeiouAEIOU", "âêîôûÂÊÎÔÛ"),
    ("\"", "aeiouyAEIOU", "äëïöüÿÄËÏÖÜ"),
    ("~", "anoANO", "ãñõÃÑÕ"),
    ("=", "aeiouAEIOU", "āēīōūĀĒĪŌŪ"),
    (".", "zZeE", "żŻėĖ"),
    ("c", "cCsS", "çÇşŞ"),
    ("v", "cCsSzZrRnNeE", "čČšŠžŽřŘňŇěĚ"),
    ("u", "aAgG", "ăĂğĞ"),
    ("H", "oOuU", "őŐűŰ"),
    ("k", "aAeE", "ąĄęĘ"),
    ("r", "uUaA", "ůŮåÅ"),
];

/// Dotless-i forms, written `\'\i` or `\'{\i}`
const DOTLESS_I: &[(&str, char)] = &[("'", 'í'), ("`", 'ì'), ("^", 'î'), ("\"", 'ï')];

static ACCENT_MAP: Lazy<HashMap<(String, String), char>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (accent, bases, composed) in ACCENTS {
        for (base, precomposed) in bases.chars().zip(composed.chars()) {
            map.insert((accent.to_string(), base.to_string()), precomposed);
        }
    }
    for (accent, precomposed) in DOTLESS_I {
        map.insert((accent.to_string(), "\\i".to_string()), *precomposed);
    }
    map
});

static REVERSE_ACCENT_MAP: Lazy<HashMap<char, String>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (accent, bases, composed) in ACCENTS {
        for (base, precomposed) in bases.chars().zip(composed.chars()) {
            map.insert(precomposed, format!("\\{}{{{}}}", accent, base));
        }
    }
    map
});

// `{\'e}` as a whole group
static ACCENT_GROUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{\\(['`^"~=.])\s*(\\i|[A-Za-z])\}"#).expect("accent group pattern")
});

// `\'{e}`, `\c{c}`
static ACCENT_BRACED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\\(['`^"~=.]|[cvuHkr])\{\s*(\\i|[A-Za-z])\s*\}"#).expect("accent braced pattern")
});

// `\'e`, `\"\i`
static ACCENT_BARE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\\(['`^"~=.])(\\i\b|[A-Za-z])"#).expect("accent bare pattern")
});

static MATHBF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\mathbf\b").expect("mathbf pattern"));

static PRIVATE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\\makeatletter.*?\\makeatother").expect("makeatletter pattern")
});

static THEOREM_DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(?:newtheorem\*?|declaretheorem(?:\[[^\]]*\])?)\s*\{\s*([A-Za-z]+\*?)\s*\}")
        .expect("theorem pattern")
});

const BEGIN_DOCUMENT: &str = "\\begin{document}";
const END_DOCUMENT: &str = "\\end{document}";

/// Result of normalizing a document
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// Normalized text
    pub text: String,
    /// Private-command blocks, indexed by their token number
    pub private_blocks: Vec<String>,
    /// Precomposed characters that came from accent commands and never
    /// appeared literally in the input
    pub accents: BTreeSet<char>,
}

/// A document split at its body delimiters
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentParts {
    /// Everything up to and including `\begin{document}`
    pub preamble: String,
    pub body: String,
    /// `\end{document}` and everything after it
    pub postamble: String,
}

/// Rewrites documents before translation and undoes the token substitutions afterwards
#[derive(Debug, Clone)]
pub struct Normalizer {
    math_code: String,
    block_pattern: Regex,
    special_pattern: Regex,
}

impl Normalizer {
    pub fn new(math_code: &str) -> Self {
        let code = regex::escape(math_code);
        let suffixes: Vec<&str> = SPECIALS.iter().map(|(_, suffix)| *suffix).collect();
        Self {
            math_code: math_code.to_string(),
            block_pattern: Regex::new(&format!(r"{}ATBLOCK(\d+)", code))
                .expect("block token pattern is valid"),
            special_pattern: Regex::new(&format!(r"(?i)( ?){} ?({})([0-3])?( ?)", code, suffixes.join("|")))
                .expect("special token pattern is valid"),
        }
    }

    /// Run every normalization step in order
    pub fn normalize(&self, text: &str) -> Normalized {
        let text = strip_comments(text);
        let text = MATHBF.replace_all(&text, r"\boldsymbol").into_owned();
        let text = remove_bibnotes(&text);
        let text = expand_macros(&text);
        let (text, private_blocks) = self.fold_private_blocks(&text);
        let accented = replace_accents(&text);
        let accents = introduced_accents(&text, &accented);
        let text = self.replace_specials(&accented);
        Normalized {
            text,
            private_blocks,
            accents,
        }
    }

    /// Replace each `\makeatletter ... \makeatother` block with an opaque token
    pub fn fold_private_blocks(&self, text: &str) -> (String, Vec<String>) {
        let mut blocks = Vec::new();
        let folded = PRIVATE_BLOCK
            .replace_all(text, |caps: &Captures| {
                blocks.push(caps[0].to_string());
                format!("{}ATBLOCK{}", self.math_code, blocks.len() - 1)
            })
            .into_owned();
        if !blocks.is_empty() {
            debug!("Folded {} makeatletter blocks", blocks.len());
        }
        (folded, blocks)
    }

    /// Put private-command blocks back
    pub fn restore_private_blocks(&self, text: &str, blocks: &[String]) -> String {
        self.block_pattern
            .replace_all(text, |caps: &Captures| {
                let index = caps[1].parse::<usize>().ok();
                match index.and_then(|i| blocks.get(i)) {
                    Some(block) => block.clone(),
                    None => {
                        warn!("Unknown makeatletter token '{}'", &caps[0]);
                        String::new()
                    }
                }
            })
            .into_owned()
    }

    /// Replace escaped specials with escape tokens.
    ///
    /// A token is padded with a space on each side that touches other text,
    /// and the trailing digit records which pads were added (bit 0 left,
    /// bit 1 right) so `restore_specials` removes exactly those.
    pub fn replace_specials(&self, text: &str) -> String {
        let mut output = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '\\' {
                output.push(c);
                continue;
            }
            let Some(&next) = chars.peek() else {
                output.push(c);
                break;
            };
            chars.next();
            match SPECIALS.iter().find(|(special, _)| *special == next) {
                Some((_, suffix)) => {
                    let pad_left = output.chars().last().is_some_and(|last| !last.is_whitespace());
                    let pad_right = chars.peek().is_some_and(|after| !after.is_whitespace());
                    if pad_left {
                        output.push(' ');
                    }
                    output.push_str(&self.math_code);
                    output.push_str(suffix);
                    output.push_str(&(u8::from(pad_left) | (u8::from(pad_right) << 1)).to_string());
                    if pad_right {
                        output.push(' ');
                    }
                }
                None => {
                    output.push(c);
                    output.push(next);
                }
            }
        }
        output
    }

    /// Turn escape tokens back into escaped specials, dropping only the pads
    /// `replace_specials` added. A token whose pad digit was lost keeps the
    /// whitespace around it.
    pub fn restore_specials(&self, text: &str) -> String {
        self.special_pattern
            .replace_all(text, |caps: &Captures| {
                let suffix = caps[2].to_uppercase();
                let pads = caps.get(3).and_then(|m| m.as_str().parse::<u8>().ok()).unwrap_or(0);
                let Some((special, _)) = SPECIALS.iter().find(|(_, s)| *s == suffix) else {
                    return caps[0].to_string();
                };
                let left = if pads & 1 == 1 { "" } else { &caps[1] };
                let right = if pads & 2 == 2 { "" } else { &caps[4] };
                format!("{}\\{}{}", left, special, right)
            })
            .into_owned()
    }
}

/// Remove `%` comments, keeping escaped `\%`.
///
/// Lines that held nothing but a comment are removed entirely so they do
/// not turn into paragraph breaks.
pub fn strip_comments(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let bytes = line.as_bytes();
        let comment = (0..bytes.len()).find(|&i| bytes[i] == b'%' && !is_escaped(bytes, i));
        match comment {
            None => output.push_str(line),
            Some(pos) => {
                let kept = &line[..pos];
                if kept.trim().is_empty() {
                    continue;
                }
                output.push_str(kept);
                if line.ends_with('\n') {
                    output.push('\n');
                }
            }
        }
    }
    output
}

/// Drop `\bibinfo{note}{...}`, which xelatex chokes on
pub fn remove_bibnotes(text: &str) -> String {
    const MARKER: &str = "\\bibinfo{note}";
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some(found) = text[cursor..].find(MARKER) {
        let start = cursor + found;
        let open = skip_inline_space(text, start + MARKER.len());
        let end = if text.as_bytes().get(open) == Some(&b'{') {
            find_group_end(text, open).map(|close| close + 1)
        } else {
            None
        };
        output.push_str(&text[cursor..start]);
        match end {
            Some(end) => cursor = end,
            None => {
                output.push_str(MARKER);
                cursor = start + MARKER.len();
            }
        }
    }
    output.push_str(&text[cursor..]);
    output
}

/// A user macro definition
#[derive(Debug, Clone, PartialEq)]
struct MacroDefinition {
    name: String,
    params: usize,
    default: Option<String>,
    body: String,
    start: usize,
    end: usize,
}

impl MacroDefinition {
    fn is_self_recursive(&self) -> bool {
        let call = format!("\\{}", self.name);
        self.body.match_indices(&call).any(|(pos, _)| {
            let after = pos + call.len();
            !self.body[after..].starts_with(|c: char| c.is_ascii_alphabetic())
        })
    }
}

/// Parse `\newcommand{\name}[n][default]{body}` (and friends) or `\def\name#1{body}` at `pos`
fn parse_definition(text: &str, pos: usize) -> Option<MacroDefinition> {
    let bytes = text.as_bytes();
    let keyword_end = letters_end(text, pos + 1);
    let keyword = &text[pos + 1..keyword_end];
    let mut i = keyword_end;

    match keyword {
        "newcommand" | "renewcommand" | "providecommand" => {
            if bytes.get(i) == Some(&b'*') {
                i += 1;
            }
            i = skip_inline_space(text, i);
            let braced = bytes.get(i) == Some(&b'{');
            let name_start = if braced { skip_inline_space(text, i + 1) } else { i };
            if bytes.get(name_start) != Some(&b'\\') {
                return None;
            }
            let name_end = letters_end(text, name_start + 1);
            if name_end == name_start + 1 {
                return None;
            }
            let name = text[name_start + 1..name_end].to_string();
            i = if braced {
                let close = find_group_end(text, i)?;
                if text[name_end..close].trim() != "" {
                    return None;
                }
                close + 1
            } else {
                name_end
            };

            let (args, _, truncated) = parse_arguments(text, i, true);
            if truncated {
                return None;
            }
            let mut params = 0;
            let mut default = None;
            let mut body = None;
            let mut end = i;
            for (n, arg) in args.iter().enumerate() {
                match (arg.kind, n) {
                    (ArgKind::Bracket, 0) => params = text[arg.inner()].trim().parse().ok()?,
                    (ArgKind::Bracket, 1) => default = Some(text[arg.inner()].to_string()),
                    (ArgKind::Brace, _) => {
                        body = Some(text[arg.inner()].to_string());
                        end = arg.close + 1;
                        break;
                    }
                    _ => return None,
                }
            }
            Some(MacroDefinition {
                name,
                params,
                default,
                body: body?,
                start: pos,
                end,
            })
        }
        "def" => {
            if bytes.get(i) != Some(&b'\\') {
                return None;
            }
            let name_end = letters_end(text, i + 1);
            if name_end == i + 1 || bytes.get(name_end) == Some(&b'@') {
                return None;
            }
            let name = text[i + 1..name_end].to_string();
            let mut j = name_end;
            let mut params = 0;
            while bytes.get(j) == Some(&b'#') {
                let digit = bytes.get(j + 1).filter(|b| b.is_ascii_digit())?;
                if usize::from(digit - b'0') != params + 1 {
                    return None;
                }
                params += 1;
                j += 2;
            }
            if bytes.get(j) != Some(&b'{') {
                return None;
            }
            let close = find_group_end(text, j)?;
            Some(MacroDefinition {
                name,
                params,
                default: None,
                body: text[j + 1..close].to_string(),
                start: pos,
                end: close + 1,
            })
        }
        _ => None,
    }
}

fn find_definitions(text: &str) -> Vec<MacroDefinition> {
    let mut definitions = Vec::new();
    let mut i = 0;
    while let Some(found) = text[i..].find('\\') {
        let pos = i + found;
        match parse_definition(text, pos) {
            Some(definition) => {
                i = definition.end;
                definitions.push(definition);
            }
            None => i = pos + 1,
        }
    }
    definitions
}

fn substitute_params(body: &str, args: &[String]) -> String {
    let mut output = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '#' {
            if let Some(index) = chars.peek().and_then(|d| d.to_digit(10)).filter(|&d| d >= 1) {
                if let Some(arg) = args.get(index as usize - 1) {
                    chars.next();
                    output.push_str(arg);
                    continue;
                }
            }
        }
        output.push(c);
    }
    output
}

/// One expansion pass over a segment; returns the new text and whether anything changed
fn expand_once(segment: &str, macros: &HashMap<String, MacroDefinition>) -> (String, bool) {
    let bytes = segment.as_bytes();
    let mut output = String::with_capacity(segment.len());
    let mut cursor = 0;
    let mut changed = false;
    let mut i = 0;

    while let Some(found) = segment[i..].find('\\') {
        let pos = i + found;
        let name_end = letters_end(segment, pos + 1);
        if name_end == pos + 1 {
            i = pos + 2;
            continue;
        }
        i = name_end;
        let Some(definition) = macros.get(&segment[pos + 1..name_end]) else { continue };

        let mut args = Vec::with_capacity(definition.params);
        let mut end = name_end;
        if definition.params > 0 {
            let mut next = skip_inline_space(segment, end);
            if let Some(default) = &definition.default {
                if bytes.get(next) == Some(&b'[') {
                    let Some(close) = find_group_end(segment, next) else { continue };
                    args.push(segment[next + 1..close].to_string());
                    end = close + 1;
                    next = end;
                } else {
                    args.push(default.clone());
                }
            }
            while args.len() < definition.params {
                if bytes.get(next) != Some(&b'{') {
                    break;
                }
                let Some(close) = find_group_end(segment, next) else { break };
                args.push(segment[next + 1..close].to_string());
                end = close + 1;
                next = end;
            }
            if args.len() < definition.params {
                continue;
            }
        } else if bytes.get(end) == Some(&b'{') && segment.get(end..end + 2) == Some("{}") {
            // `\name{}` is the usual way to keep the following space
            end += 2;
        }

        output.push_str(&segment[cursor..pos]);
        output.push_str(&substitute_params(&definition.body, &args));
        cursor = end;
        i = end;
        changed = true;
    }
    output.push_str(&segment[cursor..]);
    (output, changed)
}

fn expand_segment(segment: &str, macros: &HashMap<String, MacroDefinition>) -> String {
    let mut current = segment.to_string();
    for _ in 0..MAX_EXPANSION_PASSES {
        let (next, changed) = expand_once(&current, macros);
        current = next;
        if !changed {
            break;
        }
    }
    current
}

/// Expand user macros outside their own definitions
pub fn expand_macros(text: &str) -> String {
    let definitions = find_definitions(text);
    if definitions.is_empty() {
        return text.to_string();
    }

    let mut macros = HashMap::new();
    for definition in &definitions {
        if definition.is_self_recursive() {
            debug!("Skipping self-recursive macro \\{}", definition.name);
            macros.remove(&definition.name);
            continue;
        }
        macros.insert(definition.name.clone(), definition.clone());
    }
    debug!("Expanding {} user macros", macros.len());

    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;
    for definition in &definitions {
        output.push_str(&expand_segment(&text[cursor..definition.start], &macros));
        output.push_str(&text[definition.start..definition.end]);
        cursor = definition.end;
    }
    output.push_str(&expand_segment(&text[cursor..], &macros));
    output
}

/// Replace accent commands by precomposed characters where the table knows them
pub fn replace_accents(text: &str) -> String {
    let lookup = |caps: &Captures| -> String {
        ACCENT_MAP
            .get(&(caps[1].to_string(), caps[2].to_string()))
            .map(|c| c.to_string())
            .unwrap_or_else(|| caps[0].to_string())
    };
    let text = ACCENT_GROUP.replace_all(text, lookup);
    let text = ACCENT_BRACED.replace_all(&text, lookup);
    ACCENT_BARE.replace_all(&text, lookup).into_owned()
}

/// Accented characters present in `accented` but not in `original`
pub fn introduced_accents(original: &str, accented: &str) -> BTreeSet<char> {
    let literal: BTreeSet<char> = original.chars().filter(|c| REVERSE_ACCENT_MAP.contains_key(c)).collect();
    accented
        .chars()
        .filter(|c| REVERSE_ACCENT_MAP.contains_key(c) && !literal.contains(c))
        .collect()
}

/// Turn the given precomposed characters back into accent commands.
///
/// Characters outside `accents` stay as they are, so UTF-8 text the author
/// wrote (file names included) is never rewritten.
pub fn restore_accents(text: &str, accents: &BTreeSet<char>) -> String {
    if accents.is_empty() {
        return text.to_string();
    }
    let mut output = String::with_capacity(text.len());
    for c in text.chars() {
        match REVERSE_ACCENT_MAP.get(&c).filter(|_| accents.contains(&c)) {
            Some(command) => output.push_str(command),
            None => output.push(c),
        }
    }
    output
}

/// A document is complete when it carries both body delimiters
pub fn is_complete(text: &str) -> bool {
    text.contains(BEGIN_DOCUMENT) && text.contains(END_DOCUMENT)
}

/// Split a complete document into preamble, body and postamble
pub fn split_document(text: &str) -> Option<DocumentParts> {
    let begin = text.find(BEGIN_DOCUMENT)? + BEGIN_DOCUMENT.len();
    let end = text.rfind(END_DOCUMENT)?;
    if end < begin {
        return None;
    }
    Some(DocumentParts {
        preamble: text[..begin].to_string(),
        body: text[begin..end].to_string(),
        postamble: text[end..].to_string(),
    })
}

/// Names of theorem-like environments declared in the document
pub fn detect_theorems(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in THEOREM_DECLARATION.captures_iter(text) {
        let name = caps[1].trim_end_matches('*').to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    if !names.is_empty() {
        info!("Detected theorem environments: {}", names.join(", "));
    }
    names
}

/// Drop blank lines from a preamble
pub fn remove_blank_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn has_package(preamble: &str, package: &str) -> bool {
    let pattern = format!(r"\\usepackage\s*(?:\[[^\]]*\])?\s*\{{[^}}]*\b{}\b", regex::escape(package));
    Regex::new(&pattern).map(|re| re.is_match(preamble)).unwrap_or(false)
}

/// Insert missing packages right after the `\documentclass` line
pub fn insert_packages(preamble: &str, packages: &[&str]) -> String {
    let missing: Vec<String> = packages
        .iter()
        .filter(|package| !has_package(preamble, package))
        .map(|package| format!("\\usepackage{{{}}}", package))
        .collect();
    if missing.is_empty() {
        return preamble.to_string();
    }
    let insertion = missing.join("\n");

    match preamble.find("\\documentclass") {
        Some(start) => {
            let line_end = preamble[start..]
                .find('\n')
                .map(|i| start + i + 1)
                .unwrap_or(preamble.len());
            let mut output = preamble[..line_end].to_string();
            if !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&insertion);
            output.push('\n');
            output.push_str(&preamble[line_end..]);
            output
        }
        None => format!("{}\n{}", insertion, preamble),
    }
}

/// Rejoin hard-wrapped lines of prose into single lines.
///
/// A line is joined to the previous one when both are prose, that is hold
/// text and do not start with a command.
pub fn connect_paragraphs(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut previous_is_prose = false;
    for (n, line) in text.split('\n').enumerate() {
        let trimmed = line.trim_start();
        let is_prose = !trimmed.is_empty() && !trimmed.starts_with('\\');
        if n > 0 {
            if previous_is_prose && is_prose {
                output.push(' ');
                output.push_str(trimmed);
                continue;
            }
            output.push('\n');
        }
        output.push_str(line);
        previous_is_prose = is_prose;
    }
    output
}

/// Preamble wrapped around incomplete documents
pub fn default_preamble(cjk: bool) -> String {
    let mut preamble = String::from("\\documentclass[UTF8]{article}\n");
    if cjk {
        preamble.push_str("\\usepackage{xeCJK}\n");
    }
    preamble.push_str("\\usepackage{amsmath,amssymb}\n\\begin{document}\n");
    preamble
}

/// Postamble wrapped around incomplete documents
pub fn default_postamble() -> String {
    format!("\n{}\n", END_DOCUMENT)
}
