/*!
 * Splitting long text runs into engine-sized chunks.
 *
 * Boundaries are tried from coarse to fine: section commands, blank lines,
 * sentence ends, and finally a hard cut. A coarser level is refined only
 * for the pieces that still exceed the limit. Each chunk carries the
 * whitespace that followed it, so concatenating `text + separator` over all
 * chunks reproduces the input exactly.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

static SECTION_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(?:part|chapter|section|subsection|subsubsection)\*?\{").expect("section pattern")
});

static BLANK_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n\s*").expect("blank line pattern"));

static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?](\s+)|[。！？](\s*)").expect("sentence pattern"));

/// A piece of text and the whitespace that followed it in the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub separator: String,
}

/// Rejoin processed chunk texts with the original separators
pub fn join_chunks(texts: &[String], chunks: &[Chunk]) -> String {
    let mut output = String::new();
    for (text, chunk) in texts.iter().zip(chunks) {
        output.push_str(text);
        output.push_str(&chunk.separator);
    }
    output
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    Sections,
    Paragraphs,
    Sentences,
    Hard,
}

impl Level {
    fn finer(self) -> Self {
        match self {
            Self::Sections => Self::Paragraphs,
            Self::Paragraphs => Self::Sentences,
            Self::Sentences | Self::Hard => Self::Hard,
        }
    }
}

/// Content range and the separator range right after it
type Piece = (Range<usize>, Range<usize>);

/// Splits text at safe boundaries, never inside a placeholder or escape token
#[derive(Debug, Clone)]
pub struct Chunker {
    token_pattern: Regex,
}

impl Chunker {
    pub fn new(math_code: &str) -> Self {
        let code = regex::escape(math_code);
        Self {
            token_pattern: Regex::new(&format!(r"(?i){}(?:\s*_\s*\d+|[A-Z]+\d*)?", code))
                .expect("token pattern is valid"),
        }
    }

    /// Split `text` into chunks whose `measure` does not exceed `max_size`.
    ///
    /// A single token longer than `max_size` is kept whole.
    pub fn split(&self, text: &str, max_size: usize, measure: impl Fn(&str) -> usize) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        if text.is_empty() {
            return chunks;
        }
        self.split_into(text, Level::Sections, max_size.max(1), &measure, &mut chunks);
        chunks
    }

    fn split_into(
        &self,
        text: &str,
        level: Level,
        max_size: usize,
        measure: &dyn Fn(&str) -> usize,
        out: &mut Vec<Chunk>,
    ) {
        if measure(text) <= max_size {
            out.push(Chunk {
                text: text.to_string(),
                separator: String::new(),
            });
            return;
        }
        if level == Level::Hard {
            self.hard_cut(text, max_size, measure, out);
            return;
        }

        let pieces = pieces(text, level);
        if pieces.len() <= 1 {
            self.split_into(text, level.finer(), max_size, measure, out);
            return;
        }

        // Greedy packing of consecutive pieces
        let mut current: Option<(usize, usize, Range<usize>)> = None;
        for (content, separator) in pieces {
            if let Some((start, end, current_sep)) = current.take() {
                if measure(&text[start..content.end]) <= max_size {
                    current = Some((start, content.end, separator));
                    continue;
                }
                out.push(Chunk {
                    text: text[start..end].to_string(),
                    separator: text[current_sep].to_string(),
                });
            }

            if measure(&text[content.clone()]) <= max_size {
                current = Some((content.start, content.end, separator));
            } else {
                self.split_into(&text[content], level.finer(), max_size, measure, out);
                if let Some(last) = out.last_mut() {
                    last.separator.push_str(&text[separator]);
                }
            }
        }
        if let Some((start, end, separator)) = current {
            out.push(Chunk {
                text: text[start..end].to_string(),
                separator: text[separator].to_string(),
            });
        }
    }

    fn hard_cut(&self, text: &str, max_size: usize, measure: &dyn Fn(&str) -> usize, out: &mut Vec<Chunk>) {
        let tokens: Vec<Range<usize>> = self.token_pattern.find_iter(text).map(|m| m.range()).collect();
        let mut rest_start = 0;

        while rest_start < text.len() {
            let rest = &text[rest_start..];
            if measure(rest) <= max_size {
                out.push(Chunk {
                    text: rest.to_string(),
                    separator: String::new(),
                });
                break;
            }

            let bounds: Vec<usize> = rest
                .char_indices()
                .map(|(i, _)| i)
                .skip(1)
                .chain(std::iter::once(rest.len()))
                .collect();
            let (mut lo, mut hi) = (0, bounds.len());
            while lo < hi {
                let mid = (lo + hi) / 2;
                if measure(&rest[..bounds[mid]]) <= max_size {
                    lo = mid + 1;
                } else {
                    hi = mid;
                }
            }
            let mut cut = bounds[lo.saturating_sub(1)];

            if let Some(space) = rest[..cut].rfind(char::is_whitespace) {
                if space > 0 {
                    cut = space;
                }
            }

            let absolute = rest_start + cut;
            if let Some(token) = tokens.iter().find(|t| t.start < absolute && absolute < t.end) {
                cut = if token.start > rest_start {
                    token.start - rest_start
                } else {
                    token.end - rest_start
                };
            }

            let after = &rest[cut..];
            let space_len = after.len() - after.trim_start().len();
            out.push(Chunk {
                text: rest[..cut].to_string(),
                separator: after[..space_len].to_string(),
            });
            rest_start += cut + space_len;
        }
    }
}

/// Cut `text` at the boundaries of `level`
fn pieces(text: &str, level: Level) -> Vec<Piece> {
    let separators: Vec<Range<usize>> = match level {
        Level::Sections => SECTION_MARKER
            .find_iter(text)
            .filter(|m| m.start() > 0)
            .map(|m| {
                let before = &text[..m.start()];
                before.trim_end().len()..m.start()
            })
            .collect(),
        Level::Paragraphs => BLANK_LINE.find_iter(text).map(|m| m.range()).collect(),
        Level::Sentences => SENTENCE_END
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).map(|m| m.range()))
            .collect(),
        Level::Hard => Vec::new(),
    };

    let mut pieces = Vec::new();
    let mut previous = 0;
    for separator in separators {
        if separator.start <= previous {
            continue;
        }
        pieces.push((previous..separator.start, separator.clone()));
        previous = separator.end;
    }
    if previous < text.len() {
        pieces.push((previous..text.len(), text.len()..text.len()));
    }
    pieces
}
