/*!
 * Low-level scanning over LaTeX source.
 *
 * Everything here works on byte offsets into UTF-8 text. The delimiters
 * we care about are all ASCII, so a byte-level scan never splits a
 * multi-byte character as long as offsets are only taken at ASCII bytes.
 */

/// Kind of argument delimiter following a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// `{...}`
    Brace,
    /// `[...]`
    Bracket,
}

/// One argument of a command invocation, as byte offsets of its delimiters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpan {
    pub kind: ArgKind,
    /// Offset of the opening delimiter
    pub open: usize,
    /// Offset of the closing delimiter
    pub close: usize,
}

impl ArgSpan {
    /// Byte range of the argument content, delimiters excluded
    pub fn inner(&self) -> std::ops::Range<usize> {
        self.open + 1..self.close
    }
}

/// Extent of a command invocation such as `\section*[short]{Long title}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandExtent {
    /// Offset of the backslash
    pub start: usize,
    /// Command name without backslash or star
    pub name: String,
    pub starred: bool,
    pub args: Vec<ArgSpan>,
    /// Offset one past the last consumed byte
    pub end: usize,
    /// An argument opened but never closed; only the head was consumed
    pub truncated: bool,
}

impl CommandExtent {
    /// Brace-delimited arguments in order
    pub fn brace_args(&self) -> impl Iterator<Item = &ArgSpan> {
        self.args.iter().filter(|arg| arg.kind == ArgKind::Brace)
    }
}

/// Extent of `\begin{name} ... \end{name}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentExtent {
    pub start: usize,
    pub name: String,
    /// Offset right after the `\begin{name}` header and its adjacent arguments
    pub body_start: usize,
    /// Offset of the matching `\end`
    pub body_end: usize,
    /// Offset one past `\end{name}`
    pub end: usize,
}

/// Returns true when the byte at `pos` is preceded by an odd number of backslashes
pub fn is_escaped(bytes: &[u8], pos: usize) -> bool {
    let mut count = 0;
    let mut i = pos;
    while i > 0 && bytes[i - 1] == b'\\' {
        count += 1;
        i -= 1;
    }
    count % 2 == 1
}

/// Find the closing delimiter matching the opening one at `open`.
///
/// Braces are counted with nesting. For brackets, the first `]` outside any
/// brace group closes the argument. Escaped delimiters (`\{`, `\}`) are ignored.
pub fn find_group_end(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let opener = *bytes.get(open)?;
    let mut depth = 0usize;
    let mut i = open + 1;

    match opener {
        b'{' => {
            while i < bytes.len() {
                match bytes[i] {
                    b'\\' => {
                        i += 2;
                        continue;
                    }
                    b'{' => depth += 1,
                    b'}' => {
                        if depth == 0 {
                            return Some(i);
                        }
                        depth -= 1;
                    }
                    _ => {}
                }
                i += 1;
            }
            None
        }
        b'[' => {
            while i < bytes.len() {
                match bytes[i] {
                    b'\\' => {
                        i += 2;
                        continue;
                    }
                    b'{' => depth += 1,
                    b'}' => depth = depth.saturating_sub(1),
                    b']' if depth == 0 => return Some(i),
                    _ => {}
                }
                i += 1;
            }
            None
        }
        _ => None,
    }
}

/// Offset one past the ASCII letters starting at `pos`
pub fn letters_end(text: &str, pos: usize) -> usize {
    let bytes = text.as_bytes();
    let mut i = pos;
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        i += 1;
    }
    i
}

/// Skip spaces and tabs (never newlines)
pub fn skip_inline_space(text: &str, pos: usize) -> usize {
    let bytes = text.as_bytes();
    let mut i = pos;
    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    i
}

/// Parse the arguments following a command head ending at `pos`.
///
/// Returns the argument spans, the end offset and whether an argument was left open.
/// With `allow_space`, spaces and tabs may precede the first argument; later
/// arguments must follow each other directly.
pub fn parse_arguments(text: &str, pos: usize, allow_space: bool) -> (Vec<ArgSpan>, usize, bool) {
    let bytes = text.as_bytes();
    let mut args = Vec::new();
    let mut end = pos;

    loop {
        let next = if allow_space && args.is_empty() { skip_inline_space(text, end) } else { end };
        let kind = match bytes.get(next) {
            Some(b'{') => ArgKind::Brace,
            Some(b'[') => ArgKind::Bracket,
            _ => break,
        };
        match find_group_end(text, next) {
            Some(close) => {
                args.push(ArgSpan { kind, open: next, close });
                end = close + 1;
            }
            None => return (args, end, true),
        }
    }

    (args, end, false)
}

/// Parse a command invocation whose backslash sits at `start`.
///
/// Returns `None` if `start` is not a backslash followed by a letter.
pub fn parse_command(text: &str, start: usize) -> Option<CommandExtent> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'\\') {
        return None;
    }
    let name_end = letters_end(text, start + 1);
    if name_end == start + 1 {
        return None;
    }
    let name = text[start + 1..name_end].to_string();
    let starred = bytes.get(name_end) == Some(&b'*');
    let head_end = if starred { name_end + 1 } else { name_end };
    let (args, end, truncated) = parse_arguments(text, head_end, true);

    Some(CommandExtent {
        start,
        name,
        starred,
        args,
        end,
        truncated,
    })
}

/// Read the `{name}` right after `\begin` or `\end` at `pos`.
///
/// Returns the name and the offset after the closing brace.
pub fn read_env_name(text: &str, pos: usize) -> Option<(String, usize)> {
    let bytes = text.as_bytes();
    let open = skip_inline_space(text, pos);
    if bytes.get(open) != Some(&b'{') {
        return None;
    }
    let close = find_group_end(text, open)?;
    let name = text[open + 1..close].trim();
    if name.is_empty() || name.contains(['{', '}', '\\']) {
        return None;
    }
    Some((name.to_string(), close + 1))
}

/// Match `\begin{name}` at `start` with its `\end{name}`, counting nested
/// environments of the same name.
pub fn parse_environment(text: &str, start: usize) -> Option<EnvironmentExtent> {
    if !text[start..].starts_with("\\begin") {
        return None;
    }
    let (name, header_end) = read_env_name(text, start + "\\begin".len())?;
    let (_, body_start, truncated) = parse_arguments(text, header_end, false);
    let body_start = if truncated { header_end } else { body_start };

    let begin_marker = format!("\\begin{{{}}}", name);
    let end_marker = format!("\\end{{{}}}", name);
    let mut depth = 0usize;
    let mut cursor = body_start;

    loop {
        let next_begin = text[cursor..].find(&begin_marker).map(|i| i + cursor);
        let next_end = text[cursor..].find(&end_marker).map(|i| i + cursor)?;

        match next_begin {
            Some(begin) if begin < next_end => {
                depth += 1;
                cursor = begin + begin_marker.len();
            }
            _ => {
                if depth == 0 {
                    return Some(EnvironmentExtent {
                        start,
                        name,
                        body_start,
                        body_end: next_end,
                        end: next_end + end_marker.len(),
                    });
                }
                depth -= 1;
                cursor = next_end + end_marker.len();
            }
        }
    }
}

/// Find the end of a delimited span such as `$...$` or `\\[...\\]` opening at `start`.
///
/// `open` must match at `start`. Escaped occurrences of `close` are skipped.
/// Returns the offset one past the closing delimiter.
pub fn find_delimited_end(text: &str, start: usize, open: &str, close: &str) -> Option<usize> {
    if !text[start..].starts_with(open) {
        return None;
    }
    let bytes = text.as_bytes();
    let mut cursor = start + open.len();
    loop {
        let found = text[cursor..].find(close)? + cursor;
        if is_escaped(bytes, found) {
            cursor = found + 1;
            continue;
        }
        return Some(found + close.len());
    }
}

/// Length in bytes of the character starting at `pos`
pub fn char_len_at(text: &str, pos: usize) -> usize {
    text[pos..].chars().next().map(char::len_utf8).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_findGroupEnd_withNestedBraces_shouldMatchOuter() {
        let text = "{a{b}c}d";
        assert_eq!(find_group_end(text, 0), Some(6));
        assert_eq!(find_group_end(text, 2), Some(4));
    }

    #[test]
    fn test_findGroupEnd_withEscapedBrace_shouldIgnoreIt() {
        let text = r"{a\}b}";
        assert_eq!(find_group_end(text, 0), Some(5));
    }

    #[test]
    fn test_findGroupEnd_withUnbalanced_shouldReturnNone() {
        assert_eq!(find_group_end("{abc", 0), None);
        assert_eq!(find_group_end("[a{]}", 0), None);
    }

    #[test]
    fn test_parseCommand_withOptionalAndStar_shouldCaptureAllArgs() {
        let text = r"\section*[short]{Long {nested} title} rest";
        let cmd = parse_command(text, 0).unwrap();
        assert_eq!(cmd.name, "section");
        assert!(cmd.starred);
        assert_eq!(cmd.args.len(), 2);
        assert_eq!(cmd.args[0].kind, ArgKind::Bracket);
        assert_eq!(&text[cmd.args[1].inner()], "Long {nested} title");
        assert_eq!(&text[cmd.end..], " rest");
        assert!(!cmd.truncated);
    }

    #[test]
    fn test_parseCommand_withOpenArgument_shouldMarkTruncated() {
        let text = r"\textbf{never closed";
        let cmd = parse_command(text, 0).unwrap();
        assert!(cmd.truncated);
        assert_eq!(cmd.end, "\\textbf".len());
    }

    #[test]
    fn test_parseEnvironment_withNesting_shouldFindOuterEnd() {
        let text = r"\begin{itemize}\item a \begin{itemize}\item b\end{itemize}\end{itemize}!";
        let env = parse_environment(text, 0).unwrap();
        assert_eq!(env.name, "itemize");
        assert_eq!(&text[env.end..], "!");
        assert!(text[env.body_start..env.body_end].ends_with(r"\end{itemize}"));
    }

    #[test]
    fn test_parseEnvironment_withHeaderArgs_shouldStartBodyAfterThem() {
        let text = r"\begin{minipage}{0.5\textwidth}Body\end{minipage}";
        let env = parse_environment(text, 0).unwrap();
        assert_eq!(&text[env.body_start..env.body_end], "Body");
    }

    #[test]
    fn test_parseEnvironment_withoutEnd_shouldReturnNone() {
        assert!(parse_environment(r"\begin{proof} open", 0).is_none());
    }

    #[test]
    fn test_findDelimitedEnd_withMathDelimiters_shouldReturnClosingOffset() {
        assert_eq!(find_delimited_end("$x$ y", 0, "$", "$"), Some(3));
        assert_eq!(find_delimited_end("$$x$$ y", 0, "$$", "$$"), Some(5));
        assert_eq!(find_delimited_end(r"\(x\) y", 0, "\\(", "\\)"), Some(5));
        assert_eq!(find_delimited_end(r"\[x\] y", 0, "\\[", "\\]"), Some(5));
        assert_eq!(find_delimited_end(r"$a\$b$", 0, "$", "$"), Some(6));
        assert_eq!(find_delimited_end("$never", 0, "$", "$"), None);
        assert_eq!(find_delimited_end("x$", 0, "$", "$"), None);
    }

    #[test]
    fn test_isEscaped_shouldCountBackslashes() {
        let text = r"a\\%b\%";
        let bytes = text.as_bytes();
        assert!(!is_escaped(bytes, 3));
        assert!(is_escaped(bytes, 6));
    }
}
