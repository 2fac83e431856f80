/*!
 * Structural traversal of known commands and environments.
 *
 * The walker finds the argument text of configured commands and the bodies
 * of configured environments so their prose can be translated in place.
 * Math, skipped commands and skipped environments are opaque: nothing inside
 * them is ever visited. Only outermost occurrences are reported; whatever is
 * nested inside a target is the transform's business.
 */

use std::ops::Range;

use super::protect::Classification;
use super::scan::{char_len_at, letters_end, parse_command, parse_environment};

/// Whether a construct is a command or an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructKind {
    Command,
    Environment,
}

/// A command or environment whose text gets walked into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Construct {
    /// Name without backslash or star; the starred variant always matches too
    pub name: String,
    pub kind: ConstructKind,
    /// 1-based positions of the brace arguments to transform.
    /// `None` transforms every brace argument.
    pub arg_positions: Option<Vec<usize>>,
}

impl Construct {
    /// A command whose brace arguments are all transformed
    pub fn command(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ConstructKind::Command,
            arg_positions: None,
        }
    }

    /// An environment whose body is transformed
    pub fn environment(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ConstructKind::Environment,
            arg_positions: None,
        }
    }

    /// A multi-argument command where only `positions` are transformed
    pub fn multi_arg(name: impl Into<String>, positions: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            kind: ConstructKind::Command,
            arg_positions: Some(positions),
        }
    }

    fn matches_environment(&self, env_name: &str) -> bool {
        self.kind == ConstructKind::Environment
            && (env_name == self.name || env_name.strip_suffix('*') == Some(self.name.as_str()))
    }

    fn matches_command(&self, command_name: &str) -> bool {
        self.kind == ConstructKind::Command && command_name == self.name
    }
}

/// Byte ranges of every outermost piece of text the constructs select, in order
pub fn find_targets(
    text: &str,
    constructs: &[Construct],
    classification: &Classification,
) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut targets = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if matches!(bytes[i], b'$' | b'\\') {
            if let Some(end) = classification.math_end(text, i) {
                i = end;
                continue;
            }
        }
        if bytes[i] != b'\\' {
            i += char_len_at(text, i).max(1);
            continue;
        }

        if let Some(env) = parse_environment(text, i) {
            if classification.is_skip_environment(&env.name) {
                i = env.end;
            } else if constructs.iter().any(|c| c.matches_environment(&env.name)) {
                if env.body_start < env.body_end {
                    targets.push(env.body_start..env.body_end);
                }
                i = env.end;
            } else {
                i = env.body_start;
            }
            continue;
        }

        let Some(cmd) = parse_command(text, i) else {
            // Control symbol such as `\%`
            i += 1 + if i + 1 < bytes.len() { char_len_at(text, i + 1) } else { 0 };
            continue;
        };

        if classification.is_skip_command(&cmd.name) {
            i = cmd.end;
            continue;
        }

        let selected = constructs.iter().find(|c| c.matches_command(&cmd.name));
        match selected {
            Some(construct) if !cmd.truncated => {
                let braces: Vec<_> = cmd.brace_args().collect();
                match &construct.arg_positions {
                    None => {
                        targets.extend(braces.iter().map(|arg| arg.inner()));
                    }
                    Some(positions) => {
                        let required = positions.iter().copied().max().unwrap_or(0);
                        if braces.len() >= required {
                            for &position in positions {
                                if position >= 1 {
                                    targets.push(braces[position - 1].inner());
                                }
                            }
                            targets.sort_by_key(|range| range.start);
                        }
                    }
                }
                i = cmd.end;
            }
            _ => {
                // Keep walking inside the arguments of unknown commands
                i = letters_end(text, i + 1);
            }
        }
    }

    targets.retain(|range| !range.is_empty());
    targets
}

/// Replace each target range with its replacement, in order
pub fn splice(text: &str, targets: &[Range<usize>], replacements: &[String]) -> String {
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;
    for (range, replacement) in targets.iter().zip(replacements) {
        output.push_str(&text[cursor..range.start]);
        output.push_str(replacement);
        cursor = range.end;
    }
    output.push_str(&text[cursor..]);
    output
}

/// Apply `transform` to the selected text of every outermost occurrence of
/// any of `constructs`, in document order.
pub fn apply_to_constructs<F, E>(
    text: &str,
    constructs: &[Construct],
    classification: &Classification,
    mut transform: F,
) -> Result<String, E>
where
    F: FnMut(&str) -> Result<String, E>,
{
    let targets = find_targets(text, constructs, classification);
    let mut replacements = Vec::with_capacity(targets.len());
    for range in &targets {
        replacements.push(transform(&text[range.clone()])?);
    }
    Ok(splice(text, &targets, &replacements))
}

/// Apply `transform` to every occurrence of a single command or environment
pub fn apply_to_construct<F, E>(
    text: &str,
    construct: &Construct,
    classification: &Classification,
    transform: F,
) -> Result<String, E>
where
    F: FnMut(&str) -> Result<String, E>,
{
    apply_to_constructs(text, std::slice::from_ref(construct), classification, transform)
}

/// Top-level bare `{...}` groups in `text`, as ranges of their content.
///
/// A group that directly follows a command name or another argument belongs
/// to that command and is not reported.
pub fn find_bare_groups(text: &str, classification: &Classification) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut groups = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if matches!(bytes[i], b'$' | b'\\') {
            if let Some(end) = classification.math_end(text, i) {
                i = end;
                continue;
            }
        }
        match bytes[i] {
            b'\\' => {
                if let Some(env) = parse_environment(text, i) {
                    i = env.end;
                } else if let Some(cmd) = parse_command(text, i) {
                    i = cmd.end.max(i + 1);
                } else {
                    i += 1 + if i + 1 < bytes.len() { char_len_at(text, i + 1) } else { 0 };
                }
            }
            b'{' => match super::scan::find_group_end(text, i) {
                Some(close) => {
                    if close > i + 1 {
                        groups.push(i + 1..close);
                    }
                    i = close + 1;
                }
                None => i += 1,
            },
            _ => i += char_len_at(text, i).max(1),
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upper(text: &str) -> Result<String, ()> {
        Ok(text.to_uppercase())
    }

    #[test]
    fn test_applyToConstruct_withMultiArgCommand_shouldTransformSelectedOnly() {
        let classification = Classification::default();
        let construct = Construct::multi_arg("textcolor", vec![2]);
        let mut seen = Vec::new();
        let result = apply_to_construct(
            r"\textcolor{red}{Result text} end",
            &construct,
            &classification,
            |text| -> Result<String, ()> {
                seen.push(text.to_string());
                Ok(text.to_uppercase())
            },
        )
        .unwrap();

        assert_eq!(seen, vec!["Result text".to_string()]);
        assert_eq!(result, r"\textcolor{red}{RESULT TEXT} end");
    }

    #[test]
    fn test_applyToConstruct_withStarredVariant_shouldMatch() {
        let classification = Classification::default();
        let result = apply_to_construct(
            r"\section*{Intro} and \section[s]{Next}",
            &Construct::command("section"),
            &classification,
            upper,
        )
        .unwrap();
        assert_eq!(result, r"\section*{INTRO} and \section[s]{NEXT}");
    }

    #[test]
    fn test_applyToConstruct_withEnvironment_shouldTransformBody() {
        let classification = Classification::default();
        let text = "\\begin{abstract}\nShort summary.\n\\end{abstract}";
        let result =
            apply_to_construct(text, &Construct::environment("abstract"), &classification, upper)
                .unwrap();
        assert_eq!(result, "\\begin{abstract}\nSHORT SUMMARY.\n\\end{abstract}");
    }

    #[test]
    fn test_findTargets_insideSkipEnvironmentOrMath_shouldSkip() {
        let classification = Classification::default();
        let text = r"\begin{equation}\caption{no}\end{equation} $\caption{no}$ \caption{yes}";
        let targets = find_targets(text, &[Construct::command("caption")], &classification);
        assert_eq!(targets.len(), 1);
        assert_eq!(&text[targets[0].clone()], "yes");
    }

    #[test]
    fn test_findTargets_withNestedConstructs_shouldReportOutermostOnly() {
        let classification = Classification::default();
        let constructs = [Construct::environment("itemize"), Construct::command("footnote")];
        let text = r"\begin{itemize}\item a\footnote{b}\end{itemize} \footnote{c}";
        let targets = find_targets(text, &constructs, &classification);
        assert_eq!(targets.len(), 2);
        assert_eq!(&text[targets[0].clone()], r"\item a\footnote{b}");
        assert_eq!(&text[targets[1].clone()], "c");
    }

    #[test]
    fn test_findTargets_insideUnknownCommand_shouldWalkIntoArguments() {
        let classification = Classification::default();
        let text = r"\begin{figure}\centering\caption{A plot}\end{figure}";
        let targets = find_targets(text, &[Construct::command("caption")], &classification);
        assert_eq!(targets.len(), 1);
        assert_eq!(&text[targets[0].clone()], "A plot");
    }

    #[test]
    fn test_findTargets_withSkipCommand_shouldNotEnter() {
        let classification = Classification::default();
        let text = r"\cite{\footnote{x}} \footnote{y}";
        let targets = find_targets(text, &[Construct::command("footnote")], &classification);
        assert_eq!(targets.len(), 1);
        assert_eq!(&text[targets[0].clone()], "y");
    }

    #[test]
    fn test_applyToConstructs_withFailingTransform_shouldPropagate() {
        let classification = Classification::default();
        let result: Result<String, &str> = apply_to_constructs(
            r"\section{A}",
            &[Construct::command("section")],
            &classification,
            |_| Err("boom"),
        );
        assert_eq!(result, Err("boom"));
    }

    #[test]
    fn test_findBareGroups_shouldIgnoreCommandArguments() {
        let classification = Classification::default();
        let text = r"{Lead group} \textsc{arg} {second} $\frac{a}{b}$";
        let groups = find_bare_groups(text, &classification);
        let contents: Vec<&str> = groups.iter().map(|r| &text[r.clone()]).collect();
        assert_eq!(contents, vec!["Lead group", "second"]);
    }
}
