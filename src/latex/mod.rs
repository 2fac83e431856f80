/*!
 * Markup handling for LaTeX documents.
 *
 * This module contains everything that understands LaTeX syntax:
 * - `scan`: delimiter balance matching and command/environment extents
 * - `protect`: carving non-translatable spans out of a text run and putting them back
 * - `traversal`: walking known commands and environments to reach nested prose
 * - `normalize`: document-level rewriting before translation and its inverse
 * - `postprocess`: repairing artifacts translators leave in markup
 */

pub mod normalize;
pub mod postprocess;
pub mod protect;
pub mod scan;
pub mod traversal;

pub use protect::{Classification, ProtectedSpan, ProtectedText, Recovery, SpanKind};
pub use traversal::{Construct, ConstructKind};

/// Stem of every placeholder and escape token
pub const DEFAULT_MATH_CODE: &str = "XMATHX";

/// Commands whose arguments are never translated
pub const DEFAULT_SKIP_COMMANDS: &[&str] = &[
    "ref",
    "label",
    "cite",
    "citep",
    "citet",
    "bibitem",
    "bibliographystyle",
    "bibliography",
];

/// Environments whose bodies are never translated
pub const DEFAULT_SKIP_ENVIRONMENTS: &[&str] =
    &["equation", "align", "gather", "displaymath", "eqnarray"];

/// Formatting-only commands stripped before protection
pub const DEFAULT_FORMAT_COMMANDS: &[&str] = &["textbf", "textit", "emph"];

/// Environments walked into by default
pub const BASELINE_ENVIRONMENTS: &[&str] = &[
    "abstract",
    "acknowledgments",
    "acknowledgements",
    "itemize",
    "enumerate",
    "description",
    "list",
    "proof",
    "quote",
    "quotation",
    "center",
    "flushleft",
    "flushright",
    "minipage",
    "theorem",
    "lemma",
    "corollary",
    "proposition",
    "definition",
    "remark",
    "example",
];

/// Commands whose brace arguments are walked into by default
pub const BASELINE_COMMANDS: &[&str] = &[
    "part",
    "chapter",
    "section",
    "subsection",
    "subsubsection",
    "paragraph",
    "subparagraph",
    "caption",
    "subcaption",
    "footnote",
];
