/*!
 * Protection, traversal and normalization used together
 */

use std::collections::HashSet;
use texlate::app_config::StructureConfig;
use texlate::latex::normalize::{split_document, Normalizer};
use texlate::latex::postprocess::finalize;
use texlate::latex::protect::{protect, recover};
use texlate::latex::traversal::apply_to_constructs;
use texlate::latex::Classification;
use texlate::translation::orchestrator::split_paragraphs;

const SAMPLES: [&str; 6] = [
    r"Earlier work \cite{foo} shows $E=mc^2$.",
    r"Figure \ref{fig:a} plots \(f(x)\) against \[ g(x) \] values.",
    r"\section{Intro} Text with {a group} and \footnote{a note}.",
    r"\begin{itemize}\item First\item Second\end{itemize}",
    r"Mixed $a$\cite{b}{c} run",
    "Plain prose with no markup at all.",
];

#[test]
fn test_protect_acrossSamples_shouldNeverShareIndices() {
    let classification = Classification::from_structure(&StructureConfig::default());
    for sample in SAMPLES {
        let protected = protect(sample, &classification);
        let indices: HashSet<usize> = protected.spans.iter().map(|s| s.index).collect();
        assert_eq!(indices.len(), protected.spans.len(), "duplicate index in {:?}", sample);
    }
}

#[test]
fn test_recover_acrossSamples_shouldRoundTripUnderIdentity() {
    let classification = Classification::from_structure(&StructureConfig::default());
    for sample in SAMPLES {
        let protected = protect(sample, &classification);
        let recovery = recover(&protected.text, &protected.spans, &classification, false).unwrap();
        assert_eq!(recovery.text, sample);
        assert_eq!(recovery.bad, 0);
    }
}

#[test]
fn test_traversal_withDefaultStructure_shouldSelectProseArguments() {
    let structure = StructureConfig::default();
    let classification = Classification::from_structure(&structure);
    let constructs = structure.walk_constructs(&[]);
    let text = r"\section{Intro} see \ref{sec} and \textcolor{blue}{colored words} $\text{no}$";

    let mut seen = Vec::new();
    let output = apply_to_constructs(text, &constructs, &classification, |selected| {
        seen.push(selected.to_string());
        Ok::<_, ()>(selected.to_uppercase())
    })
    .unwrap();

    assert_eq!(seen, vec!["Intro", "colored words"]);
    assert_eq!(
        output,
        r"\section{INTRO} see \ref{sec} and \textcolor{blue}{COLORED WORDS} $\text{no}$"
    );
}

#[test]
fn test_normalizeThenFinalize_withoutTranslation_shouldRestoreSpecials() {
    let normalizer = Normalizer::new("XMATHX");
    let text = "Costs 50\\% of A\\&B.\n\n\\makeatletter\n\\def\\@x{1}\n\\makeatother";

    let normalized = normalizer.normalize(text);
    assert!(!normalized.text.contains("\\%"));
    assert!(!normalized.text.contains("\\makeatletter"));

    assert_eq!(finalize(&normalized.text, &normalizer, &normalized), text);
}

#[test]
fn test_splitParagraphs_ofNormalizedBody_shouldRejoinExactly() {
    let normalizer = Normalizer::new("XMATHX");
    let document = "\\documentclass{article}\n\\begin{document}\nFirst.\n\n\\begin{figure}\n\\caption{A}\n\n\\end{figure}\n\nLast $x$.\n\\end{document}\n";
    let normalized = normalizer.normalize(document);
    let parts = split_document(&normalized.text).unwrap();
    let classification = Classification::default();

    let split = split_paragraphs(&parts.body, &classification);

    assert_eq!(split.paragraphs.len(), 3);
    assert!(split.paragraphs[1].starts_with("\\begin{figure}"));
    assert_eq!(split.join(&split.paragraphs), parts.body);
}
