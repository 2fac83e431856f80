/*!
 * Per-paragraph translation pipeline.
 *
 * A paragraph goes through one text pass (unwrap formatting, protect,
 * translate, recover) and is then walked for nested text: bare brace groups
 * and the arguments or bodies of known commands and environments are each
 * translated the same way, recursively, up to a depth bound. Text nested
 * deeper than the bound is left as it is.
 */

use futures::future::{BoxFuture, FutureExt};
use log::{debug, warn};
use std::ops::Range;
use std::sync::Arc;

use super::core::{needs_translation, TextTranslator};
use crate::app_config::RuntimeConfig;
use crate::errors::{LatexError, TranslationError};
use crate::latex::postprocess::{repair_bibliography, sanitize_string_at};
use crate::latex::protect::{protect, recover, strip_format_commands, ProtectedSpan, Recovery};
use crate::latex::traversal::{find_bare_groups, find_targets, splice};
use crate::latex::{Classification, Construct, SpanKind};

/// Translated text and placeholder bookkeeping for a paragraph or fragment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParagraphOutcome {
    pub text: String,
    /// Protected objects put back cleanly
    pub recovered: usize,
    /// Protected objects extracted
    pub total: usize,
}

impl ParagraphOutcome {
    fn absorb(&mut self, nested: &ParagraphOutcome) {
        self.recovered += nested.recovered;
        self.total += nested.total;
    }
}

/// Translates paragraphs with a fixed run configuration
#[derive(Debug, Clone)]
pub struct ParagraphTranslator {
    translator: TextTranslator,
    classification: Arc<Classification>,
    constructs: Arc<Vec<Construct>>,
    max_depth: usize,
    max_bad_ratio: f64,
}

/// A lost `\begin{..}` or `\end{..}` header leaves the document unbalanced
fn is_structural(span: &ProtectedSpan) -> bool {
    span.kind == SpanKind::Environment
        || (span.kind == SpanKind::Command
            && (span.original.starts_with("\\begin") || span.original.starts_with("\\end")))
}

impl ParagraphTranslator {
    pub fn new(
        translator: TextTranslator,
        classification: Classification,
        constructs: Vec<Construct>,
        runtime: &RuntimeConfig,
    ) -> Self {
        Self {
            translator,
            classification: Arc::new(classification),
            constructs: Arc::new(constructs),
            max_depth: runtime.max_nesting_depth,
            max_bad_ratio: runtime.max_bad_placeholder_ratio,
        }
    }

    pub fn translator(&self) -> &TextTranslator {
        &self.translator
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    /// Translate a whole paragraph, nested constructs included
    pub async fn translate_paragraph(&self, paragraph: &str) -> Result<ParagraphOutcome, TranslationError> {
        let prepared = repair_bibliography(&sanitize_string_at(paragraph));
        self.translate_fragment(&prepared, 0).await
    }

    /// Translate only the top-level prose of `text`, without walking into
    /// nested groups or constructs
    pub async fn translate_text(&self, text: &str) -> Result<ParagraphOutcome, TranslationError> {
        self.text_pass(text).await
    }

    fn translate_fragment<'a>(
        &'a self,
        text: &'a str,
        depth: usize,
    ) -> BoxFuture<'a, Result<ParagraphOutcome, TranslationError>> {
        async move {
            if depth > self.max_depth {
                return Err(LatexError::TooDeep(depth).into());
            }

            let mut outcome = self.text_pass(text).await?;
            let base = std::mem::take(&mut outcome.text);

            let groups = find_bare_groups(&base, &self.classification);
            let mut ranges: Vec<Range<usize>> = find_targets(&base, &self.constructs, &self.classification)
                .into_iter()
                .filter(|target| !groups.iter().any(|g| g.start <= target.start && target.end <= g.end))
                .collect();
            ranges.extend(groups);
            ranges.sort_by_key(|range| range.start);

            if ranges.is_empty() {
                outcome.text = base;
                return Ok(outcome);
            }
            debug!("Walking {} nested fragments at depth {}", ranges.len(), depth);

            let mut replacements = Vec::with_capacity(ranges.len());
            for range in &ranges {
                let inner = &base[range.clone()];
                match self.translate_fragment(inner, depth + 1).await {
                    Ok(nested) => {
                        outcome.absorb(&nested);
                        replacements.push(nested.text);
                    }
                    Err(TranslationError::Latex(LatexError::TooDeep(limit))) => {
                        warn!("Nesting deeper than {} levels, leaving fragment untranslated", limit - 1);
                        replacements.push(inner.to_string());
                    }
                    Err(e) => return Err(e),
                }
            }

            outcome.text = splice(&base, &ranges, &replacements);
            Ok(outcome)
        }
        .boxed()
    }

    /// Unwrap formatting, protect, translate and recover one text run
    async fn text_pass(&self, text: &str) -> Result<ParagraphOutcome, TranslationError> {
        let stripped = strip_format_commands(text, &self.classification);
        let local = self.classification.with_discovered_words(&stripped);
        let protected = protect(&stripped, &local);
        let total = protected.spans.len();

        if !needs_translation(&protected.text) {
            return Ok(ParagraphOutcome {
                text: stripped,
                recovered: total,
                total,
            });
        }

        // An inner line break is a space in LaTeX; engines would read it as a sentence end
        let core = protected.text.trim();
        let leading = &protected.text[..protected.text.len() - protected.text.trim_start().len()];
        let trailing = &protected.text[leading.len() + core.len()..];
        let surrogate = format!("{}{}{}", leading, core.replace('\n', " "), trailing);
        let translated = self.translator.translate(&surrogate).await?;
        let recovery = recover(&translated, &protected.spans, &local, true)?;
        self.check_recovery(&recovery, &protected.spans)?;

        Ok(ParagraphOutcome {
            recovered: recovery.total - recovery.bad,
            total: recovery.total,
            text: recovery.text,
        })
    }

    /// Lost placeholders are tolerated up to the configured share, unless a
    /// lost span opens or closes an environment
    fn check_recovery(&self, recovery: &Recovery, spans: &[ProtectedSpan]) -> Result<(), LatexError> {
        if recovery.bad == 0 {
            return Ok(());
        }
        let structural = recovery
            .lost
            .iter()
            .filter_map(|&index| spans.get(index))
            .any(is_structural);
        let ratio = recovery.bad as f64 / recovery.total.max(1) as f64;
        if structural || ratio > self.max_bad_ratio {
            return Err(LatexError::PlaceholderMismatch {
                bad: recovery.bad,
                total: recovery.total,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::StructureConfig;
    use crate::providers::mock::{MockBehavior, MockEngine};

    fn paragraph_translator(engine: &MockEngine, runtime: RuntimeConfig) -> ParagraphTranslator {
        let structure = StructureConfig::default();
        let translator = TextTranslator::new(Arc::new(engine.clone()), "en", "fr", &runtime, "XMATHX");
        ParagraphTranslator::new(
            translator,
            Classification::from_structure(&structure),
            structure.walk_constructs(&[]),
            &runtime,
        )
    }

    #[tokio::test]
    async fn test_translateParagraph_withIdentity_shouldRestoreCiteAndMath() {
        let engine = MockEngine::identity();
        let translator = paragraph_translator(&engine, RuntimeConfig::default());
        let text = r"Earlier work \cite{foo} shows $E=mc^2$.";

        let outcome = translator.translate_paragraph(text).await.unwrap();

        assert_eq!(outcome.text, text);
        assert_eq!((outcome.recovered, outcome.total), (2, 2));
        assert_eq!(engine.calls(), vec!["Earlier work XMATHX_0 shows XMATHX_1.".to_string()]);
    }

    #[tokio::test]
    async fn test_translateParagraph_withTextcolor_shouldTranslateSecondArgumentOnly() {
        let engine = MockEngine::tagging("FR");
        let translator = paragraph_translator(&engine, RuntimeConfig::default());

        let outcome = translator
            .translate_paragraph(r"\textcolor{red}{Result text}")
            .await
            .unwrap();

        assert_eq!(outcome.text, r"\textcolor{red}{[FR] Result text}");
        assert_eq!(engine.calls(), vec!["Result text".to_string()]);
    }

    #[tokio::test]
    async fn test_translateParagraph_withHref_shouldTranslateLinkTextOnly() {
        let engine = MockEngine::tagging("FR");
        let translator = paragraph_translator(&engine, RuntimeConfig::default());

        let outcome = translator
            .translate_paragraph(r"\href{https://example.org/docs}{project page}")
            .await
            .unwrap();

        assert_eq!(outcome.text, r"\href{https://example.org/docs}{[FR] project page}");
        assert_eq!(engine.calls(), vec!["project page".to_string()]);
    }

    #[tokio::test]
    async fn test_translateParagraph_shouldWalkIntoSectionsAndGroups() {
        let engine = MockEngine::tagging("FR");
        let translator = paragraph_translator(&engine, RuntimeConfig::default());

        let outcome = translator
            .translate_paragraph(r"\section{Intro} Some text {nested words}")
            .await
            .unwrap();

        assert_eq!(outcome.text, r"[FR] \section{[FR] Intro} Some text {[FR] nested words}");
        assert_eq!(engine.call_count(), 3);
    }

    #[tokio::test]
    async fn test_translateParagraph_withEnvironment_shouldTranslateBody() {
        let engine = MockEngine::tagging("FR");
        let translator = paragraph_translator(&engine, RuntimeConfig::default());

        let outcome = translator
            .translate_paragraph(r"\begin{abstract}We prove $x=1$.\end{abstract}")
            .await
            .unwrap();

        assert_eq!(outcome.text, r"\begin{abstract}[FR] We prove $x=1$.\end{abstract}");
    }

    #[tokio::test]
    async fn test_translateParagraph_withSkipEnvironment_shouldNotCallEngine() {
        let engine = MockEngine::tagging("FR");
        let translator = paragraph_translator(&engine, RuntimeConfig::default());
        let text = "\\begin{equation}\n a + b \\text{word}\n\\end{equation}";

        let outcome = translator.translate_paragraph(text).await.unwrap();

        assert_eq!(outcome.text, text);
        assert_eq!(engine.call_count(), 0);
    }

    #[tokio::test]
    async fn test_translateParagraph_withFormatCommands_shouldUnwrapThem() {
        let engine = MockEngine::identity();
        let translator = paragraph_translator(&engine, RuntimeConfig::default());

        let outcome = translator
            .translate_paragraph(r"This is \textbf{very} important.")
            .await
            .unwrap();

        assert_eq!(outcome.text, "This is very important.");
    }

    #[tokio::test]
    async fn test_translateParagraph_withCaseDrift_shouldStillRecover() {
        let engine = MockEngine::new(MockBehavior::Lowercase);
        let translator = paragraph_translator(&engine, RuntimeConfig::default());

        let outcome = translator
            .translate_paragraph(r"See $X$ and \ref{A}.")
            .await
            .unwrap();

        assert_eq!(outcome.text, r"see $X$ and \ref{A}.");
        assert_eq!((outcome.recovered, outcome.total), (2, 2));
    }

    #[tokio::test]
    async fn test_translateParagraph_withLostPlaceholders_shouldFail() {
        let engine = MockEngine::new(MockBehavior::DropPlaceholders);
        let translator = paragraph_translator(&engine, RuntimeConfig::default());

        let result = translator.translate_paragraph(r"Value $a$ and $b$ here.").await;

        assert!(matches!(
            result,
            Err(TranslationError::Latex(LatexError::PlaceholderMismatch { bad: 2, total: 2 }))
        ));
    }

    #[tokio::test]
    async fn test_translateParagraph_withLostPlaceholdersWithinRatio_shouldAppendThem() {
        let engine = MockEngine::new(MockBehavior::DropPlaceholders);
        let runtime = RuntimeConfig {
            max_bad_placeholder_ratio: 1.0,
            ..RuntimeConfig::default()
        };
        let translator = paragraph_translator(&engine, runtime);

        let outcome = translator.translate_paragraph(r"Value $a$ here.").await.unwrap();

        assert_eq!(outcome.text, "Value  here. $a$");
        assert_eq!((outcome.recovered, outcome.total), (0, 1));
    }

    #[tokio::test]
    async fn test_translateParagraph_beyondDepthBound_shouldLeaveNestedText() {
        let engine = MockEngine::tagging("FR");
        let runtime = RuntimeConfig {
            max_nesting_depth: 1,
            ..RuntimeConfig::default()
        };
        let translator = paragraph_translator(&engine, runtime);

        let outcome = translator
            .translate_paragraph("Top {middle {deep words}}")
            .await
            .unwrap();

        assert_eq!(outcome.text, "[FR] Top {[FR] middle {deep words}}");
    }

    #[tokio::test]
    async fn test_translateText_shouldNotWalkIntoGroups() {
        let engine = MockEngine::tagging("FR");
        let translator = paragraph_translator(&engine, RuntimeConfig::default());

        let outcome = translator.translate_text("A title {kept}").await.unwrap();

        assert_eq!(outcome.text, "[FR] A title {kept}");
    }
}
