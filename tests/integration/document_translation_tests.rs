/*!
 * End-to-end document translation through the mock engine.
 */

use crate::common::{document_translator, init_logging, sample_paragraphs, test_config};
use texlate::providers::mock::{MockBehavior, MockEngine};

#[tokio::test]
async fn test_translateDocument_withCiteAndMath_shouldRoundTripUnderIdentity() {
    init_logging();
    let engine = MockEngine::identity();
    let translator = document_translator(&engine, test_config());
    let text = r"Earlier work \cite{foo} shows $E=mc^2$.";

    let output = translator.translate_document(text).await.unwrap();

    assert_eq!(output.text, text);
    assert_eq!(engine.calls(), vec!["Earlier work XMATHX_0 shows XMATHX_1.".to_string()]);
    assert_eq!(output.summary.objects_recovered, 2);
    assert_eq!(output.summary.objects_total, 2);
}

#[tokio::test]
async fn test_translateDocument_withTextcolor_shouldOnlyTranslateSecondArgument() {
    let engine = MockEngine::tagging("FR");
    let translator = document_translator(&engine, test_config());

    let output = translator
        .translate_document(r"\textcolor{red}{Result text}")
        .await
        .unwrap();

    assert_eq!(output.text, r"\textcolor{red}{[FR] Result text}");
    assert_eq!(engine.calls(), vec!["Result text".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_translateDocument_withSlowParagraph_shouldKeepItsOriginalAfterTimeout() {
    let mut config = test_config();
    config.runtime.paragraph_timeout_secs = 1;
    let engine = MockEngine::slow_on("stalls", 5_000).with_custom_response(|text| format!("<{}>", text));
    let translator = document_translator(&engine, config);
    let paragraphs = [
        "Paragraph one is quick.",
        "Paragraph two is quick.",
        "Paragraph three is quick.",
        "Paragraph four stalls forever.",
        "Paragraph five is quick.",
    ];

    let output = translator.translate_document(&paragraphs.join("\n\n")).await.unwrap();

    let produced: Vec<&str> = output.text.split("\n\n").collect();
    assert_eq!(produced.len(), 5);
    assert_eq!(produced[3], paragraphs[3]);
    assert_eq!(produced[0], "<Paragraph one is quick.>");
    assert_eq!(output.summary.paragraphs_total, 5);
    assert_eq!(output.summary.paragraphs_completed, 4);
    assert_eq!(output.summary.failures.len(), 1);
    assert_eq!(output.summary.failures[0].index, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_translateDocument_withTransientFailure_shouldFallBackToOriginal() {
    let engine = MockEngine::fail_on("unlucky").with_custom_response(|text| text.to_uppercase());
    let translator = document_translator(&engine, test_config());
    let text = sample_paragraphs("This unlucky paragraph never translates.");

    let output = translator.translate_document(&text).await.unwrap();

    let produced: Vec<&str> = output.text.split("\n\n").collect();
    assert_eq!(produced[1], "This unlucky paragraph never translates.");
    assert_eq!(produced[0], r"THE FIRST PARAGRAPH CITES \cite{a}.");
    assert_eq!(produced[2], "THE THIRD PARAGRAPH HAS $x^2$ IN IT.");
    assert!((output.summary.completion_ratio() - 2.0 / 3.0).abs() < 1e-9);
    assert!(!output.summary.is_clean());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_translateDocument_withOutOfOrderCompletion_shouldPreserveOrder() {
    let engine = MockEngine::slow_on("first", 300).with_custom_response(|text| format!("<{}>", text));
    let translator = document_translator(&engine, test_config());
    let paragraphs: Vec<String> = std::iter::once("The first one is slow.".to_string())
        .chain((2..=8).map(|i| format!("Paragraph number {} is fast.", i)))
        .collect();

    let output = translator.translate_document(&paragraphs.join("\n\n")).await.unwrap();

    let expected: Vec<String> = paragraphs.iter().map(|p| format!("<{}>", p)).collect();
    assert_eq!(output.text, expected.join("\n\n"));
    assert!(output.summary.is_clean());
}

#[tokio::test]
async fn test_translateDocument_withFatalEngine_shouldStillProduceDocument() {
    let engine = MockEngine::fatal();
    let translator = document_translator(&engine, test_config());
    let text = sample_paragraphs("Middle paragraph.");

    let output = translator.translate_document(&text).await.unwrap();

    assert_eq!(output.text, text);
    assert_eq!(output.summary.paragraphs_completed, 0);
    assert_eq!(output.summary.failures.len(), 3);
}

#[tokio::test]
async fn test_translateDocument_withRateLimits_shouldRetryTransparently() {
    let engine = MockEngine::rate_limited_then_ok(2);
    let translator = document_translator(&engine, test_config());

    let output = translator.translate_document("Just one paragraph.").await.unwrap();

    assert_eq!(output.text, "Just one paragraph.");
    assert!(output.summary.is_clean());
    assert_eq!(output.summary.engine_calls, 3);
}

#[tokio::test]
async fn test_translateDocument_withLostPlaceholders_shouldKeepOriginalParagraph() {
    let engine = MockEngine::new(MockBehavior::DropPlaceholders);
    let translator = document_translator(&engine, test_config());
    let text = r"See \ref{fig} and $y$ here.";

    let output = translator.translate_document(text).await.unwrap();

    assert_eq!(output.text, text);
    assert_eq!(output.summary.failures.len(), 1);
}

#[tokio::test]
async fn test_translateDocument_withSkeletonWrapping_shouldProduceCompleteDocument() {
    let mut config = test_config();
    config.runtime.wrap_incomplete = true;
    let engine = MockEngine::identity();
    let translator = document_translator(&engine, config);

    let output = translator.translate_document("Some loose text.").await.unwrap();

    assert!(output.text.starts_with("\\documentclass[UTF8]{article}\n"));
    assert!(output.text.contains("\\begin{document}\nSome loose text."));
    assert!(output.text.ends_with("\\end{document}\n"));
}

#[tokio::test]
async fn test_translateDocument_withTheoremAndMacros_shouldTranslateExpandedBodies() {
    let engine = MockEngine::tagging("FR");
    let translator = document_translator(&engine, test_config());
    let text = "\\documentclass{article}\n\\newtheorem{lemma}{Lemma}\n\\newcommand{\\name}{the method}\n\\begin{document}\n\\begin{lemma}\nWe show \\name works.\n\\end{lemma}\n\\end{document}\n";

    let output = translator.translate_document(text).await.unwrap();

    assert!(output.text.contains("\\begin{lemma}\n[FR] We show the method works.\n\\end{lemma}"));
    assert!(output.text.contains("\\usepackage{amsmath}"));
    assert!(!output.text.contains("xeCJK"));
}
