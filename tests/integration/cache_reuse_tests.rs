/*!
 * Paragraph cache reuse across runs.
 */

use crate::common::{create_temp_dir, document_translator, sample_paragraphs, test_config};
use texlate::providers::mock::MockEngine;
use texlate::translation::TranslationCache;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rerun_withEditedParagraph_shouldOnlyTranslateTheEditedOne() {
    let mut config = test_config();
    config.cache.enabled = true;
    let cache = TranslationCache::in_memory().unwrap();

    let first_engine = MockEngine::tagging("FR");
    let first = document_translator(&first_engine, config.clone()).with_cache(cache.clone());
    let original = sample_paragraphs("The second paragraph says hello.");
    let first_output = first.translate_document_as(&original, Some("paper.tex")).await.unwrap();
    assert_eq!(first_engine.call_count(), 3);
    assert_eq!(first_output.summary.cache_misses, 3);

    let second_engine = MockEngine::tagging("FR");
    let second = document_translator(&second_engine, config).with_cache(cache.clone());
    let edited = sample_paragraphs("The second paragraph now says goodbye.");
    let second_output = second.translate_document_as(&edited, Some("paper.tex")).await.unwrap();

    assert_eq!(second_engine.calls(), vec!["The second paragraph now says goodbye.".to_string()]);
    assert_eq!(second_output.summary.cache_hits, 2);
    assert_eq!(second_output.summary.cache_misses, 1);

    let first_paragraphs: Vec<&str> = first_output.text.split("\n\n").collect();
    let second_paragraphs: Vec<&str> = second_output.text.split("\n\n").collect();
    assert_eq!(first_paragraphs[0], second_paragraphs[0]);
    assert_eq!(first_paragraphs[2], second_paragraphs[2]);
    assert_eq!(second_paragraphs[1], "[FR] The second paragraph now says goodbye.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rerun_withChangedTargetLanguage_shouldMissTheCache() {
    let mut config = test_config();
    config.cache.enabled = true;
    let cache = TranslationCache::in_memory().unwrap();
    let text = sample_paragraphs("Middle.");

    let engine = MockEngine::tagging("FR");
    document_translator(&engine, config.clone())
        .with_cache(cache.clone())
        .translate_document_as(&text, Some("paper.tex"))
        .await
        .unwrap();

    config.target_language = "de".to_string();
    let engine = MockEngine::tagging("DE");
    let output = document_translator(&engine, config)
        .with_cache(cache.clone())
        .translate_document_as(&text, Some("paper.tex"))
        .await
        .unwrap();

    assert_eq!(engine.call_count(), 3);
    assert!(output.text.starts_with("[DE] "));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cacheDisabledInConfig_shouldIgnoreProvidedCache() {
    let config = test_config();
    let cache = TranslationCache::in_memory().unwrap();
    let text = sample_paragraphs("Middle.");

    for _ in 0..2 {
        let engine = MockEngine::identity();
        document_translator(&engine, config.clone())
            .with_cache(cache.clone())
            .translate_document(&text)
            .await
            .unwrap();
        assert_eq!(engine.call_count(), 3);
    }
    assert_eq!(cache.stats().0, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_onDiskCache_shouldSurviveReopening() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("cache.db");
    let mut config = test_config();
    config.cache.enabled = true;
    let text = sample_paragraphs("Middle paragraph text.");

    let engine = MockEngine::tagging("FR");
    let cache = TranslationCache::open(&path).unwrap();
    let first = document_translator(&engine, config.clone())
        .with_cache(cache)
        .translate_document(&text)
        .await
        .unwrap();

    let engine = MockEngine::tagging("XX");
    let cache = TranslationCache::open(&path).unwrap();
    let second = document_translator(&engine, config)
        .with_cache(cache)
        .translate_document(&text)
        .await
        .unwrap();

    assert_eq!(engine.call_count(), 0);
    assert_eq!(first.text, second.text);
}
