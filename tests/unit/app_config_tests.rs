/*!
 * Tests for application configuration functionality
 */

use crate::common::{create_temp_dir, create_test_file, document_translator, test_config};
use texlate::app_config::{Config, EngineKind, LogLevel};
use texlate::errors::ConfigError;
use texlate::providers::mock::MockEngine;

#[test]
fn test_workerCount_withZeroThreads_shouldUseEngineProfile() {
    let mut config = Config::default();
    config.runtime.threads = 0;

    config.engine = EngineKind::Google;
    let google = config.worker_count();
    config.engine = EngineKind::OpenAI;
    let openai = config.worker_count();

    assert!(google >= 1);
    assert!(openai > google);

    config.runtime.threads = 3;
    assert_eq!(config.worker_count(), 3);
}

#[test]
fn test_saveAndLoad_shouldKeepCustomValues() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("nested").join("texlate.json");
    let mut config = Config::default();
    config.engine = EngineKind::OpenAI;
    config.engines.openai.api_key = "sk-test".to_string();
    config.runtime.paragraph_timeout_secs = 42;
    config.structure.custom_environments.push("summary".to_string());
    config.log_level = LogLevel::Debug;

    config.save(&path).unwrap();
    let loaded = Config::load_or_create(&path).unwrap();

    assert_eq!(loaded.engine, EngineKind::OpenAI);
    assert_eq!(loaded.runtime.paragraph_timeout_secs, 42);
    assert_eq!(loaded.structure, config.structure);
    assert_eq!(loaded.log_level, LogLevel::Debug);
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_loadOrCreate_withBrokenJson_shouldFailWithPath() {
    let dir = create_temp_dir().unwrap();
    let path = create_test_file(dir.path(), "texlate.json", "{ not json").unwrap();

    let error = Config::load_or_create(&path).unwrap_err();

    assert!(format!("{:#}", error).contains("texlate.json"));
}

#[test]
fn test_validate_withOpenAIWithoutKey_shouldFailFast() {
    let mut config = Config::default();
    config.engine = EngineKind::OpenAI;

    match config.validate() {
        Err(ConfigError::MissingCredential { engine, field }) => {
            assert_eq!(engine, "openai");
            assert_eq!(field, "engines.openai.api_key");
        }
        other => panic!("unexpected validation result: {:?}", other),
    }
}

#[tokio::test]
async fn test_commandsFile_shouldSelectArgumentsDuringTranslation() {
    let dir = create_temp_dir().unwrap();
    let path = create_test_file(
        dir.path(),
        "commands.json",
        r#"[{"name": "colorbox", "arg_count": 2, "translate_positions": [2]}]"#,
    )
    .unwrap();
    let mut config = test_config();
    config.load_commands_file(&path).unwrap();
    let engine = MockEngine::tagging("FR");

    let output = document_translator(&engine, config)
        .translate_document(r"\colorbox{yellow}{Boxed words}")
        .await
        .unwrap();

    assert_eq!(output.text, r"\colorbox{yellow}{[FR] Boxed words}");
    assert_eq!(engine.calls(), vec!["Boxed words".to_string()]);
}
