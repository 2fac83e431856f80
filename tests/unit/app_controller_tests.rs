/*!
 * Tests for the file and directory workflows
 */

use std::fs;
use std::sync::Arc;
use texlate::app_controller::{Controller, OutputTarget};
use texlate::providers::mock::MockEngine;

use crate::common::{create_temp_dir, create_test_file, test_config};

fn controller(engine: &MockEngine) -> Controller {
    Controller::with_engine(test_config(), Arc::new(engine.clone())).unwrap()
}

#[tokio::test]
async fn test_run_withSingleFile_shouldWriteAlongside() {
    let dir = create_temp_dir().unwrap();
    let input = create_test_file(dir.path(), "paper.tex", "Hello there.").unwrap();
    let engine = MockEngine::tagging("FR");

    controller(&engine)
        .run(&input, &OutputTarget::Alongside, false)
        .await
        .unwrap();

    let output = fs::read_to_string(dir.path().join("paper.fr.tex")).unwrap();
    assert_eq!(output, "[FR] Hello there.");
    assert_eq!(fs::read_to_string(&input).unwrap(), "Hello there.");
}

#[tokio::test]
async fn test_run_withExistingOutput_shouldSkipUnlessForced() {
    let dir = create_temp_dir().unwrap();
    let input = create_test_file(dir.path(), "paper.tex", "Hello there.").unwrap();
    create_test_file(dir.path(), "paper.fr.tex", "old").unwrap();
    let engine = MockEngine::tagging("FR");
    let controller = controller(&engine);

    controller.run(&input, &OutputTarget::Alongside, false).await.unwrap();
    assert_eq!(fs::read_to_string(dir.path().join("paper.fr.tex")).unwrap(), "old");
    assert_eq!(engine.call_count(), 0);

    controller.run(&input, &OutputTarget::Alongside, true).await.unwrap();
    assert_eq!(
        fs::read_to_string(dir.path().join("paper.fr.tex")).unwrap(),
        "[FR] Hello there."
    );
}

#[tokio::test]
async fn test_runFolder_withOutputDirectory_shouldMirrorTree() {
    let input_dir = create_temp_dir().unwrap();
    let output_dir = create_temp_dir().unwrap();
    create_test_file(input_dir.path(), "main.tex", "Main text.").unwrap();
    create_test_file(input_dir.path(), "chapters/one.tex", "Chapter text.").unwrap();
    create_test_file(input_dir.path(), "notes.txt", "not latex").unwrap();
    let engine = MockEngine::tagging("FR");

    controller(&engine)
        .run(input_dir.path(), &OutputTarget::Path(output_dir.path().to_path_buf()), false)
        .await
        .unwrap();

    assert_eq!(
        fs::read_to_string(output_dir.path().join("main.tex")).unwrap(),
        "[FR] Main text."
    );
    assert_eq!(
        fs::read_to_string(output_dir.path().join("chapters/one.tex")).unwrap(),
        "[FR] Chapter text."
    );
    assert!(!output_dir.path().join("notes.txt").exists());
    assert_eq!(engine.call_count(), 2);
}

#[tokio::test]
async fn test_runFolder_inPlace_shouldOverwriteSources() {
    let dir = create_temp_dir().unwrap();
    let input = create_test_file(dir.path(), "doc.tex", "In place text.").unwrap();
    let engine = MockEngine::tagging("FR");

    controller(&engine)
        .run(dir.path(), &OutputTarget::InPlace, false)
        .await
        .unwrap();

    assert_eq!(fs::read_to_string(&input).unwrap(), "[FR] In place text.");
}

#[tokio::test]
async fn test_runFolder_withoutTexFiles_shouldFail() {
    let dir = create_temp_dir().unwrap();
    create_test_file(dir.path(), "readme.md", "nothing").unwrap();
    let engine = MockEngine::identity();

    let result = controller(&engine).run(dir.path(), &OutputTarget::Alongside, false).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_run_withMissingInput_shouldFail() {
    let engine = MockEngine::identity();
    let result = controller(&engine)
        .run(std::path::Path::new("/no/such/file.tex"), &OutputTarget::Alongside, false)
        .await;
    assert!(result.is_err());
}

#[test]
fn test_translateFile_fromSyncContext_shouldReportSummary() {
    let dir = create_temp_dir().unwrap();
    let input = create_test_file(dir.path(), "intro.tex", "First part.\n\nSecond part.").unwrap();
    let output = dir.path().join("intro.out.tex");
    let engine = MockEngine::tagging("FR");
    let controller = controller(&engine);

    let summary = tokio_test::block_on(async {
        controller
            .translate_file(&input, &output, &indicatif::MultiProgress::new())
            .await
    })
    .unwrap();

    assert_eq!(summary.paragraphs_total, 2);
    assert!(summary.is_clean());
    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "[FR] First part.\n\n[FR] Second part."
    );
}
