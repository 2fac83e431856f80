use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// @module: File and directory utilities

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.as_os_str().is_empty() && !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("Failed to create directory: {}", path.display()))?;
        }
        Ok(())
    }

    /// Whether `path` names a LaTeX source
    pub fn is_tex_file<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("tex"))
    }

    /// Whether `path` is the output of an earlier run into `target_language`
    pub fn is_translation_output<P: AsRef<Path>>(path: P, target_language: &str) -> bool {
        path.as_ref()
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_lowercase())
            .is_some_and(|stem| stem.ends_with(&format!(".{}", target_language.to_lowercase())))
    }

    // @generates: Output path for a translated document
    // @params: input_file, output_dir, target_language
    pub fn generate_output_path<P1: AsRef<Path>, P2: AsRef<Path>>(
        input_file: P1,
        output_dir: P2,
        target_language: &str,
    ) -> PathBuf {
        let input_file = input_file.as_ref();
        let stem = input_file.file_stem().unwrap_or_default();

        let mut output_filename = stem.to_string_lossy().to_string();
        output_filename.push('.');
        output_filename.push_str(target_language);
        output_filename.push_str(".tex");

        output_dir.as_ref().join(output_filename)
    }

    /// Find every `.tex` file under `dir`, sorted for a stable processing order
    pub fn find_tex_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();
        for entry in WalkDir::new(dir.as_ref()).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();
            if path.is_file() && Self::is_tex_file(path) {
                result.push(path.to_path_buf());
            }
        }
        result.sort();
        Ok(result)
    }

    /// Read a file to a string
    pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
        fs::read_to_string(&path).with_context(|| format!("Failed to read file: {}", path.as_ref().display()))
    }

    /// Write a string to a file
    pub fn write_to_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            Self::ensure_dir(parent)?;
        }
        fs::write(&path, content)
            .with_context(|| format!("Failed to write to file: {}", path.as_ref().display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generateOutputPath_shouldAppendLanguage() {
        let path = FileManager::generate_output_path("/papers/main.tex", "/out", "zh-CN");
        assert_eq!(path, PathBuf::from("/out/main.zh-CN.tex"));
    }

    #[test]
    fn test_isTranslationOutput_shouldMatchLanguageSuffix() {
        assert!(FileManager::is_translation_output("main.zh-CN.tex", "zh-cn"));
        assert!(!FileManager::is_translation_output("main.tex", "zh-CN"));
    }

    #[test]
    fn test_findTexFiles_shouldRecurseAndFilter() -> Result<()> {
        let dir = TempDir::new()?;
        FileManager::write_to_file(dir.path().join("b.tex"), "b")?;
        FileManager::write_to_file(dir.path().join("sub/a.TEX"), "a")?;
        FileManager::write_to_file(dir.path().join("notes.txt"), "n")?;

        let files = FileManager::find_tex_files(dir.path())?;

        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| FileManager::is_tex_file(f)));
        Ok(())
    }

    #[test]
    fn test_readToString_withMissingFile_shouldNameThePath() {
        let error = FileManager::read_to_string("/definitely/missing.tex").unwrap_err();
        assert!(error.to_string().contains("missing.tex"));
    }
}
