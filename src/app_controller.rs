use anyhow::{anyhow, Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app_config::Config;
use crate::file_utils::FileManager;
use crate::providers::{create_engine, TranslationEngine};
use crate::translation::{DocumentTranslator, TranslationCache, TranslationSummary};

// @module: Application controller for LaTeX translation

/// Where translated documents are written
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputTarget {
    /// `<stem>.<target>.tex` next to each source
    #[default]
    Alongside,
    /// Overwrite each source
    InPlace,
    /// A file (single-document mode) or a directory mirroring the input tree
    Path(PathBuf),
}

/// Main application controller for document translation
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Active engine
    engine: Arc<dyn TranslationEngine>,
    // @field: Paragraph cache, when enabled and available
    cache: Option<TranslationCache>,
}

impl Controller {
    // @method: Create a controller with the engine and cache the configuration selects
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        let engine = create_engine(&config)?;
        let cache = if config.cache.enabled {
            Self::open_cache(&config)
        } else {
            None
        };
        Ok(Self { config, engine, cache })
    }

    // @method: Create a controller around an existing engine, without a cache
    pub fn with_engine(config: Config, engine: Arc<dyn TranslationEngine>) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        Ok(Self {
            config,
            engine,
            cache: None,
        })
    }

    /// Use `cache` for every document this controller translates
    pub fn with_cache(mut self, cache: TranslationCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn open_cache(config: &Config) -> Option<TranslationCache> {
        let opened = config
            .cache
            .database_path()
            .and_then(|path| TranslationCache::open(&path).map(|cache| (path, cache)));
        match opened {
            Ok((path, cache)) => {
                info!("Using translation cache at {}", path.display());
                Some(cache)
            }
            Err(e) => {
                warn!("Translation cache disabled: {:#}", e);
                None
            }
        }
    }

    /// Translate a file or every `.tex` file under a directory
    pub async fn run(&self, input: &Path, output: &OutputTarget, force_overwrite: bool) -> Result<()> {
        if input.is_dir() {
            self.run_folder(input, output, force_overwrite).await
        } else if input.is_file() {
            let output_path = self.output_path(input, None, output);
            if output_path.exists() && output_path != input && !force_overwrite {
                warn!(
                    "Skipping {}, {} already exists (use -f to force overwrite)",
                    input.display(),
                    output_path.display()
                );
                return Ok(());
            }
            let multi_progress = MultiProgress::new();
            self.translate_file(input, &output_path, &multi_progress).await?;
            Ok(())
        } else {
            Err(anyhow!("Input path does not exist: {}", input.display()))
        }
    }

    /// Translate one document and write the result
    pub async fn translate_file(
        &self,
        input: &Path,
        output: &Path,
        multi_progress: &MultiProgress,
    ) -> Result<TranslationSummary> {
        let start_time = std::time::Instant::now();
        let content = FileManager::read_to_string(input)?;
        let document_id = input
            .canonicalize()
            .unwrap_or_else(|_| input.to_path_buf())
            .to_string_lossy()
            .to_string();

        let progress_bar = multi_progress.add(ProgressBar::new(0));
        progress_bar.set_style(Self::progress_style("paragraphs"));
        progress_bar.set_message(Self::display_name(input));

        let bar = progress_bar.clone();
        let mut translator = DocumentTranslator::new(Arc::clone(&self.engine), self.config.clone())?
            .with_progress(move |done, total| {
                bar.set_length(total as u64);
                bar.set_position(done as u64);
            });
        if let Some(cache) = &self.cache {
            translator = translator.with_cache(cache.clone());
        }

        let result = translator.translate_document_as(&content, Some(&document_id)).await;
        progress_bar.finish_and_clear();
        let output_doc = result.with_context(|| format!("Failed to translate {}", input.display()))?;

        FileManager::write_to_file(output, &output_doc.text)?;

        let summary = output_doc.summary;
        if summary.is_clean() {
            info!(
                "Translated {} -> {} in {}",
                input.display(),
                output.display(),
                Self::format_duration(start_time.elapsed())
            );
        } else {
            warn!(
                "Translated {} -> {} in {} with {} paragraph(s) left untranslated",
                input.display(),
                output.display(),
                Self::format_duration(start_time.elapsed()),
                summary.paragraphs_total - summary.paragraphs_completed
            );
        }
        Ok(summary)
    }

    /// Translate every `.tex` file under `input_dir`; one failing file does not stop the others
    pub async fn run_folder(&self, input_dir: &Path, output: &OutputTarget, force_overwrite: bool) -> Result<()> {
        let start_time = std::time::Instant::now();
        let files: Vec<PathBuf> = FileManager::find_tex_files(input_dir)?
            .into_iter()
            .filter(|f| !FileManager::is_translation_output(f, &self.config.target_language))
            .collect();
        if files.is_empty() {
            return Err(anyhow!("No .tex files found in directory: {}", input_dir.display()));
        }

        let multi_progress = MultiProgress::new();
        let folder_pb = multi_progress.add(ProgressBar::new(files.len() as u64));
        folder_pb.set_style(Self::progress_style("files"));
        folder_pb.set_message("Processing files");

        let mut success_count = 0;
        let mut error_count = 0;
        let mut skip_count = 0;

        for file in &files {
            folder_pb.set_message(format!("Processing: {}", Self::display_name(file)));
            let output_path = self.output_path(file, Some(input_dir), output);

            if output_path.exists() && output_path != *file && !force_overwrite {
                warn!("Skipping {}, translation already exists", file.display());
                skip_count += 1;
                folder_pb.inc(1);
                continue;
            }

            match self.translate_file(file, &output_path, &multi_progress).await {
                Ok(_) => success_count += 1,
                Err(e) => {
                    error!("Error processing file {}: {:#}", file.display(), e);
                    error_count += 1;
                }
            }
            folder_pb.inc(1);
        }

        folder_pb.finish_with_message("Folder processing complete");
        info!(
            "Folder processing completed in {}: {} translated, {} skipped, {} errors",
            Self::format_duration(start_time.elapsed()),
            success_count,
            skip_count,
            error_count
        );
        Ok(())
    }

    /// Output location of `input`; `root` is the walked directory in folder mode
    pub fn output_path(&self, input: &Path, root: Option<&Path>, output: &OutputTarget) -> PathBuf {
        let parent = input.parent().unwrap_or(Path::new("."));
        match output {
            OutputTarget::InPlace => input.to_path_buf(),
            OutputTarget::Alongside => {
                FileManager::generate_output_path(input, parent, &self.config.target_language)
            }
            OutputTarget::Path(path) => match root {
                None if !FileManager::dir_exists(path) => path.clone(),
                None => FileManager::generate_output_path(input, path, &self.config.target_language),
                Some(root) => {
                    let relative = input.strip_prefix(root).unwrap_or(input);
                    path.join(relative)
                }
            },
        }
    }

    fn progress_style(unit: &str) -> ProgressStyle {
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{percent}}%) {{msg}}",
                unit
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░")
    }

    fn display_name(path: &Path) -> String {
        path.file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn format_duration(duration: std::time::Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
