/*!
 * Engine-specific concurrency tuning.
 *
 * A configured worker count of zero means "use the engine's profile".
 * Profiles reflect how much parallel load each service tolerates before it
 * starts answering with rate-limit errors.
 */

use crate::app_config::EngineKind;

/// Engine-specific concurrency profile with tuned defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineProfile {
    /// Default number of paragraph workers
    pub default_workers: usize,
}

impl EngineProfile {
    /// Get the profile for a given engine
    pub fn for_engine(engine: EngineKind) -> Self {
        match engine {
            // The free web endpoint throttles quickly under parallel load
            EngineKind::Google => Self { default_workers: 4 },
            EngineKind::DeepL => Self { default_workers: 4 },
            // Chat completions are slow per call, so more calls in flight pay off
            EngineKind::OpenAI => Self { default_workers: 8 },
        }
    }

    /// Worker count for a configured value, where zero selects the default
    pub fn resolve_workers(&self, configured: usize) -> usize {
        if configured > 0 {
            configured
        } else {
            self.default_workers
        }
    }
}
