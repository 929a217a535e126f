use std::path::Path;

/// Interface to the optional external aesthetic scorer.
///
/// The engine only ever calls this lazily, when a fresh annotation record is
/// synthesized and scoring is enabled in the config. A scorer failure must
/// never block annotation creation; the caller leaves the score absent.
pub trait AestheticScorer: Send + Sync {
    fn score(&self, image: &Path) -> Result<f32, Box<dyn std::error::Error + Send + Sync>>;
}
