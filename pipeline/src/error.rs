use thiserror::Error;

use common::ConfigError;
use engine::LexiconError;
use market::ProviderError;

/// Startup failures. Nothing in a running batch produces one of these.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to load lexicon: {0}")]
    Lexicon(#[from] LexiconError),

    #[error("failed to build market data provider: {0}")]
    Provider(#[from] ProviderError),
}
