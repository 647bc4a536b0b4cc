use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("upstream unavailable at {stage}: {reason}")]
    UpstreamUnavailable { stage: &'static str, reason: String },
}

impl RetrievalError {
    pub fn upstream(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            stage,
            reason: reason.into(),
        }
    }
}
