use std::error::Error;
use std::fmt;

/// Failure taxonomy for the benchmark engine. Carried through `anyhow` and
/// downcast again at the HTTP boundary to pick a status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BenchError {
    /// Missing required field or out-of-range config value.
    BadInput(String),
    /// Referenced descriptor, run or suite does not exist.
    NotFound(String),
    /// The inference backend cannot be reached.
    BackendUnavailable(String),
    /// The backend rejected a load request.
    LoadFailed(String),
    /// Health probe failed after the one-shot reload retry.
    ModelUnhealthy(String),
    /// No LoadedModelInfo is cached for the descriptor.
    ModelNotReady(String),
}

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchError::BadInput(msg) => write!(f, "bad input: {}", msg),
            BenchError::NotFound(what) => write!(f, "{} not found", what),
            BenchError::BackendUnavailable(msg) => {
                write!(f, "inference backend unavailable: {}", msg)
            }
            BenchError::LoadFailed(msg) => write!(f, "model load failed: {}", msg),
            BenchError::ModelUnhealthy(msg) => write!(f, "model unhealthy: {}", msg),
            BenchError::ModelNotReady(id) => {
                write!(f, "model {} is not loaded on the backend", id)
            }
        }
    }
}

impl Error for BenchError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_survives_anyhow_roundtrip() {
        let err = anyhow::Error::new(BenchError::NotFound("run abc".to_string()));
        let downcast = err.downcast_ref::<BenchError>();
        assert_eq!(downcast, Some(&BenchError::NotFound("run abc".to_string())));
    }
}
