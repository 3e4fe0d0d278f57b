use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The upstream registry (or an informer source) could not be reached
    #[error("Attempt to connect to upstream registry failed: {0}")]
    Connectivity(String),

    /// A well-formed call to the upstream registry failed
    #[error("Attempt to pass through from nsm to upstream registry failed: {0}")]
    UpstreamRpc(String),

    /// Local model or cache bookkeeping failed
    #[error("Local state error: {0}")]
    LocalState(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl CoreError {
    /// True when the upstream registry already applied the operation and only
    /// local bookkeeping is out of date. Retrying such a call is not needed
    /// for the remote side.
    pub fn remote_committed(&self) -> bool {
        matches!(self, CoreError::LocalState(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_committed_only_for_local_state() {
        assert!(CoreError::LocalState("x".into()).remote_committed());
        assert!(!CoreError::Connectivity("x".into()).remote_committed());
        assert!(!CoreError::UpstreamRpc("x".into()).remote_committed());
        assert!(!CoreError::Configuration("x".into()).remote_committed());
    }

    #[test]
    fn test_error_display() {
        let err = CoreError::UpstreamRpc("deadline exceeded".into());
        assert_eq!(
            err.to_string(),
            "Attempt to pass through from nsm to upstream registry failed: deadline exceeded"
        );
    }
}
