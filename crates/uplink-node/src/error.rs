//! uplink-node エラー型とプロセス終了コード

use thiserror::Error;
use uplink_session::SessionError;

/// プロセス終了コード
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 3;
    pub const NETWORK: i32 = 4;
    /// デバイスリセット要求（EX_TEMPFAIL）。スーパーバイザが再起動する
    pub const RESET: i32 = 75;
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config loading failed: {0}")]
    Config(Box<figment::Error>),

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("invalid reading: {reason}")]
    InvalidReading { reason: String },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<figment::Error> for NodeError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl NodeError {
    pub fn exit_code(&self) -> i32 {
        match self {
            NodeError::Config(_) | NodeError::Validation { .. } => exit_code::CONFIG,
            NodeError::Session(SessionError::InvalidConfig { .. }) => exit_code::CONFIG,
            NodeError::Session(SessionError::Resolve { .. }) => exit_code::NETWORK,
            NodeError::InvalidReading { .. } | NodeError::Io(_) | NodeError::Json(_) => {
                exit_code::GENERAL
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use uplink_transport::ResolveError;

    use super::*;

    #[test]
    fn test_exit_codes() {
        let resolve = NodeError::from(SessionError::Resolve {
            host: "feed.example.com".into(),
            source: ResolveError::NoAddress {
                host: "feed.example.com".into(),
            },
        });
        assert_eq!(resolve.exit_code(), exit_code::NETWORK);

        let invalid = NodeError::Validation {
            field: "step_interval_ms".into(),
            reason: "must be non-zero".into(),
        };
        assert_eq!(invalid.exit_code(), exit_code::CONFIG);
        assert_eq!(invalid.to_string(), "invalid step_interval_ms: must be non-zero");
    }
}
