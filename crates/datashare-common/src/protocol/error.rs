use thiserror::Error;

/// Errors surfaced by the DataShare protocol layers.
///
/// The variants follow the propagation rules of the protocol:
///
/// - `Parameter` and `CorruptEncoding` are detected locally and never cross
///   the transport boundary.
/// - `Transport`, `ServiceUnavailable`, `PeerDied`, `Timeout` and `Io` mean the
///   round-trip itself did not complete (see [`DataShareError::is_transport`]).
/// - `Provider` carries a business-level failure code reported by the remote
///   side after it executed the request.
/// - `Registry` describes a single per-URI subscription failure. Batch calls
///   report these as codes inside `OperationResult` instead of failing the call.
#[derive(Error, Debug)]
pub enum DataShareError {
    #[error("Parameter error: {0}")]
    Parameter(String),

    #[error("Corrupt encoding: {0}")]
    CorruptEncoding(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Service unavailable after {attempts} attempts")]
    ServiceUnavailable { attempts: u32 },

    #[error("Remote peer died")]
    PeerDied,

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Provider returned error code {0}")]
    Provider(i32),

    #[error("Unknown command {0}")]
    UnknownCommand(u32),

    #[error("Subscription error for {uri}: code {code}")]
    Registry { uri: String, code: i32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataShareError {
    /// Shorthand for building a `CorruptEncoding` error.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        DataShareError::CorruptEncoding(msg.into())
    }

    /// Returns true when the error means the transport round-trip failed.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DataShareError::Transport(_)
                | DataShareError::ServiceUnavailable { .. }
                | DataShareError::PeerDied
                | DataShareError::Timeout(_)
                | DataShareError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DataShareError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_grouping() {
        assert!(DataShareError::Transport("x".into()).is_transport());
        assert!(DataShareError::ServiceUnavailable { attempts: 3 }.is_transport());
        assert!(DataShareError::PeerDied.is_transport());
        assert!(DataShareError::Timeout(5000).is_transport());
        assert!(!DataShareError::Provider(-2).is_transport());
        assert!(!DataShareError::corrupt("bad tag").is_transport());
        assert!(!DataShareError::Parameter("empty uri".into()).is_transport());
    }

    #[test]
    fn test_display_messages() {
        let err = DataShareError::ServiceUnavailable { attempts: 3 };
        assert_eq!(err.to_string(), "Service unavailable after 3 attempts");

        let err = DataShareError::Registry { uri: "datashare:///a".into(), code: 3 };
        assert_eq!(err.to_string(), "Subscription error for datashare:///a: code 3");
    }
}
