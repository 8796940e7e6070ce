use std::io;
use std::path::PathBuf;
use std::time::Duration;

use http::StatusCode;

/// The broker could not be reached, or the exchange broke off midway.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to broker at {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("HTTP exchange with broker failed: {0}")]
    Http(#[from] hyper::Error),
    #[error("broker did not answer within {0:?}")]
    Timeout(Duration),
}

/// The broker answered, but not with what was asked for.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unexpected status code {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("undecodable broker response: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to build request: {0}")]
    Request(#[from] http::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    /// Status code returned by the broker, if it got that far.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Protocol(ProtocolError::Status { status, .. }) => Some(*status),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}

impl From<hyper::Error> for ClientError {
    fn from(err: hyper::Error) -> Self {
        ClientError::Transport(TransportError::Http(err))
    }
}

impl From<http::Error> for ClientError {
    fn from(err: http::Error) -> Self {
        ClientError::Protocol(ProtocolError::Request(err))
    }
}
