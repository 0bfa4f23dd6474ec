use std::io;

use thiserror::Error;

// Everything that can go wrong between "here is a URL" and "here is a response".
#[derive(Debug, Error)]
pub enum ClientError {
    // Caller error: raised before any socket is opened.
    #[error("URL not permitted: {url}")]
    NotPermitted { url: String },

    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("timed out after {seconds}s talking to {host}")]
    Timeout { host: String, seconds: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("cannot load trust anchors from {path}: {reason}")]
    InvalidCertificates { path: String, reason: String },

    #[error("invalid TLS server name {0:?}")]
    InvalidServerName(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("response body was already read")]
    BodyAlreadyRead,
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }
}

/*
Read and write timeouts surface as TimedOut on most platforms but as WouldBlock on
some (the socket is non-blocking under the hood). Both mean the same thing here.
*/
pub(crate) fn is_timeout_kind(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}
