//! Channel error types.

use std::time::Duration;

use ringmend_core::{Classify, ErrorClass};
use thiserror::Error;

pub type ChannelResult<T> = Result<T, ChannelError>;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("{path} on {addr} timed out after {timeout:?}")]
    ReadTimeout {
        addr: String,
        path: String,
        timeout: Duration,
    },

    #[error("connection to {addr} broke: {message}")]
    Connection { addr: String, message: String },

    #[error("{path} returned HTTP {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    #[error("unexpected response from {path}: {message}")]
    Decode { path: String, message: String },

    #[error("{0} is not part of the cluster")]
    UnknownEndpoint(String),

    #[error("ssh authentication as {user}@{host} failed: {message}")]
    TunnelAuth {
        user: String,
        host: String,
        message: String,
    },

    #[error("tunnel to {host} unavailable: {message}")]
    TunnelUnavailable { host: String, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ChannelError {
    /// Failures that suggest the link itself is gone (refused, reset,
    /// connect timeout, dead tunnel). These trigger a tunnel rebuild.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            ChannelError::Connect { .. }
                | ChannelError::ConnectTimeout { .. }
                | ChannelError::Connection { .. }
                | ChannelError::TunnelUnavailable { .. }
        )
    }

    /// Whether the channel may retry this error.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transport
    }
}

impl Classify for ChannelError {
    fn class(&self) -> ErrorClass {
        match self {
            ChannelError::Connect { .. }
            | ChannelError::ConnectTimeout { .. }
            | ChannelError::ReadTimeout { .. }
            | ChannelError::Connection { .. }
            | ChannelError::TunnelUnavailable { .. } => ErrorClass::Transport,
            ChannelError::Status { .. } | ChannelError::Decode { .. } => ErrorClass::Protocol,
            ChannelError::UnknownEndpoint(_)
            | ChannelError::TunnelAuth { .. }
            | ChannelError::InvalidRequest(_) => ErrorClass::Configuration,
        }
    }
}
