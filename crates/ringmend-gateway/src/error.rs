use ringmend_channel::ChannelError;
use ringmend_core::{Classify, ErrorClass};
use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("{operation}: {message}")]
    Payload {
        operation: &'static str,
        message: String,
    },
}

impl Classify for GatewayError {
    fn class(&self) -> ErrorClass {
        match self {
            GatewayError::Channel(e) => e.class(),
            GatewayError::Payload { .. } => ErrorClass::Protocol,
        }
    }
}
