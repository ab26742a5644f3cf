use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid NID: {0}")]
    InvalidNid(String),

    #[error("Invalid radius: {0}")]
    InvalidRadius(String),

    #[error("Invalid group type: {0}")]
    InvalidGroupType(String),

    #[error("Invalid message type: {0}")]
    InvalidMessageType(String),

    #[error("Invalid inbox status: {0}")]
    InvalidInboxStatus(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// No inbox entry exists for the requested (device, message) pair
    #[error("Not found: {0}")]
    NotFound(String),

    /// Candidate selection or inbox population could not reach persistence
    #[error("Routing unavailable: {0}")]
    RoutingUnavailable(String),

    #[error("Webhook transport failure: {0}")]
    TransportFailure(String),

    #[error("Delivery retries exhausted: {0}")]
    RetryExhausted(String),

    #[error("Delivery queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}
