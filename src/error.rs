use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Message bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Peer error: {0}")]
    Peer(#[from] PeerError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Control surface error: {0}")]
    Control(#[from] ControlError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl WorkerError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Message bus failures
#[derive(Error, Debug, Clone)]
pub enum BusError {
    #[error("Failed to connect to bus at {address}: {details}")]
    Connect { address: String, details: String },

    #[error("Failed to open channel: {details}")]
    ChannelOpen { details: String },

    #[error("Failed to declare topic '{topic}': {details}")]
    Declare { topic: String, details: String },

    #[error("Failed to publish to '{topic}': {details}")]
    Publish { topic: String, details: String },

    #[error("Publish to '{topic}' timed out after {timeout:?}")]
    Timeout { topic: String, timeout: Duration },

    #[error("Bus connection closed")]
    Closed,

    #[error("Failed to close bus connection: {details}")]
    Close { details: String },
}

/// Outbound peer call failures
#[derive(Error, Debug, Clone)]
pub enum PeerError {
    #[error("Failed to build HTTP client: {details}")]
    Client { details: String },

    #[error("Request to {url} failed: {details}")]
    Transport { url: String, details: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },
}

/// Process runtime failures during fleet teardown
#[derive(Error, Debug, Clone)]
pub enum LifecycleError {
    #[error("Process runtime unavailable: {details}")]
    RuntimeUnavailable { details: String },

    #[error("Failed to list processes: {details}")]
    ListFailed { details: String },

    #[error("Failed to stop process {name} ({id}): {details}")]
    StopFailed {
        id: String,
        name: String,
        details: String,
    },
}

/// Service-name resolution failures
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    #[error("No address found for service: {service}")]
    NotFound { service: String },

    #[error("Lookup for service {service} failed: {details}")]
    Lookup { service: String, details: String },
}

/// Control surface failures
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Failed to bind control surface to {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Control surface stopped: {details}")]
    ServerFailed { details: String },
}

pub type Result<T> = std::result::Result<T, WorkerError>;
