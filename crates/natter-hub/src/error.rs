use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("unknown channel: {channel}")]
    UnknownChannel { channel: String },
}

pub type Result<T> = std::result::Result<T, HubError>;
