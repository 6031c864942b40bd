pub mod config;
pub mod error;
pub mod types;

pub use config::NatterConfig;
pub use error::NatterError;
pub use types::{ConnId, Message};
