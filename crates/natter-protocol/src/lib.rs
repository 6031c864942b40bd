pub mod frames;
pub mod hello;
pub mod methods;

pub use frames::{ErrorShape, EventFrame, InboundFrame, ReqFrame, ResFrame};
pub use hello::{ClientPolicy, Hello, ServerInfo};
