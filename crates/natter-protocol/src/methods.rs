// Well-known WS method names.

// channels
pub const SUBSCRIBE: &str = "subscribe";
pub const UNSUBSCRIBE: &str = "unsubscribe";
pub const CHANNELS_LIST: &str = "channels.list";

// messages
pub const MESSAGE_SEND: &str = "message.send";
pub const HISTORY: &str = "history";

// liveness
pub const PING: &str = "ping";

// Server-push event names.
pub const EVENT_HELLO: &str = "hello";
pub const EVENT_MESSAGE: &str = "message";
pub const EVENT_GAP: &str = "subscription.gap";
