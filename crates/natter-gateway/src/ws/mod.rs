pub mod connection;
pub mod feed;
pub mod handlers;
pub mod send;
