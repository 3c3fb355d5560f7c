pub mod auth;
pub mod chat;
pub mod connection;
pub mod dispatcher;
pub mod fanout;
pub mod rooms;

pub use chat::ChatRelay;
pub use dispatcher::Dispatcher;
pub use fanout::Notifier;
