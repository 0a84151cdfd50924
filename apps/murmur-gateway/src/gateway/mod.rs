pub mod events;
pub mod fanout;
pub mod handler;
pub mod lifecycle;
pub mod presence;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
