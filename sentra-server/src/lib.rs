// sentra-server/src/lib.rs

pub mod protocol;
pub mod server;
pub mod session;

pub use protocol::{Operation, Request, Response, Status};
pub use server::Server;
pub use session::Session;
