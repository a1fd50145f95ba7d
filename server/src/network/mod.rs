//! Client connections.

pub mod codec;
mod server;

pub use server::Server;
