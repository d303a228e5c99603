pub mod events;
pub mod network;
pub mod server;
pub mod stats;
