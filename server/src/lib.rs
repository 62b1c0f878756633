pub mod delivery;
pub mod registry;
pub mod server_channel;
pub mod server_listener;
pub mod server_types;
pub mod session_handler;
