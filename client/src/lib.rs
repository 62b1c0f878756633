pub mod types;

// io
pub mod input_handler;

// connection core
pub mod builder;
pub mod client;
pub mod error;

// inbound interpretation
pub mod dispatcher;
pub mod roster;
