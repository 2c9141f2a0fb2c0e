pub mod connection;
pub mod lifecycle;
pub mod observable;
pub mod types;
