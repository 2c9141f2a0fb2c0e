//! Wire protocol and room configuration shared by the aggregator and clients.

pub mod config;
pub mod protocol;
