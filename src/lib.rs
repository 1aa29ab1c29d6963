pub mod cluster;
pub mod config;
pub mod error;
pub mod handler;
pub mod queue;
pub mod store;
pub mod worker;
