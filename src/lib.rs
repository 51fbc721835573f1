pub mod agent;
pub mod bus;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod init;
pub mod popup;
pub mod stats;
