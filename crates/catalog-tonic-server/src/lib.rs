#![doc = include_str!("../README.md")]

pub mod server;

pub use server::{Services, config::ServerConfig, run_server_with_incoming};
