#![doc = include_str!("../README.md")]

pub mod auth;
pub mod client;
pub mod error;

pub use auth::{AuthAgent, AuthAgentLayer, AuthAgentService, Credentials, TokenCell};
pub use client::LaptopClient;
pub use error::{ClientError, Result};
