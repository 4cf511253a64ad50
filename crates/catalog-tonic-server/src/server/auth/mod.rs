//! Token issuance and server-side authorization.
//!
//! - [`token`] - [`JwtManager`] signs and verifies HS256 access tokens.
//! - [`gate`] - [`AuthGate`] checks the token and role of every call against a
//!   static method table and is mounted on the router as [`AuthGateLayer`].

pub mod gate;
pub mod token;

pub use gate::{AuthGate, AuthGateLayer, AuthGateService};
pub use token::{Claims, JwtManager};
