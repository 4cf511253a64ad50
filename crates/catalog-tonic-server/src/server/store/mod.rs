//! Concurrent stores backing the catalog service.
//!
//! Each store is a capability trait with a single implementation. Handlers
//! hold them as `Arc<dyn Trait>` so a persistent backend can be added as
//! another implementation without touching the service code.
//!
//! ## Structure
//!
//! - [`laptop`] - keyed laptop storage with a filtered scan.
//! - [`image`] - image blobs on disk plus in-memory metadata.
//! - [`rating`] - running score sums and counts per laptop.
//! - [`user`] - accounts and password hashes for login.
//!
//! All mutable maps sit behind a `parking_lot::RwLock`. Guards are never held
//! across an `.await`.

pub mod image;
pub mod laptop;
pub mod rating;
pub mod user;

pub use image::{DiskImageStore, ImageRecord, ImageStore, validate_image_type};
pub use laptop::{InMemoryLaptopStore, LaptopStore};
pub use rating::{InMemoryRatingStore, Rating, RatingStore};
pub use user::{InMemoryUserStore, User, UserStore, seed_users};
