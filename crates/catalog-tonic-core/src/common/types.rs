//! # Shared Catalog Types and Constants
//!
//! Constants and small domain helpers that client and server must agree on:
//!
//! - Fully-qualified gRPC method paths, used by the server auth gate and the
//!   client auth agent to decide which calls carry a token.
//! - [`AUTHORIZATION_KEY`], the metadata key holding the raw access token.
//! - [`MAX_IMAGE_SIZE`], the upper bound on an accumulated image upload.
//! - Memory-unit normalization ([`Memory::to_bits`]) and the search predicate
//!   ([`Filter::matches`]).

use crate::proto::{Filter, Laptop, Memory, memory::Unit};

/// Path of the unary login call.
pub const LOGIN: &str = "/catalog.AuthService/Login";
/// Path of the unary create call.
pub const CREATE_LAPTOP: &str = "/catalog.LaptopService/CreateLaptop";
/// Path of the server-streaming search call.
pub const SEARCH_LAPTOP: &str = "/catalog.LaptopService/SearchLaptop";
/// Path of the client-streaming upload call.
pub const UPLOAD_IMAGE: &str = "/catalog.LaptopService/UploadImage";
/// Path of the bidirectional rating call.
pub const RATE_LAPTOP: &str = "/catalog.LaptopService/RateLaptop";

/// Metadata key carrying the raw signed token (no scheme prefix).
pub const AUTHORIZATION_KEY: &str = "authorization";

/// Maximum accumulated size of a single image upload (1 MiB).
pub const MAX_IMAGE_SIZE: usize = 1 << 20;

/// Role names used in tokens and the static access table.
pub mod roles {
    pub const ADMIN: &str = "admin";
    pub const USER: &str = "user";
}

impl Memory {
    /// Builds a memory value in the given unit.
    pub fn new(value: u64, unit: Unit) -> Self {
        Self {
            value,
            unit: unit as i32,
        }
    }

    /// Normalizes the value to bits.
    ///
    /// Every unit is an exact power-of-two multiple of `BIT`. Values that would
    /// not fit in a `u64` saturate, and an unknown unit counts as zero bits.
    pub fn to_bits(&self) -> u64 {
        let shift = match self.unit() {
            Unit::Unknown => return 0,
            Unit::Bit => 0,
            Unit::Byte => 3,
            Unit::Kilobyte => 13,
            Unit::Megabyte => 23,
            Unit::Gigabyte => 33,
            Unit::Terabyte => 43,
        };
        self.value.saturating_mul(1_u64 << shift)
    }
}

impl Filter {
    /// Returns `true` when `laptop` satisfies every bound of the filter.
    ///
    /// A laptop qualifies when its price is at most `max_price_usd`, its CPU
    /// has at least `min_cpu_cores` cores and a base clock of at least
    /// `min_cpu_ghz`, and its RAM (in bits) is at least `min_ram`. Missing
    /// hardware sections compare as zero.
    pub fn matches(&self, laptop: &Laptop) -> bool {
        if laptop.price_usd > self.max_price_usd {
            return false;
        }

        let (cores, min_ghz) = laptop
            .cpu
            .as_ref()
            .map_or((0, 0.0), |cpu| (cpu.number_cores, cpu.min_ghz));
        if cores < self.min_cpu_cores || min_ghz < self.min_cpu_ghz {
            return false;
        }

        let ram = laptop.ram.as_ref().map_or(0, Memory::to_bits);
        let min_ram = self.min_ram.as_ref().map_or(0, Memory::to_bits);
        ram >= min_ram
    }
}
