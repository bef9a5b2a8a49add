//! Field engines for synthetic packet generation.
//! A field engine owns one fixed-offset, fixed-size region of a packet and writes a new
//! value in it each time a packet is generated: counters that wrap around, values drawn
//! from a weighted histogram, etc. Multi-byte integers are always written in network byte order.
//!
//! Every engine owns its random generator, so two engines built with the same seed
//! produce the same sequence.

/// Field engine trait and shared types
pub mod structs;

/// Error type
pub mod error;

/// Unsigned integer engine
pub mod uint;

/// Weighted random engine and its entries
pub mod histogram;

/// Import of engines from a TOML configuration
pub mod config;

#[doc(inline)]
pub use structs::*;

pub use config::{import_config, FieldEngines};
pub use error::{FieldEngineError, Result};
pub use histogram::{HistogramEngine, HistogramEngineParams, HistogramEntry};
pub use uint::{UIntEngine, UIntEngineParams};
