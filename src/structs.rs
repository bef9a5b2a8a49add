use crate::error::{FieldEngineError, Result};
use serde::Deserialize;
use std::fmt::{Debug, Display};
use std::str::FromStr;

/// Byte widths an unsigned field can have.
pub const UINT_SIZES: [u16; 4] = [1, 2, 4, 8];

/// A field engine writes the value of one field of a packet.
///
/// The caller uses `offset` and `size` to find the region of the packet the
/// engine is responsible for, then gives that region to `update`.
pub trait FieldEngine: Debug + Send {
    /// Write exactly `size()` bytes at the start of `b`, then prepare the next value.
    /// Fails without writing anything if `b` is shorter than `size()`.
    fn update(&mut self, b: &mut [u8]) -> Result<()>;

    /// Offset of the field in the packet
    fn offset(&self) -> u16;

    /// Size in bytes of the field
    fn size(&self) -> u16;
}

/// How an unsigned engine moves from one value to the next
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operation {
    /// Add the step, wrapping to the minimum
    #[default]
    #[serde(rename = "inc")]
    Inc,
    /// Subtract the step, wrapping to the maximum
    #[serde(rename = "dec")]
    Dec,
    /// Draw uniformly in the domain
    #[serde(rename = "rand")]
    Rand,
}

impl FromStr for Operation {
    type Err = FieldEngineError;

    fn from_str(s: &str) -> Result<Operation> {
        match s {
            "inc" => Ok(Operation::Inc),
            "dec" => Ok(Operation::Dec),
            "rand" => Ok(Operation::Rand),
            _ => Err(FieldEngineError::InvalidConfig(format!(
                "Unsupported operation {s}"
            ))),
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operation::Inc => "inc",
            Operation::Dec => "dec",
            Operation::Rand => "rand",
        };
        write!(f, "{s}")
    }
}

/// Largest value that fits in `size` bytes, if `size` is a valid unsigned width
pub fn max_for_size(size: u16) -> Option<u64> {
    match size {
        1 => Some(u8::MAX as u64),
        2 => Some(u16::MAX as u64),
        4 => Some(u32::MAX as u64),
        8 => Some(u64::MAX),
        _ => None,
    }
}

/// Check that `b` can hold `size` bytes
pub(crate) fn check_len(b: &[u8], size: u16) -> Result<()> {
    if b.len() < size as usize {
        Err(FieldEngineError::BufferTooShort {
            want: size as usize,
            have: b.len(),
        })
    } else {
        Ok(())
    }
}
