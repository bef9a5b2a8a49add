use crate::error::{FieldEngineError, Result};
use crate::structs::*;
use rand_core::RngCore;
use rand_pcg::Pcg32;

/// Parameters of an [`UIntEngine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UIntEngineParams {
    /// Size of the field in bytes, one of 1, 2, 4 or 8
    pub size: u16,
    /// Offset of the field in the packet
    pub offset: u16,
    pub op: Operation,
    /// Step of the increment or decrement. Ignored by `Operation::Rand`
    pub step: u64,
    pub min_value: u64,
    pub max_value: u64,
    /// First value written. 0 means "start at `min_value`"
    pub init_value: u64,
}

impl UIntEngineParams {
    fn validate(&self) -> Result<()> {
        if self.min_value > self.max_value {
            return Err(FieldEngineError::InvalidConfig(format!(
                "Min value {} is bigger than max value {}",
                self.min_value, self.max_value
            )));
        }
        if self.init_value != 0
            && (self.init_value < self.min_value || self.init_value > self.max_value)
        {
            return Err(FieldEngineError::InvalidConfig(format!(
                "Init value {} must be between [{} - {}]",
                self.init_value, self.min_value, self.max_value
            )));
        }
        let max_possible = max_for_size(self.size).ok_or_else(|| {
            FieldEngineError::InvalidConfig(format!(
                "Invalid size {}. Size should be one of {UINT_SIZES:?}",
                self.size
            ))
        })?;
        if self.max_value > max_possible {
            return Err(FieldEngineError::InvalidConfig(format!(
                "Max value {} cannot be represented with size {}",
                self.max_value, self.size
            )));
        }
        Ok(())
    }
}

/// Generates unsigned integers of 1, 2, 4 or 8 bytes, written in network byte order.
///
/// The next value is obtained by incrementing or decrementing the current one
/// with wraparound inside `[min_value, max_value]`, or by a uniform draw in that domain.
#[derive(Debug, Clone)]
pub struct UIntEngine {
    par: UIntEngineParams,
    curr_value: u64,
    /// Number of values of the domain. The full u64 domain is approximated by u64::MAX
    domain_len: u64,
    rng: Pcg32,
}

impl UIntEngine {
    pub fn new(mut par: UIntEngineParams, rng: Pcg32) -> Result<Self> {
        par.validate()?;
        let mut domain_len = (par.max_value - par.min_value).wrapping_add(1);
        if domain_len == 0 {
            // min = 0 and max = u64::MAX: the length does not fit in a u64
            domain_len = u64::MAX;
        }
        if par.step > domain_len {
            par.step %= domain_len;
        }
        let curr_value = par.min_value.max(par.init_value);
        log::debug!(
            "UInt engine at offset {}: {} bytes, {} by {} in [{}, {}]",
            par.offset,
            par.size,
            par.op,
            par.step,
            par.min_value,
            par.max_value
        );
        Ok(UIntEngine {
            par,
            curr_value,
            domain_len,
            rng,
        })
    }

    /// The value the next call to `update` will write
    pub fn current_value(&self) -> u64 {
        self.curr_value
    }

    pub fn params(&self) -> &UIntEngineParams {
        &self.par
    }

    fn inc_value(&mut self) {
        // curr_value <= max_value so this cannot underflow
        let left = self.par.max_value - self.curr_value;
        if self.par.step <= left {
            self.curr_value += self.par.step;
        } else {
            // step > left so step - left - 1 cannot underflow. Wrapping consumes one unit.
            self.curr_value = self.par.min_value + (self.par.step - left - 1);
        }
    }

    fn dec_value(&mut self) {
        let left = self.curr_value - self.par.min_value;
        if self.par.step <= left {
            self.curr_value -= self.par.step;
        } else {
            self.curr_value = self.par.max_value - (self.par.step - left - 1);
        }
    }

    fn rand_value(&mut self) {
        // not cryptographically secure and slightly biased unless domain_len divides 2^64
        self.curr_value = self.par.min_value + (self.rng.next_u64() % self.domain_len);
    }

    fn perform_op(&mut self) {
        match self.par.op {
            Operation::Inc => self.inc_value(),
            Operation::Dec => self.dec_value(),
            Operation::Rand => self.rand_value(),
        }
    }
}

impl FieldEngine for UIntEngine {
    fn update(&mut self, b: &mut [u8]) -> Result<()> {
        check_len(b, self.par.size)?;
        let size = self.par.size as usize;
        // the value fits in `size` bytes, so only the low-order bytes are kept
        let bytes = self.curr_value.to_be_bytes();
        b[..size].copy_from_slice(&bytes[bytes.len() - size..]);
        log::trace!("Offset {}: wrote {}", self.par.offset, self.curr_value);
        self.perform_op();
        Ok(())
    }

    fn offset(&self) -> u16 {
        self.par.offset
    }

    fn size(&self) -> u16 {
        self.par.size
    }
}
