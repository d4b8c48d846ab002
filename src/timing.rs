/// Smallest run-time code the host can grant
pub const MIN_RUNTIME_CODE: u8 = 0;

/// Largest run-time code the host can grant (the field is 4 bits wide)
pub const MAX_RUNTIME_CODE: u8 = 15;

/// Electrical floor for the base delay in milliseconds
pub const MIN_BASE_MS: u32 = 63;

/// Electrical floor for the per-code increment in milliseconds
pub const MIN_INCREMENT_MS: u32 = 250;

/// Error type
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-impl", derive(defmt::Format))]
pub enum TimingError {
    BaseTooSmall(u32),
    IncrementTooSmall(u32),
}

/// Maps the coarse 4-bit run-time code to a real wait duration
///
/// `to_millis(code) = code * increment + base`. The two knobs are shared
/// by a whole part family (the silicon shares electrical timing margins),
/// so a [`Link`](crate::Link) takes one `Timing` at construction and uses
/// it for every subsequent wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-impl", derive(defmt::Format))]
pub struct Timing {
    base_ms: u32,
    increment_ms: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            base_ms: MIN_BASE_MS,
            increment_ms: MIN_INCREMENT_MS,
        }
    }
}

impl Timing {
    pub fn to_millis(&self, code: u8) -> u32 {
        let code = code.min(MAX_RUNTIME_CODE) as u32;
        code * self.increment_ms + self.base_ms
    }

    pub fn base_ms(&self) -> u32 {
        self.base_ms
    }

    pub fn increment_ms(&self) -> u32 {
        self.increment_ms
    }

    pub fn set_base_ms(&mut self, ms: u32) -> Result<(), TimingError> {
        if ms < MIN_BASE_MS {
            return Err(TimingError::BaseTooSmall(ms));
        }
        self.base_ms = ms;
        Ok(())
    }

    pub fn set_increment_ms(&mut self, ms: u32) -> Result<(), TimingError> {
        if ms < MIN_INCREMENT_MS {
            return Err(TimingError::IncrementTooSmall(ms));
        }
        self.increment_ms = ms;
        Ok(())
    }
}
