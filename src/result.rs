use core::fmt::Debug;

/// Error type
///
/// Everything surviving the orchestrator's three transfer attempts is
/// re-raised to the caller unchanged; device containers should treat any
/// of these as a generic bus-communication failure.
#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "defmt-impl", derive(defmt::Format))]
pub enum Error<E: Sized + Debug> {
    /// Device did not answer its select sequence, even after speed renegotiation
    DeviceNotFound,
    /// The bus is not at the overdrive speed the co-processor requires
    WrongSpeed,
    /// Block or status CRC failed even after drift compensation (computed, expected)
    CrcMismatch(u16, u16),
    /// Power-on-reset observed with the per-transfer recovery already consumed
    PorUncorrected,
    /// Poll loop exhausted its iteration bound
    Unrecoverable,
    /// Device input buffer has no room for another block header
    NoRoomInBuffer,
    /// Expected a block header in the device output buffer, found none
    NoHeader,
    /// Device output buffer holds something other than one block header
    BadHeader(u8),
    /// Device flagged the command byte as not understood
    CommandNotUnderstood,
    /// Transfers carry at least one payload byte
    EmptyPayload,
    /// Payload exceeds what the block sequence numbering can address
    PayloadTooLong(usize),
    /// Caller-provided reply buffer is too small for the reassembled payload
    ReplyOverflow,
    PortError(E),
}

impl<E: Sized + Debug> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::PortError(e)
    }
}
