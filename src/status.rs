//! Decoded view of the co-processor's 4-byte status register.

/// POR flag in the operation-status byte
pub(crate) const POR_FLAG: u8 = 0x40;

/// "Command not complete" flag in the operation-status byte
pub(crate) const COMMAND_NOT_COMPLETE: u8 = 0x20;

/// Mask of the 5-bit operation sub-code
pub(crate) const SUB_CODE_MASK: u8 = 0x1F;

/// Don't-care bit in the free-input-bytes field, masked before any use
pub(crate) const FREE_DONT_CARE: u8 = 0x80;

/// Co-processor-busy flag in the fourth status byte
pub(crate) const BUSY_FLAG: u8 = 0x01;

// Operation sub-codes. The device is legitimately busy for a long time on
// NEEDS_MORE_TIME (key material generation and the like), so seeing it
// resets the poll iteration bound.
pub(crate) const SUB_NEEDS_MORE_TIME: u8 = 0x1D;
pub(crate) const SUB_FIRST_BIRTHDAY: u8 = 0x11;
pub(crate) const SUB_MASTER_ERASE: u8 = 0x12;
pub(crate) const SUB_RESPONSE_INCOMPLETE: u8 = 0x06;
pub(crate) const SUB_VM_INCOMPLETE: u8 = 0x07;
pub(crate) const SUB_COMMAND_COMPLETE: u8 = 0x05;

/// One poll's worth of device status, read fresh on every iteration and
/// never cached beyond it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-impl", derive(defmt::Format))]
pub struct StatusSnapshot {
    /// Free bytes in the device input buffer
    pub free_in: u8,
    /// Used bytes in the device output buffer
    pub used_out: u8,
    /// Raw operation-status byte (POR flag, not-complete flag, sub-code)
    pub op_status: u8,
    /// Raw co-processor-busy byte
    pub busy: u8,
}

impl StatusSnapshot {
    pub fn decode(raw: &[u8; 4]) -> Self {
        StatusSnapshot {
            free_in: raw[0] & !FREE_DONT_CARE,
            used_out: raw[1],
            op_status: raw[2],
            busy: raw[3],
        }
    }

    /// Device lost its internal power rail; nothing else in this snapshot
    /// is trustworthy until POR recovery ran
    pub fn por(&self) -> bool {
        self.op_status & POR_FLAG != 0
    }

    pub fn command_not_complete(&self) -> bool {
        self.op_status & COMMAND_NOT_COMPLETE != 0
    }

    pub fn sub_code(&self) -> u8 {
        self.op_status & SUB_CODE_MASK
    }

    pub fn coprocessor_busy(&self) -> bool {
        self.busy & BUSY_FLAG != 0
    }
}
