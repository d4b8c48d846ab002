/// Overdrive match-ROM command, first byte of every device-select prefix
pub(crate) const SELECT_COMMAND: u8 = 0x69;

/// Link-layer commands of the secure co-processor
///
/// Each command carries exactly one valid release-code trailer, a fixed
/// magic constant acting as a lightweight anti-noise check. The device
/// answers a command whose trailer it did not recognize by releasing the
/// line on the next bit read ("not understood"), the protocol's only
/// in-band NACK.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-impl", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    WriteHeader = 0x0F,
    ReadHeader = 0xAA,
    WriteData = 0x2D,
    ReadData = 0x22,
    WriteStatus = 0xD2,
    ReadStatus = 0xE1,
    Run = 0x87,
    Interrupt = 0x77,
    ResetMicro = 0xDD,
}

impl Command {
    pub fn op_code(&self) -> u8 {
        *self as _
    }

    /// Fixed release-code trailer for this command
    pub fn release_code(&self) -> &'static [u8] {
        match self {
            Command::WriteHeader => &[0x51, 0x07],
            Command::ReadHeader => &[0x51, 0x4B],
            Command::WriteData => &[0x6D, 0x43, 0x96],
            Command::ReadData => &[0x6D, 0x2C, 0x69],
            Command::WriteStatus => &[0x9D, 0x3A],
            Command::ReadStatus => &[0x9D, 0xC5],
            Command::Run => &[0x44, 0x96],
            Command::Interrupt => &[0x44, 0x72],
            Command::ResetMicro => &[0xBB, 0x21],
        }
    }

    /// Whether the exchange drives a timed strong pull-up afterwards
    pub fn power_mode(&self) -> bool {
        matches!(self, Command::Run | Command::Interrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_sequences_are_three_bytes() {
        // opcode plus release trailer, sent as one frame
        assert_eq!(1 + Command::Run.release_code().len(), 3);
        assert_eq!(1 + Command::Interrupt.release_code().len(), 3);
        assert_eq!(1 + Command::ResetMicro.release_code().len(), 3);
    }

    #[test]
    fn only_run_and_interrupt_use_power_mode() {
        assert!(Command::Run.power_mode());
        assert!(Command::Interrupt.power_mode());
        assert!(!Command::ResetMicro.power_mode());
        assert!(!Command::WriteData.power_mode());
    }
}
