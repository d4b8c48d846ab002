//! Framed command exchange with the co-processor.
//!
//! Every link command travels as one contiguous block: a 9-byte device
//! select prefix, the command byte, an optional command payload and the
//! command's fixed release-code trailer. The block primitive is full
//! duplex, so read-back commands are just writes with all-ones payload
//! slots that the device overwrites.

use crate::adapter::{Adapter, Container, PowerDuration, PowerTrigger, Speed};
use crate::address::Address;
use crate::command::{Command, SELECT_COMMAND};
use crate::crc::{check_crc16, compute_partial_crc16, GOOD_CRC16_RESIDUAL};
use crate::fragment::{FrameHeader, HEADER_LEN, MAX_BLOCK_DATA};
use crate::result::Error;
use crate::status::{StatusSnapshot, FREE_DONT_CARE};
use crate::timing::{Timing, MAX_RUNTIME_CODE};
use embedded_hal::delay::DelayNs;

/// Select prefix + command byte + length byte + block payload + trailer
const MAX_FRAME: usize = 1 + Address::BYTES as usize + 1 + 1 + MAX_BLOCK_DATA + 3;

/// Offset of the command payload inside a frame
const PAYLOAD_OFFSET: usize = 1 + Address::BYTES as usize + 1;

/// One transfer's view of the bus: adapter, container and delay are
/// borrowed from the caller for the duration of a single link operation,
/// so there is no driver-owned bus state to lock
pub(crate) struct Bus<'a, A: Adapter, C: Container<A>, D: DelayNs> {
    pub adapter: &'a mut A,
    pub container: &'a mut C,
    pub delay: &'a mut D,
    pub address: &'a Address,
    pub timing: &'a Timing,
}

impl<'a, A: Adapter, C: Container<A>, D: DelayNs> Bus<'a, A, C, D> {
    /// Reset and transmit one assembled frame, recovering from a bus
    /// glitch at most once: drop to regular speed, let the container
    /// renegotiate, reset and retry the block before propagating
    fn send_frame(&mut self, frame: &mut [u8]) -> Result<(), Error<A::Error>> {
        if frame[0] != SELECT_COMMAND {
            link_warn!("select byte was {:x}, forcing {:x}", frame[0], SELECT_COMMAND);
            frame[0] = SELECT_COMMAND;
        }

        let first_try = self
            .adapter
            .reset()
            .and_then(|_| self.adapter.data_block(frame));
        if first_try.is_ok() {
            return Ok(());
        }

        self.adapter.reset()?;
        self.adapter.set_speed(Speed::Regular)?;
        self.container.renegotiate_speed(self.adapter)?;
        self.adapter.reset()?;
        self.adapter.data_block(frame)?;
        Ok(())
    }

    /// Exchange one command and refresh `payload` with the bus reply.
    /// Power-mode commands hold a strong pull-up for `sleep_ms` after the
    /// frame; all commands sample one bit to catch the device's
    /// "not understood" answer.
    fn exchange(
        &mut self,
        command: Command,
        payload: &mut [u8],
        sleep_ms: u32,
    ) -> Result<(), Error<A::Error>> {
        let release = command.release_code();
        let total = PAYLOAD_OFFSET + payload.len() + release.len();
        if total > MAX_FRAME {
            return Err(Error::PayloadTooLong(payload.len()));
        }

        let mut frame = [0u8; MAX_FRAME];
        frame[0] = SELECT_COMMAND;
        frame[1..1 + Address::BYTES as usize].copy_from_slice(self.address.as_ref());
        frame[PAYLOAD_OFFSET - 1] = command.op_code();
        frame[PAYLOAD_OFFSET..PAYLOAD_OFFSET + payload.len()].copy_from_slice(payload);
        frame[PAYLOAD_OFFSET + payload.len()..total].copy_from_slice(release);
        let frame = &mut frame[..total];

        self.send_frame(frame)?;

        if command.power_mode() {
            let duration = if self.adapter.can_deliver_smart_power() {
                PowerDuration::SmartDone
            } else {
                PowerDuration::Infinite
            };
            self.adapter.set_power_duration(duration)?;
            self.adapter.start_power_delivery(PowerTrigger::AfterNextBit)?;
            if self.adapter.get_bit()? {
                self.adapter.set_power_normal()?;
                return Err(Error::CommandNotUnderstood);
            }
            self.delay.delay_us(sleep_ms.saturating_mul(1_000));
            self.adapter.set_power_normal()?;
        } else if self.adapter.get_bit()? {
            return Err(Error::CommandNotUnderstood);
        }

        let len = payload.len();
        payload.copy_from_slice(&frame[PAYLOAD_OFFSET..PAYLOAD_OFFSET + len]);
        Ok(())
    }

    pub fn write_header(&mut self, header: &FrameHeader) -> Result<(), Error<A::Error>> {
        let mut raw = header.to_bytes();
        self.exchange(Command::WriteHeader, &mut raw, 0)
    }

    pub fn read_header(&mut self) -> Result<FrameHeader, Error<A::Error>> {
        let mut raw = [0xFFu8; HEADER_LEN];
        self.exchange(Command::ReadHeader, &mut raw, 0)?;
        Ok(FrameHeader::from_bytes(&raw))
    }

    pub fn write_data(&mut self, data: &[u8]) -> Result<(), Error<A::Error>> {
        if data.len() > MAX_BLOCK_DATA {
            return Err(Error::PayloadTooLong(data.len()));
        }
        let mut buf = [0u8; MAX_BLOCK_DATA + 1];
        buf[0] = data.len() as u8;
        buf[1..1 + data.len()].copy_from_slice(data);
        self.exchange(Command::WriteData, &mut buf[..1 + data.len()], 0)
    }

    /// Read `out.len()` data bytes of the current reply block
    pub fn read_data(&mut self, out: &mut [u8]) -> Result<(), Error<A::Error>> {
        if out.len() > MAX_BLOCK_DATA {
            return Err(Error::PayloadTooLong(out.len()));
        }
        let mut buf = [0xFFu8; MAX_BLOCK_DATA + 1];
        buf[0] = out.len() as u8;
        let len = 1 + out.len();
        self.exchange(Command::ReadData, &mut buf[..len], 0)?;
        out.copy_from_slice(&buf[1..len]);
        Ok(())
    }

    /// Read and decode the 4-byte status register, CRC-checked with drift
    /// compensation over the 7-byte span (command, status, CRC)
    pub fn read_status(&mut self) -> Result<StatusSnapshot, Error<A::Error>> {
        if !self.adapter.select(self.address)? {
            return Err(Error::DeviceNotFound);
        }

        let mut buf = [0xFFu8; 7];
        buf[0] = Command::ReadStatus.op_code();
        self.adapter.data_block(&mut buf)?;

        buf[1] &= !FREE_DONT_CARE;
        let acc = compute_partial_crc16(0, &buf);
        if !check_crc16(acc, buf.len()) {
            return Err(Error::CrcMismatch(acc, GOOD_CRC16_RESIDUAL));
        }

        Ok(StatusSnapshot::decode(&[buf[1], buf[2], buf[3], buf[4]]))
    }

    pub fn write_status(&mut self, code: u8) -> Result<(), Error<A::Error>> {
        let mut payload = [code.min(MAX_RUNTIME_CODE)];
        self.exchange(Command::WriteStatus, &mut payload, 0)
    }

    /// Grant the device run time, powering the bus for the code's duration
    pub fn run(&mut self, code: u8) -> Result<(), Error<A::Error>> {
        let code = code.min(MAX_RUNTIME_CODE);
        self.exchange(Command::Run, &mut [], self.timing.to_millis(code))
    }

    pub fn interrupt(&mut self, code: u8) -> Result<(), Error<A::Error>> {
        let code = code.min(MAX_RUNTIME_CODE);
        self.exchange(Command::Interrupt, &mut [], self.timing.to_millis(code))
    }

    pub fn reset_micro(&mut self) -> Result<(), Error<A::Error>> {
        self.exchange(Command::ResetMicro, &mut [], 0)
    }
}
