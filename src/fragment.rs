//! Fragmentation of application data units into CRC-protected blocks and
//! reassembly of the device's reply blocks.

use crate::crc::{check_crc16, compute_partial_crc16, GOOD_CRC16_RESIDUAL};
use crate::result::Error;
use byteorder::{ByteOrder, LittleEndian};
use core::fmt::Debug;

/// Wire size of one block header
pub const HEADER_LEN: usize = 8;

/// Payload bytes per block (128-byte physical block minus the header)
pub const MAX_BLOCK_DATA: usize = 120;

/// Largest application data unit the block numbering can address
pub const MAX_PAYLOAD: usize = 128 * 128;

/// Final-block marker OR-ed into the sequence byte of the last block
pub(crate) const FINAL_BLOCK: u8 = 0x80;

/// Protocol-reserved bytes at the start of every inbound data block,
/// discarded on reassembly. Kept as-is for compatibility with the legacy
/// reply shape; candidates for removal only with confirmed device-side
/// expectations.
pub(crate) const RESERVED_PREFIX: usize = 3;

/// One block header (8 bytes on the wire, multi-byte fields little-endian)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-impl", derive(defmt::Format))]
pub struct FrameHeader {
    /// 7-bit sequence number, [`FINAL_BLOCK`] OR-ed in on the last block
    pub seq: u8,
    /// Payload bytes carried by this block
    pub len: u8,
    /// Payload bytes still unsent when this block started; the final-block
    /// condition is `remaining == len`
    pub remaining: u16,
    /// CRC16 over (length byte ‖ payload), transmitted inverted
    pub crc: u16,
    /// Running checksum over all payload bytes of the transfer so far.
    /// Sender-side bookkeeping only; no receive path validates it.
    pub running: u16,
}

impl FrameHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut raw = [0u8; HEADER_LEN];
        raw[0] = self.seq;
        raw[1] = self.len;
        LittleEndian::write_u16(&mut raw[2..4], self.remaining);
        LittleEndian::write_u16(&mut raw[4..6], self.crc);
        LittleEndian::write_u16(&mut raw[6..8], self.running);
        raw
    }

    pub fn from_bytes(raw: &[u8; HEADER_LEN]) -> Self {
        FrameHeader {
            seq: raw[0],
            len: raw[1],
            remaining: LittleEndian::read_u16(&raw[2..4]),
            crc: LittleEndian::read_u16(&raw[4..6]),
            running: LittleEndian::read_u16(&raw[6..8]),
        }
    }

    pub fn is_final(&self) -> bool {
        self.seq & FINAL_BLOCK != 0
    }
}

/// Splits one outbound payload into blocks
///
/// Borrows the payload for the duration of a single transfer attempt; a
/// fresh fragmenter is built for every attempt, so there is no shared
/// scratch state to protect.
pub(crate) struct Fragmenter<'a> {
    payload: &'a [u8],
    sent: usize,
    seq: u8,
    running: u16,
}

impl<'a> Fragmenter<'a> {
    pub fn new<E: Sized + Debug>(payload: &'a [u8]) -> Result<Self, Error<E>> {
        if payload.is_empty() {
            return Err(Error::EmptyPayload);
        }
        if payload.len() > MAX_PAYLOAD {
            return Err(Error::PayloadTooLong(payload.len()));
        }
        Ok(Fragmenter {
            payload,
            sent: 0,
            seq: 0,
            running: 0,
        })
    }

    pub fn has_more(&self) -> bool {
        self.sent < self.payload.len()
    }

    /// Header and payload slice of the next block, advancing the cursor
    pub fn next_block(&mut self) -> (FrameHeader, &'a [u8]) {
        let remaining = self.payload.len() - self.sent;
        let block_len = remaining.min(MAX_BLOCK_DATA);
        let data = &self.payload[self.sent..self.sent + block_len];

        self.seq = (self.seq + 1) & !FINAL_BLOCK;
        let mut seq = self.seq;
        if remaining == block_len {
            seq |= FINAL_BLOCK;
        }

        let crc = !compute_partial_crc16(
            compute_partial_crc16(0, &[block_len as u8]),
            data,
        );
        self.running = compute_partial_crc16(self.running, data);
        self.sent += block_len;

        (
            FrameHeader {
                seq,
                len: block_len as u8,
                remaining: remaining as u16,
                crc,
                running: self.running,
            },
            data,
        )
    }
}

/// Accumulates the device's reply blocks into a caller-provided buffer
pub(crate) struct Reassembler<'a> {
    out: &'a mut [u8],
    len: usize,
}

impl<'a> Reassembler<'a> {
    pub fn new(out: &'a mut [u8]) -> Self {
        Reassembler { out, len: 0 }
    }

    /// Validate one inbound block and append its payload, minus the
    /// reserved prefix. Returns whether the block carried the final-block
    /// marker. A CRC failure here is recoverable; the orchestrator retries
    /// the whole transfer.
    pub fn accept_block<E: Sized + Debug>(
        &mut self,
        header: &FrameHeader,
        data: &[u8],
    ) -> Result<bool, Error<E>> {
        let mut acc = compute_partial_crc16(0, &[header.len]);
        acc = compute_partial_crc16(acc, data);
        acc = compute_partial_crc16(acc, &header.crc.to_le_bytes());
        // length byte + payload + two CRC bytes
        let span = data.len() + 3;
        if !check_crc16(acc, span) {
            return Err(Error::CrcMismatch(acc, GOOD_CRC16_RESIDUAL));
        }

        if data.len() > RESERVED_PREFIX {
            let chunk = &data[RESERVED_PREFIX..];
            if self.len + chunk.len() > self.out.len() {
                return Err(Error::ReplyOverflow);
            }
            self.out[self.len..self.len + chunk.len()].copy_from_slice(chunk);
            self.len += chunk.len();
        }

        Ok(header.is_final())
    }

    pub fn finish(self) -> usize {
        self.len
    }
}
