//! Dallas 1-Wire CRC16 and the drift-correction table for the
//! co-processor's known one-bit CRC anomaly.
//!
//! The silicon sometimes drops one internal shift while accumulating its
//! CRC, producing a deterministic, length-dependent wrong value. The
//! correction table holds, per checked-span length, the residual a genuine
//! check additionally needs to be XORed with to still pass.

/// Residual of a clean CRC16 accumulation over a span that ends with the
/// transmitted (inverted) CRC bytes
pub const GOOD_CRC16_RESIDUAL: u16 = 0xB001;

/// Largest checked-span length the correction table covers
pub(crate) const CORRECTION_SPAN_MAX: usize = 139;

const fn crc16_byte(mut crc: u16, byte: u8) -> u16 {
    crc ^= byte as u16;
    let mut bit = 0;
    while bit < 8 {
        if crc & 0x01 != 0 {
            crc = (crc >> 1) ^ 0xA001;
        } else {
            crc >>= 1;
        }
        bit += 1;
    }
    crc
}

/// CRC16 (reflected polynomial `0xA001`, LSB first) over `data`,
/// continuing from `crc`
pub fn compute_partial_crc16(crc: u16, data: &[u8]) -> u16 {
    let mut crc = crc;
    for byte in data.iter() {
        crc = crc16_byte(crc, *byte);
    }
    crc
}

const fn build_correction_table() -> [u16; CORRECTION_SPAN_MAX] {
    let mut table = [0u16; CORRECTION_SPAN_MAX];
    table[0] = crc16_byte(0, 0x01);
    let mut i = 1;
    while i < CORRECTION_SPAN_MAX {
        let prev = table[i - 1];
        table[i] = crc16_byte(crc16_byte(0, prev as u8), (prev >> 8) as u8);
        i += 1;
    }
    table
}

static CORRECTION_TABLE: [u16; CORRECTION_SPAN_MAX] = build_correction_table();

/// Correction residual for a checked span of `length` bytes,
/// 0 when out of table range
pub fn crc_correction(length: usize) -> u16 {
    if length < 1 || length > CORRECTION_SPAN_MAX {
        0
    } else {
        CORRECTION_TABLE[length - 1]
    }
}

/// Accept an accumulated CRC either as a genuine residual or as the
/// drift-shifted residual for this span length
pub(crate) fn check_crc16(accumulated: u16, span_length: usize) -> bool {
    accumulated == GOOD_CRC16_RESIDUAL
        || accumulated ^ crc_correction(span_length) == GOOD_CRC16_RESIDUAL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc16_check_value() {
        // CRC-16/ARC check value
        assert_eq!(compute_partial_crc16(0, b"123456789"), 0xBB3D);
        assert_eq!(compute_partial_crc16(0, &[0x01]), 0xC0C1);
    }

    #[test]
    fn residual_of_inverted_crc() {
        let data = [0x0A, 0xDE, 0xAD, 0xBE, 0xEF];
        let crc = !compute_partial_crc16(0, &data);
        let acc = compute_partial_crc16(compute_partial_crc16(0, &data), &crc.to_le_bytes());
        assert_eq!(acc, GOOD_CRC16_RESIDUAL);
    }

    #[test]
    fn correction_table_seed_and_chain() {
        assert_eq!(crc_correction(1), compute_partial_crc16(0, &[0x01]));
        for len in 2..=CORRECTION_SPAN_MAX {
            let prev = crc_correction(len - 1);
            assert_eq!(
                crc_correction(len),
                compute_partial_crc16(0, &prev.to_le_bytes())
            );
        }
    }

    #[test]
    fn correction_out_of_range() {
        assert_eq!(crc_correction(0), 0);
        assert_eq!(crc_correction(140), 0);
        assert_ne!(crc_correction(139), 0);
    }

    #[test]
    fn drifted_crc_accepted() {
        let span = 7;
        let drifted = GOOD_CRC16_RESIDUAL ^ crc_correction(span);
        assert!(check_crc16(GOOD_CRC16_RESIDUAL, span));
        assert!(check_crc16(drifted, span));
        assert!(!check_crc16(drifted ^ 0x0004, span));
    }
}
