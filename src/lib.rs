#![no_std]
#![doc = include_str!("../README.md")]

#[cfg(feature = "defmt-impl")]
macro_rules! link_warn {
    ($($arg:tt)*) => { defmt::warn!($($arg)*) };
}

#[cfg(not(feature = "defmt-impl"))]
macro_rules! link_warn {
    ($($arg:tt)*) => {{
        let _ = ($($arg)*,);
    }};
}

mod adapter;
mod address;
mod command;
mod crc;
mod driver;
mod fragment;
mod framer;
mod poll;
mod result;
mod status;
mod timing;

pub use adapter::{Adapter, Container, PowerDuration, PowerTrigger, Speed};
pub use address::Address;
pub use command::Command;
pub use crc::{compute_partial_crc16, crc_correction, GOOD_CRC16_RESIDUAL};
pub use driver::Link;
pub use fragment::{FrameHeader, HEADER_LEN, MAX_BLOCK_DATA, MAX_PAYLOAD};
pub use result::Error;
pub use status::StatusSnapshot;
pub use timing::{Timing, TimingError, MAX_RUNTIME_CODE, MIN_RUNTIME_CODE};
