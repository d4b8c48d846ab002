use crate::Address;
use core::fmt::Debug;

/// Bus communication speed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-impl", derive(defmt::Format))]
pub enum Speed {
    Regular,
    Overdrive,
}

/// How long a strong pull-up stays active once triggered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-impl", derive(defmt::Format))]
pub enum PowerDuration {
    HalfSecond,
    OneSecond,
    /// Until [`Adapter::set_power_normal`] is called
    Infinite,
    /// Adapter terminates delivery on its own once the device stops drawing
    SmartDone,
}

/// Bus event that starts a pending strong pull-up
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-impl", derive(defmt::Format))]
pub enum PowerTrigger {
    Now,
    AfterNextBit,
    AfterNextByte,
}

/// Bus master abstraction the link driver is written against
///
/// Only byte/block-level primitives appear here; bit timing, presence
/// detection and device search are the adapter's business. The caller must
/// hold exclusive access to the adapter across a whole link operation so
/// that unrelated devices' traffic cannot interleave with the framed
/// exchanges.
pub trait Adapter {
    type Error: Sized + Debug;

    /// Bus reset pulse
    fn reset(&mut self) -> Result<(), Self::Error>;

    /// Address a single device, true if it answered the select sequence
    fn select(&mut self, address: &Address) -> Result<bool, Self::Error>;

    /// Full-duplex block transfer: every byte written is replaced in place
    /// with the byte sampled off the bus, so writes and reads share this
    /// one primitive
    fn data_block(&mut self, data: &mut [u8]) -> Result<(), Self::Error>;

    /// Read a single bit
    fn get_bit(&mut self) -> Result<bool, Self::Error>;

    fn set_power_duration(&mut self, duration: PowerDuration) -> Result<(), Self::Error>;

    fn start_power_delivery(&mut self, trigger: PowerTrigger) -> Result<(), Self::Error>;

    /// Back to normal (idle pull-up) power
    fn set_power_normal(&mut self) -> Result<(), Self::Error>;

    /// Whether [`PowerDuration::SmartDone`] delivery is available
    fn can_deliver_smart_power(&self) -> bool;

    fn speed(&self) -> Speed;

    fn set_speed(&mut self, speed: Speed) -> Result<(), Self::Error>;
}

/// Owning device container, asked to restore the required bus speed after
/// a communication glitch forced the adapter back to [`Speed::Regular`]
pub trait Container<A: Adapter> {
    fn renegotiate_speed(&mut self, adapter: &mut A) -> Result<(), A::Error>;
}
