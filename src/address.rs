use core::{
    fmt::{Display, Formatter, Result as FmtResult},
    ops::{Deref, DerefMut},
    str::FromStr,
};

/// 8-byte 1-Wire device address, owned by the calling container and
/// borrowed by the link driver for the duration of each call
#[derive(Debug, Clone, Copy, PartialOrd, PartialEq)]
#[cfg_attr(feature = "defmt-impl", derive(defmt::Format))]
#[repr(transparent)]
pub struct Address {
    raw: [u8; Self::BYTES as usize],
}

impl Default for Address {
    fn default() -> Self {
        Self::from([0; Self::BYTES as usize])
    }
}

impl From<[u8; Self::BYTES as usize]> for Address {
    fn from(raw: [u8; Self::BYTES as usize]) -> Self {
        Address { raw }
    }
}

impl From<Address> for [u8; Address::BYTES as usize] {
    fn from(addr: Address) -> [u8; Address::BYTES as usize] {
        addr.raw
    }
}

impl Deref for Address {
    type Target = [u8; Self::BYTES as usize];

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl DerefMut for Address {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.raw
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        self.deref() as _
    }
}

impl Address {
    /// The length of device address in bytes
    pub const BYTES: u8 = 8;

    pub fn family_code(&self) -> u8 {
        self[0]
    }
}

/// Error type
#[derive(Debug)]
pub enum AddressError {
    NotEnough,
    Invalid,
}

fn hex_to_u8(c: char) -> Option<u8> {
    if c.is_ascii_digit() {
        Some((c as u32 - '0' as u32) as _)
    } else if ('a'..='f').contains(&c) {
        Some((c as u32 - 'a' as u32 + 10) as _)
    } else if ('A'..='F').contains(&c) {
        Some((c as u32 - 'A' as u32 + 10) as _)
    } else {
        None
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut addr = Address::default();
        let mut chars = s.chars().filter(|c| !c.is_whitespace() && *c != ':');

        for i in 0..Self::BYTES as usize {
            match (chars.next(), chars.next()) {
                (Some(h), Some(l)) => match (hex_to_u8(h), hex_to_u8(l)) {
                    (Some(h), Some(l)) => {
                        addr[i] = (h << 4) | l;
                    }
                    _ => return Err(AddressError::Invalid),
                },
                _ => return Err(AddressError::NotEnough),
            }
        }

        Ok(addr)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self[0], self[1], self[2], self[3], self[4], self[5], self[6], self[7],
        )
    }
}

#[cfg(test)]
mod test {
    use super::Address;

    #[test]
    fn parse_address() {
        let addr: Address = "16228ff908000168".parse().unwrap();

        assert_eq!(
            addr,
            Address::from([0x16, 0x22, 0x8f, 0xf9, 0x08, 0x00, 0x01, 0x68])
        );
        assert_eq!(addr.family_code(), 0x16);
    }

    #[test]
    fn parse_address_colon_separated() {
        let addr: Address = "16:22:8f:f9:08:00:01:68".parse().unwrap();

        assert_eq!(
            addr,
            Address::from([0x16, 0x22, 0x8f, 0xf9, 0x08, 0x00, 0x01, 0x68])
        );
    }
}
