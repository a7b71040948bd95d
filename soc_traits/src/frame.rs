//! Bus frame shapes and the bit-packed 11-bit address used on the wire.
//!
//! Layout of the identifier (bit 10 is the most significant):
//!
//! ```text
//!  10     9    8     7    6    5    4..0
//! role | end | data | -  | cts | rts | slave address
//! ```
//!
//! Two filter masks are used: [`FULL_MASK`] compares every field and
//! [`CLASS_MASK`] ignores the sub-type (RTS/CTS) bits.

use std::fmt;

pub const ROLE_MASTER: u32 = 0b100_0000_0000;
pub const CLASS_END: u32 = 0b010_0000_0000;
pub const CLASS_DATA: u32 = 0b001_0000_0000;
pub const SUB_CTS: u32 = 0b000_0100_0000;
pub const SUB_RTS: u32 = 0b000_0010_0000;
pub const SLAVE_ADDR_MASK: u32 = 0b000_0001_1111;

/// Role + class + sub-type + slave address.
pub const FULL_MASK: u32 = 0x7FF;
/// Role + class + slave address.
pub const CLASS_MASK: u32 = ROLE_MASTER | CLASS_END | CLASS_DATA | SLAVE_ADDR_MASK;

/// Highest slave address representable in the identifier.
pub const MAX_SLAVE_ADDR: u8 = SLAVE_ADDR_MASK as u8;

/// Number of 16-bit words in a narrow frame.
pub const NARROW_WORDS: usize = 4;
/// Byte length of a fully populated narrow frame.
pub const NARROW_DATA_LEN: u8 = (NARROW_WORDS * 2) as u8;
/// Byte length of a wide frame.
pub const WIDE_DATA_LEN: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    Data,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubType {
    None,
    RequestToSend,
    ClearToSend,
}

/// Decoded bus identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    pub role: Role,
    pub class: MessageClass,
    pub subtype: SubType,
    pub slave: u8,
}

/// Identifier that does not decode into a valid [`Address`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidAddress(pub u32);

impl fmt::Display for InvalidAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid bus address {:#05x}", self.0)
    }
}

impl std::error::Error for InvalidAddress {}

impl Address {
    /// Master asking a slave for its samples.
    pub fn request_to_send(slave: u8) -> Self {
        Self {
            role: Role::Master,
            class: MessageClass::Data,
            subtype: SubType::RequestToSend,
            slave,
        }
    }

    /// Slave granting the master's request.
    pub fn clear_to_send(slave: u8) -> Self {
        Self {
            role: Role::Slave,
            class: MessageClass::Data,
            subtype: SubType::ClearToSend,
            slave,
        }
    }

    /// Master data without a sub-type (balancing bitmask).
    pub fn master_data(slave: u8) -> Self {
        Self {
            role: Role::Master,
            class: MessageClass::Data,
            subtype: SubType::None,
            slave,
        }
    }

    /// Slave data without a sub-type (sample frames).
    pub fn slave_data(slave: u8) -> Self {
        Self {
            role: Role::Slave,
            class: MessageClass::Data,
            subtype: SubType::None,
            slave,
        }
    }

    /// Slave announcing the end of the test run.
    pub fn end_of_test(slave: u8) -> Self {
        Self {
            role: Role::Slave,
            class: MessageClass::End,
            subtype: SubType::None,
            slave,
        }
    }

    /// Pack into the wire identifier. The slave address is truncated to 5 bits.
    pub fn pack(self) -> u32 {
        let role = match self.role {
            Role::Master => ROLE_MASTER,
            Role::Slave => 0,
        };
        let class = match self.class {
            MessageClass::Data => CLASS_DATA,
            MessageClass::End => CLASS_END,
        };
        let subtype = match self.subtype {
            SubType::None => 0,
            SubType::RequestToSend => SUB_RTS,
            SubType::ClearToSend => SUB_CTS,
        };
        role | class | subtype | (u32::from(self.slave) & SLAVE_ADDR_MASK)
    }

    /// Decode a wire identifier. Bits outside [`FULL_MASK`] are ignored.
    pub fn unpack(id: u32) -> Result<Self, InvalidAddress> {
        let role = if id & ROLE_MASTER != 0 {
            Role::Master
        } else {
            Role::Slave
        };
        let class = match (id & CLASS_DATA != 0, id & CLASS_END != 0) {
            (true, false) => MessageClass::Data,
            (false, true) => MessageClass::End,
            _ => return Err(InvalidAddress(id)),
        };
        let subtype = match (id & SUB_RTS != 0, id & SUB_CTS != 0) {
            (false, false) => SubType::None,
            (true, false) => SubType::RequestToSend,
            (false, true) => SubType::ClearToSend,
            (true, true) => return Err(InvalidAddress(id)),
        };
        Ok(Self {
            role,
            class,
            subtype,
            slave: (id & SLAVE_ADDR_MASK) as u8,
        })
    }
}

impl From<Address> for u32 {
    fn from(a: Address) -> Self {
        a.pack()
    }
}

impl TryFrom<u32> for Address {
    type Error = InvalidAddress;
    fn try_from(id: u32) -> Result<Self, Self::Error> {
        Self::unpack(id)
    }
}

/// Receive filter: a frame matches when `frame_id & mask == id & mask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressFilter {
    pub id: u32,
    pub mask: u32,
}

impl AddressFilter {
    /// Match every field of `addr`.
    pub fn exact(addr: Address) -> Self {
        Self {
            id: addr.pack(),
            mask: FULL_MASK,
        }
    }

    /// Match role, class and slave address; ignore the RTS/CTS sub-type.
    pub fn class(addr: Address) -> Self {
        Self {
            id: addr.pack(),
            mask: CLASS_MASK,
        }
    }

    /// Filter that accepts everything.
    pub fn any() -> Self {
        Self { id: 0, mask: 0 }
    }

    #[inline]
    pub fn matches(&self, frame_id: u32) -> bool {
        frame_id & self.mask == self.id & self.mask
    }
}

/// Split a 32-bit value into two 16-bit words, low half first.
#[inline]
pub fn split_u32(v: u32) -> [u16; 2] {
    [(v & 0xFFFF) as u16, (v >> 16) as u16]
}

/// Inverse of [`split_u32`].
#[inline]
pub fn join_u32(words: [u16; 2]) -> u32 {
    u32::from(words[0]) | (u32::from(words[1]) << 16)
}

/// Narrow frame: identifier, byte length and up to four 16-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NarrowFrame {
    pub id: u32,
    pub len: u8,
    pub data: [u16; NARROW_WORDS],
}

impl NarrowFrame {
    /// Zero-length frame (handshake).
    pub fn empty(id: u32) -> Self {
        Self {
            id,
            len: 0,
            data: [0; NARROW_WORDS],
        }
    }

    /// Fully populated frame carrying two 32-bit values.
    pub fn from_pair(id: u32, first: u32, second: u32) -> Self {
        let [a, b] = split_u32(first);
        let [c, d] = split_u32(second);
        Self {
            id,
            len: NARROW_DATA_LEN,
            data: [a, b, c, d],
        }
    }

    /// First sample frame: `(channel_index, current)`.
    pub fn channel_current(id: u32, channel: u32, current: f32) -> Self {
        Self::from_pair(id, channel, current.to_bits())
    }

    /// Second sample frame: `(voltage, temperature)`.
    pub fn voltage_temperature(id: u32, voltage: f32, temperature: i32) -> Self {
        Self::from_pair(id, voltage.to_bits(), temperature as u32)
    }

    /// Raw 32-bit value stored in words `2*slot` and `2*slot + 1`.
    #[inline]
    pub fn word32(&self, slot: usize) -> u32 {
        join_u32([self.data[2 * slot], self.data[2 * slot + 1]])
    }

    #[inline]
    pub fn f32_at(&self, slot: usize) -> f32 {
        f32::from_bits(self.word32(slot))
    }

    #[inline]
    pub fn i32_at(&self, slot: usize) -> i32 {
        self.word32(slot) as i32
    }
}

/// Wide frame: identifier, byte length and a single 64-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WideFrame {
    pub id: u32,
    pub len: u8,
    pub data: u64,
}

impl WideFrame {
    pub fn new(id: u32, data: u64) -> Self {
        Self {
            id,
            len: WIDE_DATA_LEN,
            data,
        }
    }
}
