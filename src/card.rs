//! Card-facing data types: the 512-byte block unit, card metadata and the
//! state taxonomy reported by the host controller

/// Block length for SD transfers, in bytes. Fixed by the protocol.
pub const BLOCK_LEN: usize = 512;

/// One 512-byte transfer unit.
///
/// The 4-byte alignment lets the buffer be viewed as words, which is the
/// granularity the DMA engine moves.
#[derive(Debug, Clone, Copy)]
#[repr(C, align(4))]
pub struct Block {
    pub bytes: [u8; BLOCK_LEN],
}

impl Block {
    pub const fn new() -> Self {
        Self {
            bytes: [0; BLOCK_LEN],
        }
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: Block is a bare byte array, 512 % 4 == 0 so the alignment padding
// is zero, and every bit pattern is a valid value.
unsafe impl bytemuck::Zeroable for Block {}
unsafe impl bytemuck::Pod for Block {}

/// Card state machine states as the host controller reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CardState {
    Ready,
    Identification,
    Standby,
    Transfer,
    Sending,
    Receiving,
    Programming,
    Disconnected,
    Error,
}

impl CardState {
    /// Decode a vendor state value. Values outside the defined set decode to
    /// `None`.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Ready),
            2 => Some(Self::Identification),
            3 => Some(Self::Standby),
            4 => Some(Self::Transfer),
            5 => Some(Self::Sending),
            6 => Some(Self::Receiving),
            7 => Some(Self::Programming),
            8 => Some(Self::Disconnected),
            0xFF => Some(Self::Error),
            _ => None,
        }
    }
}

/// Coarse transfer readiness derived from the card state. Anything that is
/// not settled in the transfer state and not faulted counts as busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferState {
    Ok,
    Busy,
    Error,
}

impl From<CardState> for TransferState {
    fn from(state: CardState) -> Self {
        match state {
            CardState::Transfer => Self::Ok,
            CardState::Error => Self::Error,
            _ => Self::Busy,
        }
    }
}

/// Capacity class of the identified card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CardKind {
    StandardCapacity,
    HighCapacity,
    Secured,
}

impl CardKind {
    /// Decode a vendor card-type value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::StandardCapacity),
            1 => Some(Self::HighCapacity),
            3 => Some(Self::Secured),
            _ => None,
        }
    }
}

/// Specification generation of the identified card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CardVersion {
    V1,
    V2,
}

impl CardVersion {
    /// Decode a vendor card-version value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::V1),
            1 => Some(Self::V2),
            _ => None,
        }
    }
}

/// Card metadata as reported by the host after identification.
///
/// `block_count`/`block_size` describe the physical geometry; the logical
/// fields describe the 512-byte view all transfers use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CardInfo {
    pub kind: CardKind,
    pub version: CardVersion,
    /// Card command class bits from the CSD.
    pub class: u16,
    /// Relative card address assigned during identification.
    pub rca: u16,
    pub block_count: u32,
    pub block_size: u32,
    pub logical_block_count: u32,
    pub logical_block_size: u32,
}

impl CardInfo {
    /// Total addressable capacity in bytes.
    pub fn capacity_bytes(&self) -> u64 {
        u64::from(self.logical_block_count) * u64::from(self.logical_block_size)
    }
}
