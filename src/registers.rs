use modular_bitfield_msb::prelude::*;

/// SFT/EFT: filter covers the inclusive range ID1..ID2
pub const FT_RANGE: u8 = 0x0;

/// SFT/EFT: filter matches the two identifiers ID1 and ID2
pub const FT_DUAL: u8 = 0x1;

/// SFEC/EFEC: store matching frames in RX FIFO 0
pub const FEC_RX_FIFO0: u8 = 0x1;

/// FDCAN standard message ID filter element
#[bitfield]
#[derive(Default, Debug, Eq, PartialEq)]
#[repr(u32)]
pub struct StdFilterElement {
    pub sft: B2,
    pub sfec: B3,
    pub sfid1: B11,
    pub sfid2: B16,
}

/// First word of the FDCAN extended message ID filter element
#[bitfield]
#[derive(Default, Debug, Eq, PartialEq)]
#[repr(u32)]
pub struct ExtFilterWord0 {
    pub efec: B3,
    pub efid1: B29,
}

/// Second word of the FDCAN extended message ID filter element
#[bitfield]
#[derive(Default, Debug, Eq, PartialEq)]
#[repr(u32)]
pub struct ExtFilterWord1 {
    pub eft: B2,
    #[skip]
    __: B1,
    pub efid2: B29,
}
