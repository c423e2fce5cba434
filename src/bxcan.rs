//!# bxCAN filter builder
//! Packs identifiers into the filter banks of the bxCAN controller found on
//! STM32 F0/F1/F3 (14 banks) and F4/F7 (28 banks) parts. Each bank is
//! configured independently as a 16 bit list of four standard IDs, two
//! 16 bit standard masks, a 32 bit list of two extended IDs, or one 32 bit
//! extended mask.
//!
//! bxCAN has no native range support. Ranges are decomposed into
//! prefix-aligned power-of-two blocks, CIDR style, and each block becomes a
//! mask entry (or a list entry for single identifiers). The builder buffers
//! pending entries so banks are filled to their natural width before one is
//! spent.

use crate::builder::{FilterBuilder, FilterError, MAX_EXT_ID, MAX_STD_ID};
use crate::device::Hardware;
use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, error, info};

/// bxCAN for STM32 F0/F1/F3, 14 filter banks
pub type BxcanF0 = BxcanFilter<14, { Hardware::BxcanF0 as u8 }>;

/// bxCAN for STM32 F4/F7, 28 filter banks
pub type BxcanF4 = BxcanFilter<28, { Hardware::BxcanF4 as u8 }>;

const STD_WIDTH: u32 = 11;
const EXT_WIDTH: u32 = 29;

/// IDE flag of a 32 bit filter register, set for extended frames
const FR_IDE: u32 = 1 << 2;

#[derive(Copy, Clone, Default)]
struct StdMask {
    id: u32,
    mask: u32,
}

/// Filter builder for one bxCAN instance with `BANKS` filter banks and
/// device tag `DEV`
pub struct BxcanFilter<const BANKS: usize, const DEV: u8> {
    fs1r: u32,
    fm1r: u32,
    ffa1r: u32,
    fa1r: u32,
    fr1: [u32; BANKS],
    fr2: [u32; BANKS],

    /// Next free bank
    bank: usize,

    /// Standard identifiers awaiting a four-up 16 bit list bank
    std_list: [u32; 4],
    std_list_count: usize,

    /// Standard masks awaiting a two-up 16 bit mask bank
    std_mask: [StdMask; 2],
    std_mask_count: usize,

    /// Extended identifiers awaiting a two-up 32 bit list bank
    ext_list: [u32; 2],
    ext_list_count: usize,
}

impl<const BANKS: usize, const DEV: u8> BxcanFilter<BANKS, DEV> {
    /// Wire image size: device tag word, four bank bitmaps, two registers
    /// per bank
    pub const IMAGE_SIZE: usize = 4 + 4 * 4 + 8 * BANKS;

    pub fn new() -> Self {
        Self {
            fs1r: 0,
            fm1r: 0,
            ffa1r: 0,
            fa1r: 0,
            fr1: [0; BANKS],
            fr2: [0; BANKS],
            bank: 0,
            std_list: [0; 4],
            std_list_count: 0,
            std_mask: [StdMask::default(); 2],
            std_mask_count: 0,
            ext_list: [0; 2],
            ext_list_count: 0,
        }
    }

    /// Packs four standard IDs into one bank in 16 bit list mode
    fn emit_std_list(&mut self, id1: u32, id2: u32, id3: u32, id4: u32) -> Result<(), FilterError> {
        if self.bank >= BANKS {
            return Err(FilterError::Full);
        }

        if id1 > MAX_STD_ID || id2 > MAX_STD_ID || id3 > MAX_STD_ID || id4 > MAX_STD_ID {
            return Err(FilterError::Param);
        }

        self.fr1[self.bank] = (id2 << 21) | (id1 << 5);
        self.fr2[self.bank] = (id4 << 21) | (id3 << 5);

        self.fs1r &= !(1 << self.bank); // 16 bit
        self.fm1r |= 1 << self.bank; // list mode
        self.fa1r |= 1 << self.bank; // enable

        self.bank += 1;
        Ok(())
    }

    /// Packs two standard masks into one bank in 16 bit mask mode
    fn emit_std_mask(&mut self, id1: u32, mask1: u32, id2: u32, mask2: u32) -> Result<(), FilterError> {
        if self.bank >= BANKS {
            return Err(FilterError::Full);
        }

        if id1 > MAX_STD_ID || mask1 > MAX_STD_ID || id2 > MAX_STD_ID || mask2 > MAX_STD_ID {
            return Err(FilterError::Param);
        }

        self.fr1[self.bank] = (mask1 << 21) | (id1 << 5);
        self.fr2[self.bank] = (mask2 << 21) | (id2 << 5);

        self.fs1r &= !(1 << self.bank); // 16 bit
        self.fm1r &= !(1 << self.bank); // mask mode
        self.fa1r |= 1 << self.bank; // enable

        self.bank += 1;
        Ok(())
    }

    /// Packs two extended IDs into one bank in 32 bit list mode
    fn emit_ext_list(&mut self, id1: u32, id2: u32) -> Result<(), FilterError> {
        if self.bank >= BANKS {
            return Err(FilterError::Full);
        }

        if id1 > MAX_EXT_ID || id2 > MAX_EXT_ID {
            return Err(FilterError::Param);
        }

        self.fr1[self.bank] = (id1 << 3) | FR_IDE;
        self.fr2[self.bank] = (id2 << 3) | FR_IDE;

        self.fs1r |= 1 << self.bank; // 32 bit
        self.fm1r |= 1 << self.bank; // list mode
        self.fa1r |= 1 << self.bank; // enable

        self.bank += 1;
        Ok(())
    }

    /// Writes one extended mask, spending a whole bank in 32 bit mask mode
    fn emit_ext_mask(&mut self, id: u32, mask: u32) -> Result<(), FilterError> {
        if self.bank >= BANKS {
            return Err(FilterError::Full);
        }

        if id > MAX_EXT_ID || mask > MAX_EXT_ID {
            return Err(FilterError::Param);
        }

        self.fr1[self.bank] = (id << 3) | FR_IDE;
        self.fr2[self.bank] = mask << 3;

        self.fs1r |= 1 << self.bank; // 32 bit
        self.fm1r &= !(1 << self.bank); // mask mode
        self.fa1r |= 1 << self.bank; // enable

        self.bank += 1;
        Ok(())
    }

    /// Buffers a standard ID, emitting a bank once four are pending.
    ///
    /// The first ID is copied into the remaining slots so the accumulator
    /// always holds a well formed bank if `end()` flushes it early.
    fn add_std_list(&mut self, id: u32) -> Result<(), FilterError> {
        debug_assert!(self.std_list_count < 4);

        self.std_list[self.std_list_count] = id;
        self.std_list_count += 1;

        if self.std_list_count == 1 {
            self.std_list[1] = id;
            self.std_list[2] = id;
            self.std_list[3] = id;
        } else if self.std_list_count == 4 {
            self.std_list_count = 0;
            return self.emit_std_list(self.std_list[0], self.std_list[1], self.std_list[2], self.std_list[3]);
        }

        Ok(())
    }

    /// Buffers a standard mask, emitting a bank once two are pending
    fn add_std_mask(&mut self, id: u32, mask: u32) -> Result<(), FilterError> {
        debug_assert!(self.std_mask_count < 2);

        self.std_mask[self.std_mask_count] = StdMask { id, mask };
        self.std_mask_count += 1;

        if self.std_mask_count == 1 {
            self.std_mask[1] = StdMask { id, mask };
        } else {
            self.std_mask_count = 0;
            return self.emit_std_mask(
                self.std_mask[0].id,
                self.std_mask[0].mask,
                self.std_mask[1].id,
                self.std_mask[1].mask,
            );
        }

        Ok(())
    }

    /// Buffers an extended ID, emitting a bank once two are pending
    fn add_ext_list(&mut self, id: u32) -> Result<(), FilterError> {
        debug_assert!(self.ext_list_count < 2);

        self.ext_list[self.ext_list_count] = id;
        self.ext_list_count += 1;

        if self.ext_list_count == 1 {
            self.ext_list[1] = id;
        } else {
            self.ext_list_count = 0;
            return self.emit_ext_list(self.ext_list[0], self.ext_list[1]);
        }

        Ok(())
    }
}

impl<const BANKS: usize, const DEV: u8> Default for BxcanFilter<BANKS, DEV> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const BANKS: usize, const DEV: u8> FilterBuilder for BxcanFilter<BANKS, DEV> {
    fn begin(&mut self) {
        *self = Self::new();
    }

    fn add_std_id(&mut self, id: u32) -> Result<(), FilterError> {
        self.add_std_range(id, id)
    }

    fn add_ext_id(&mut self, id: u32) -> Result<(), FilterError> {
        self.add_ext_range(id, id)
    }

    fn add_std_range(&mut self, begin: u32, end: u32) -> Result<(), FilterError> {
        if begin > MAX_STD_ID || end > MAX_STD_ID {
            return Err(FilterError::Param);
        }

        let (mut begin, end) = if begin > end { (end, begin) } else { (begin, end) };

        while begin <= end {
            let prefix = largest_prefix(begin, end, STD_WIDTH);
            let mask = (!0u32 << (STD_WIDTH - prefix)) & MAX_STD_ID;

            let added = if mask == MAX_STD_ID {
                debug!("bxcan std list id {begin:#05x}");
                self.add_std_list(begin)
            } else {
                debug!("bxcan std mask id {begin:#05x} mask {mask:#05x}");
                self.add_std_mask(begin, mask)
            };
            added.map_err(|e| {
                error!("bxcan std filter fail");
                e
            })?;

            begin += 1 << (STD_WIDTH - prefix);
        }

        Ok(())
    }

    fn add_ext_range(&mut self, begin: u32, end: u32) -> Result<(), FilterError> {
        if begin > MAX_EXT_ID || end > MAX_EXT_ID {
            return Err(FilterError::Param);
        }

        let (mut begin, end) = if begin > end { (end, begin) } else { (begin, end) };

        while begin <= end {
            let prefix = largest_prefix(begin, end, EXT_WIDTH);
            let mask = (!0u32 << (EXT_WIDTH - prefix)) & MAX_EXT_ID;

            let added = if mask == MAX_EXT_ID {
                debug!("bxcan ext list id {begin:#010x}");
                self.add_ext_list(begin)
            } else {
                debug!("bxcan ext mask id {begin:#010x} mask {mask:#010x}");
                self.emit_ext_mask(begin, mask)
            };
            added.map_err(|e| {
                error!("bxcan ext filter fail");
                e
            })?;

            begin += 1 << (EXT_WIDTH - prefix);
        }

        Ok(())
    }

    fn end(&mut self) -> Result<(), FilterError> {
        if self.std_list_count != 0 {
            self.std_list_count = 0;
            self.emit_std_list(self.std_list[0], self.std_list[1], self.std_list[2], self.std_list[3])?;
        }

        if self.std_mask_count != 0 {
            self.std_mask_count = 0;
            self.emit_std_mask(
                self.std_mask[0].id,
                self.std_mask[0].mask,
                self.std_mask[1].id,
                self.std_mask[1].mask,
            )?;
        }

        if self.ext_list_count != 0 {
            self.ext_list_count = 0;
            self.emit_ext_list(self.ext_list[0], self.ext_list[1])?;
        }

        Ok(())
    }

    fn image(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(Self::IMAGE_SIZE);

        buffer.put_u8(DEV);
        buffer.put_bytes(0, 3);
        buffer.put_u32_le(self.fs1r);
        buffer.put_u32_le(self.fm1r);
        buffer.put_u32_le(self.ffa1r);
        buffer.put_u32_le(self.fa1r);

        for register in &self.fr1 {
            buffer.put_u32_le(*register);
        }
        for register in &self.fr2 {
            buffer.put_u32_le(*register);
        }

        buffer.freeze()
    }

    fn log_registers(&self) {
        debug!("bxcan registers:");
        debug!("FS1R:  {:#010x}", self.fs1r);
        debug!("FM1R:  {:#010x}", self.fm1r);
        debug!("FFA1R: {:#010x}", self.ffa1r);
        debug!("FA1R:  {:#010x}", self.fa1r);

        for bank in 0..BANKS {
            if self.fr1[bank] != 0 || self.fr2[bank] != 0 {
                debug!("FR1[{bank}]: {:#010x} FR2[{bank}]: {:#010x}", self.fr1[bank], self.fr2[bank]);
            }
        }
    }

    fn log_filters(&self) {
        for bank in 0..BANKS {
            if self.fa1r & (1 << bank) == 0 {
                continue;
            }

            let is_32bit = self.fs1r & (1 << bank) != 0;
            let is_list = self.fm1r & (1 << bank) != 0;

            if is_32bit {
                let id1 = (self.fr1[bank] >> 3) & MAX_EXT_ID;
                let id2 = (self.fr2[bank] >> 3) & MAX_EXT_ID;

                if is_list {
                    debug!("bank [{bank}]: ext list {id1:#010x}, {id2:#010x}");
                } else {
                    let begin = id1 & id2;
                    let end = (begin | !id2) & MAX_EXT_ID;
                    debug!("bank [{bank}]: ext mask {begin:#010x}-{end:#010x}");
                }
            } else {
                let id1 = (self.fr1[bank] >> 5) & MAX_STD_ID;
                let id2 = (self.fr1[bank] >> 21) & MAX_STD_ID;
                let id3 = (self.fr2[bank] >> 5) & MAX_STD_ID;
                let id4 = (self.fr2[bank] >> 21) & MAX_STD_ID;

                if is_list {
                    debug!("bank [{bank}]: std list {id1:#05x}, {id2:#05x}, {id3:#05x}, {id4:#05x}");
                } else {
                    let begin1 = id1 & id2;
                    let end1 = (begin1 | !id2) & MAX_STD_ID;
                    let begin2 = id3 & id4;
                    let end2 = (begin2 | !id4) & MAX_STD_ID;
                    debug!("bank [{bank}]: std mask {begin1:#05x}-{end1:#05x}, {begin2:#05x}-{end2:#05x}");
                }
            }
        }
    }

    fn log_usage(&self) {
        let percent = (self.bank * 100 + BANKS / 2) / BANKS;
        info!("filter usage: {}/{} banks ({percent}%)", self.bank, BANKS);
    }
}

/// Longest prefix whose aligned power-of-two block starts at `begin` and
/// stays within `end`, for identifiers of `width` bits.
///
/// A prefix of `width` is a single identifier, a prefix of 0 covers the
/// whole identifier space.
pub(crate) fn largest_prefix(begin: u32, end: u32, width: u32) -> u32 {
    // widest alignment at begin
    let mut prefix = width;
    while prefix > 0 {
        let mask_bit = 1u32 << (width - prefix);
        if begin & mask_bit != 0 {
            break;
        }
        prefix -= 1;
    }

    // shrink until the block fits within end
    while prefix < width {
        let block_size = 1u32 << (width - prefix);
        if begin + block_size - 1 > end {
            prefix += 1;
        } else {
            break;
        }
    }

    prefix
}
