//!# FDCAN filter builder
//! Emits the message ID filter tables of the Bosch M_CAN controller used on
//! STM32 G0 and H7 parts. Unlike bxCAN, the hardware understands ranges
//! natively: a standard filter element is one 32 bit word, an extended
//! element two words, and both carry either a start/end range or a pair of
//! identifiers.
//!
//! Single identifiers are buffered in pairs so two of them share one dual-ID
//! element; ranges are emitted immediately.

use crate::builder::{FilterBuilder, FilterError, MAX_EXT_ID, MAX_STD_ID};
use crate::device::Hardware;
use crate::registers::{ExtFilterWord0, ExtFilterWord1, StdFilterElement, FEC_RX_FIFO0, FT_DUAL, FT_RANGE};
use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, info};

/// FDCAN for STM32 G0, 28 standard and 8 extended filters
pub type FdcanG0 = FdcanFilter<28, 8, { Hardware::FdcanG0 as u8 }>;

/// FDCAN for STM32 H7, 128 standard and 64 extended filters
pub type FdcanH7 = FdcanFilter<128, 64, { Hardware::FdcanH7 as u8 }>;

/// Filter builder for one FDCAN instance with `MAX_STD` standard filter
/// elements, `MAX_EXT` extended filter elements and device tag `DEV`
pub struct FdcanFilter<const MAX_STD: usize, const MAX_EXT: usize, const DEV: u8> {
    std_filter: [u32; MAX_STD],
    ext_filter: [[u32; 2]; MAX_EXT],
    std_filter_nbr: u8,
    ext_filter_nbr: u8,

    /// Standard identifiers awaiting a dual-ID element
    std_id: [u32; 2],
    std_id_count: u8,

    /// Extended identifiers awaiting a dual-ID element
    ext_id: [u32; 2],
    ext_id_count: u8,
}

impl<const MAX_STD: usize, const MAX_EXT: usize, const DEV: u8> FdcanFilter<MAX_STD, MAX_EXT, DEV> {
    /// Wire image size: device tag word, one word per standard element, two
    /// words per extended element
    pub const IMAGE_SIZE: usize = 4 + 4 * MAX_STD + 8 * MAX_EXT;

    pub fn new() -> Self {
        Self {
            std_filter: [0; MAX_STD],
            ext_filter: [[0; 2]; MAX_EXT],
            std_filter_nbr: 0,
            ext_filter_nbr: 0,
            std_id: [0; 2],
            std_id_count: 0,
            ext_id: [0; 2],
            ext_id_count: 0,
        }
    }

    fn emit_std(&mut self, sft: u8, id1: u32, id2: u32) -> Result<(), FilterError> {
        if usize::from(self.std_filter_nbr) >= MAX_STD {
            return Err(FilterError::Full);
        }

        if id1 > MAX_STD_ID || id2 > MAX_STD_ID {
            return Err(FilterError::Param);
        }

        let element = StdFilterElement::new()
            .with_sft(sft)
            .with_sfec(FEC_RX_FIFO0)
            .with_sfid1(id1 as u16)
            .with_sfid2(id2 as u16);

        self.std_filter[usize::from(self.std_filter_nbr)] = u32::from(element);
        self.std_filter_nbr += 1;
        Ok(())
    }

    fn emit_ext(&mut self, eft: u8, id1: u32, id2: u32) -> Result<(), FilterError> {
        if usize::from(self.ext_filter_nbr) >= MAX_EXT {
            return Err(FilterError::Full);
        }

        if id1 > MAX_EXT_ID || id2 > MAX_EXT_ID {
            return Err(FilterError::Param);
        }

        let word0 = ExtFilterWord0::new().with_efec(FEC_RX_FIFO0).with_efid1(id1);
        let word1 = ExtFilterWord1::new().with_eft(eft).with_efid2(id2);

        self.ext_filter[usize::from(self.ext_filter_nbr)] = [u32::from(word0), u32::from(word1)];
        self.ext_filter_nbr += 1;
        Ok(())
    }
}

impl<const MAX_STD: usize, const MAX_EXT: usize, const DEV: u8> Default for FdcanFilter<MAX_STD, MAX_EXT, DEV> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const MAX_STD: usize, const MAX_EXT: usize, const DEV: u8> FilterBuilder for FdcanFilter<MAX_STD, MAX_EXT, DEV> {
    fn begin(&mut self) {
        *self = Self::new();
    }

    /// Buffers the identifier; two pending identifiers share one dual-ID
    /// element. The first one is copied into the second slot so an early
    /// flush emits a well formed element.
    fn add_std_id(&mut self, id: u32) -> Result<(), FilterError> {
        if id > MAX_STD_ID {
            return Err(FilterError::Param);
        }

        debug_assert!(self.std_id_count < 2);

        self.std_id[usize::from(self.std_id_count)] = id;
        self.std_id_count += 1;

        if self.std_id_count == 1 {
            self.std_id[1] = id;
            Ok(())
        } else {
            debug!("fdcan std dual {:#05x} {:#05x}", self.std_id[0], self.std_id[1]);
            self.std_id_count = 0;
            self.emit_std(FT_DUAL, self.std_id[0], self.std_id[1])
        }
    }

    fn add_ext_id(&mut self, id: u32) -> Result<(), FilterError> {
        if id > MAX_EXT_ID {
            return Err(FilterError::Param);
        }

        debug_assert!(self.ext_id_count < 2);

        self.ext_id[usize::from(self.ext_id_count)] = id;
        self.ext_id_count += 1;

        if self.ext_id_count == 1 {
            self.ext_id[1] = id;
            Ok(())
        } else {
            debug!("fdcan ext dual {:#010x} {:#010x}", self.ext_id[0], self.ext_id[1]);
            self.ext_id_count = 0;
            self.emit_ext(FT_DUAL, self.ext_id[0], self.ext_id[1])
        }
    }

    fn add_std_range(&mut self, begin: u32, end: u32) -> Result<(), FilterError> {
        if begin > MAX_STD_ID || end > MAX_STD_ID {
            return Err(FilterError::Param);
        }

        let (begin, end) = if begin > end { (end, begin) } else { (begin, end) };

        debug!("fdcan std range {begin:#05x}-{end:#05x}");
        self.emit_std(FT_RANGE, begin, end)
    }

    fn add_ext_range(&mut self, begin: u32, end: u32) -> Result<(), FilterError> {
        if begin > MAX_EXT_ID || end > MAX_EXT_ID {
            return Err(FilterError::Param);
        }

        let (begin, end) = if begin > end { (end, begin) } else { (begin, end) };

        debug!("fdcan ext range {begin:#010x}-{end:#010x}");
        self.emit_ext(FT_RANGE, begin, end)
    }

    fn end(&mut self) -> Result<(), FilterError> {
        if self.std_id_count != 0 {
            self.std_id_count = 0;
            self.emit_std(FT_DUAL, self.std_id[0], self.std_id[1])?;
        }

        if self.ext_id_count != 0 {
            self.ext_id_count = 0;
            self.emit_ext(FT_DUAL, self.ext_id[0], self.ext_id[1])?;
        }

        Ok(())
    }

    fn image(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(Self::IMAGE_SIZE);

        buffer.put_u8(DEV);
        buffer.put_u8(self.std_filter_nbr);
        buffer.put_u8(self.ext_filter_nbr);
        buffer.put_u8(0);

        for element in &self.std_filter {
            buffer.put_u32_le(*element);
        }
        for element in &self.ext_filter {
            buffer.put_u32_le(element[0]);
            buffer.put_u32_le(element[1]);
        }

        buffer.freeze()
    }

    fn log_registers(&self) {
        debug!("fdcan registers:");
        debug!("standard filters: {}", self.std_filter_nbr);
        for i in 0..usize::from(self.std_filter_nbr) {
            debug!("sf[{i}]: {:#010x}", self.std_filter[i]);
        }
        debug!("extended filters: {}", self.ext_filter_nbr);
        for i in 0..usize::from(self.ext_filter_nbr) {
            debug!("ef[{i}]: f0={:#010x} f1={:#010x}", self.ext_filter[i][0], self.ext_filter[i][1]);
        }
    }

    fn log_filters(&self) {
        static FT_STR: [&str; 4] = ["range", "dual", "mask", "off"];
        static FEC_STR: [&str; 8] = [
            "off",
            "fifo0",
            "fifo1",
            "reject",
            "prio",
            "prio fifo0",
            "prio fifo1",
            "not used",
        ];

        for i in 0..usize::from(self.std_filter_nbr) {
            let element = self.std_filter[i];
            let id1 = (element >> 16) & MAX_STD_ID;
            let id2 = element & MAX_STD_ID;
            let fec = (element >> 27) & 0x7;
            let ft = (element >> 30) & 0x3;
            debug!(
                "sf[{i}]: {} {id1:#05x} {id2:#05x} {}",
                FT_STR[ft as usize], FEC_STR[fec as usize]
            );
        }

        for i in 0..usize::from(self.ext_filter_nbr) {
            let id1 = self.ext_filter[i][0] & MAX_EXT_ID;
            let id2 = self.ext_filter[i][1] & MAX_EXT_ID;
            let fec = (self.ext_filter[i][0] >> 29) & 0x7;
            let ft = (self.ext_filter[i][1] >> 30) & 0x3;
            debug!(
                "ef[{i}]: {} {id1:#010x} {id2:#010x} {}",
                FT_STR[ft as usize], FEC_STR[fec as usize]
            );
        }
    }

    fn log_usage(&self) {
        let std_used = usize::from(self.std_filter_nbr);
        let ext_used = usize::from(self.ext_filter_nbr);
        let std_percent = (std_used * 100 + MAX_STD / 2) / MAX_STD;
        let ext_percent = (ext_used * 100 + MAX_EXT / 2) / MAX_EXT;
        info!("filter usage: {std_used}/{MAX_STD} standard ({std_percent}%), {ext_used}/{MAX_EXT} extended ({ext_percent}%)");
    }
}
