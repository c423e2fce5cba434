//!# Filter builder contract
//! [FilterBuilder] is the accumulator interface shared by all filter hardware
//! families. Filters are constructed with `begin()`, a series of `add_*()`
//! calls, then `end()` to flush partially filled accumulators. Only after
//! `end()` does [FilterBuilder::image] return the complete wire image.
//!
//! ```
//! use canfilter::builder::FilterBuilder;
//! use canfilter::bxcan::BxcanF0;
//!
//! let mut filter = BxcanF0::new();
//! filter.begin();
//! filter.parse("0x100-0x10F, 0x2A0").unwrap();
//! filter.end().unwrap();
//!
//! // first image byte is the device tag
//! assert_eq!(1, filter.image()[0]);
//! ```

use bytes::Bytes;
use core::fmt;
use embedded_can::Id;

/// Largest valid standard (11 bit) CAN identifier
pub const MAX_STD_ID: u32 = 0x7FF;

/// Largest valid extended (29 bit) CAN identifier
pub const MAX_EXT_ID: u32 = 0x1FFF_FFFF;

/// Filter compilation errors
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FilterError {
    /// Caller supplied an identifier outside its width
    Param,

    /// A hardware capacity limit would be exceeded
    Full,
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Param => write!(f, "identifier out of range"),
            Self::Full => write!(f, "hardware filter capacity exceeded"),
        }
    }
}

/// Errors of [FilterBuilder::parse]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Input is not a number, range or separator at the given byte offset
    Syntax {
        /// Byte offset of the offending input
        pos: usize,
    },

    /// A value exceeds the 29 bit extended identifier space
    OutOfRange {
        /// Byte offset of the offending item
        pos: usize,
    },

    /// An accepted item was rejected by the builder
    Filter(FilterError),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax { pos } => write!(f, "unrecognized filter syntax at byte {pos}"),
            Self::OutOfRange { pos } => write!(f, "identifier exceeds 29 bits at byte {pos}"),
            Self::Filter(error) => write!(f, "{error}"),
        }
    }
}

impl From<FilterError> for ParseError {
    fn from(error: FilterError) -> Self {
        Self::Filter(error)
    }
}

/// Hardware filter accumulator
///
/// Implementations translate identifiers and identifier ranges into the
/// binary image one filter hardware family consumes. The image routes every
/// accepted frame to RX FIFO 0.
pub trait FilterBuilder {
    /// Resets the image and all pending accumulators
    fn begin(&mut self);

    /// Adds a single standard (11 bit) identifier
    fn add_std_id(&mut self, id: u32) -> Result<(), FilterError>;

    /// Adds a single extended (29 bit) identifier
    fn add_ext_id(&mut self, id: u32) -> Result<(), FilterError>;

    /// Adds an inclusive range of standard identifiers, in either order
    fn add_std_range(&mut self, begin: u32, end: u32) -> Result<(), FilterError>;

    /// Adds an inclusive range of extended identifiers, in either order
    fn add_ext_range(&mut self, begin: u32, end: u32) -> Result<(), FilterError>;

    /// Finalizes the filter, flushing partially filled accumulators
    fn end(&mut self) -> Result<(), FilterError>;

    /// Serializes the wire image, little endian words, device tag first
    fn image(&self) -> Bytes;

    /// Logs the raw register image
    fn log_registers(&self);

    /// Logs the accepted identifiers as decoded from the image
    fn log_filters(&self);

    /// Logs hardware slot usage
    fn log_usage(&self);

    /// Adds a single identifier of either width
    fn add_id(&mut self, id: Id) -> Result<(), FilterError> {
        match id {
            Id::Standard(id) => self.add_std_id(u32::from(id.as_raw())),
            Id::Extended(id) => self.add_ext_id(id.as_raw()),
        }
    }

    /// Accepts all standard and extended identifiers
    fn allow_all(&mut self) -> Result<(), FilterError> {
        self.add_std_range(0, MAX_STD_ID)?;
        self.add_ext_range(0, MAX_EXT_ID)
    }

    /// Parses a textual list of identifiers and identifier ranges
    ///
    /// Items are numbers (`0x123`, `291`, `0443`) or inclusive ranges
    /// (`0x100-0x1FF`), separated by whitespace or commas. Values up to
    /// `0x7FF` are standard identifiers, larger values up to `0x1FFFFFFF`
    /// extended ones. An empty input is valid and adds nothing.
    ///
    /// Parsing stops at the first error; items accepted up to that point
    /// remain in the builder, so discard it on failure.
    fn parse(&mut self, input: &str) -> Result<(), ParseError> {
        let bytes = input.as_bytes();
        let mut pos = 0;

        while pos < bytes.len() {
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos >= bytes.len() {
                break;
            }

            let item = pos;
            let (first, next) = scan_number(bytes, pos).ok_or(ParseError::Syntax { pos })?;
            pos = next;

            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }

            if pos < bytes.len() && bytes[pos] == b'-' {
                pos += 1;
                while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                    pos += 1;
                }

                let (second, next) = scan_number(bytes, pos).ok_or(ParseError::Syntax { pos })?;
                pos = next;

                if first <= MAX_STD_ID && second <= MAX_STD_ID {
                    self.add_std_range(first, second)?;
                } else if first <= MAX_EXT_ID && second <= MAX_EXT_ID {
                    self.add_ext_range(first, second)?;
                } else {
                    return Err(ParseError::OutOfRange { pos: item });
                }
            } else if first <= MAX_STD_ID {
                self.add_std_id(first)?;
            } else if first <= MAX_EXT_ID {
                self.add_ext_id(first)?;
            } else {
                return Err(ParseError::OutOfRange { pos: item });
            }

            while pos < bytes.len() && (bytes[pos].is_ascii_whitespace() || bytes[pos] == b',') {
                pos += 1;
            }
        }

        Ok(())
    }
}

/// Scans a C style integer literal: a leading `0x` selects hexadecimal, a
/// leading zero octal, anything else decimal. Returns the value and the
/// offset of the first byte not consumed.
fn scan_number(input: &[u8], pos: usize) -> Option<(u32, usize)> {
    let (radix, mut cursor) = match input.get(pos..) {
        Some([b'0', b'x' | b'X', ..]) => (16u32, pos + 2),
        Some([b'0', ..]) => (8, pos),
        _ => (10, pos),
    };

    let mut value: u32 = 0;
    let mut digits = 0usize;

    while let Some(digit) = input.get(cursor).and_then(|b| (*b as char).to_digit(radix)) {
        value = value.checked_mul(radix)?.checked_add(digit)?;
        digits += 1;
        cursor += 1;
    }

    (digits != 0).then_some((value, cursor))
}
