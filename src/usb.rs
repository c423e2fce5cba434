//!# USB filter programming
//! Filter images reach the adapter through vendor specific control transfers
//! on endpoint 0, interface recipient. The transport itself is behind the
//! [UsbControl] trait so platform USB stacks (and test mocks) plug in
//! underneath; [FilterProgrammer] implements the protocol on top of it:
//! probe the filter capability, read the hardware family tag, compile the
//! filter text with the matching builder and ship the image in a single
//! control-OUT.
//!
//! ```
//! use canfilter::example::ExampleUsb;
//! use canfilter::usb::FilterProgrammer;
//! use canfilter::Hardware;
//!
//! let mut programmer = FilterProgrammer::new(ExampleUsb::default());
//! let hardware = programmer.program("0x100-0x10F, 0x2A0").unwrap();
//! assert_eq!(Hardware::BxcanF0, hardware);
//! ```

use crate::builder::{FilterBuilder, FilterError, ParseError};
use crate::bxcan::{BxcanF0, BxcanF4};
use crate::device::Hardware;
use crate::fdcan::{FdcanG0, FdcanH7};
use alloc::boxed::Box;
use log::{error, info};

/// Upper bound for a single control transfer, in milliseconds
pub const TRANSFER_TIMEOUT_MS: u32 = 1000;

/// Capability bit advertised by devices with a hardware filter
const FEATURE_FILTER: u32 = 1 << 16;

/// Vendor control requests understood by the adapter firmware
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControlRequest {
    /// Bit timing constants and feature flags (control-IN)
    BtConst = 4,
    /// Upload a complete filter image (control-OUT)
    SetFilter = 15,
    /// Identify the filter hardware family (control-IN)
    GetFilter = 16,
}

/// Vendor control transfers on endpoint 0, interface recipient.
///
/// Implementations are expected to bound every transfer at
/// [TRANSFER_TIMEOUT_MS] and report the number of bytes actually moved;
/// [FilterProgrammer] treats anything short of the full payload as a
/// failure.
pub trait UsbControl {
    /// Transport error type
    type Error;

    /// Control-IN transfer, filling `data`. Returns the bytes received.
    fn control_in(&mut self, request: ControlRequest, data: &mut [u8]) -> Result<usize, Self::Error>;

    /// Control-OUT transfer, sending `data`. Returns the bytes sent.
    fn control_out(&mut self, request: ControlRequest, data: &[u8]) -> Result<usize, Self::Error>;
}

/// Device capability record returned by [ControlRequest::BtConst]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceCapability {
    pub feature: u32,
    pub fclk_can: u32,
    pub tseg1_min: u32,
    pub tseg1_max: u32,
    pub tseg2_min: u32,
    pub tseg2_max: u32,
    pub sjw_max: u32,
    pub brp_min: u32,
    pub brp_max: u32,
    pub brp_inc: u32,
}

impl DeviceCapability {
    /// Wire size of the capability record
    pub const SIZE: usize = 40;

    /// True if the device carries a programmable hardware filter
    pub fn has_filter(&self) -> bool {
        self.feature & FEATURE_FILTER != 0
    }

    fn from_bytes(raw: &[u8; Self::SIZE]) -> Self {
        let mut words = [0u32; 10];
        for (word, chunk) in words.iter_mut().zip(raw.chunks_exact(4)) {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(chunk);
            *word = u32::from_le_bytes(bytes);
        }

        Self {
            feature: words[0],
            fclk_can: words[1],
            tseg1_min: words[2],
            tseg1_max: words[3],
            tseg2_min: words[4],
            tseg2_max: words[5],
            sjw_max: words[6],
            brp_min: words[7],
            brp_max: words[8],
            brp_inc: words[9],
        }
    }
}

/// Filter hardware record returned by [ControlRequest::GetFilter]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterInfo {
    /// Device tag, see [Hardware]
    pub dev: u8,
}

impl FilterInfo {
    /// Wire size of the filter record, tag plus three reserved bytes
    pub const SIZE: usize = 4;

    fn from_bytes(raw: &[u8; Self::SIZE]) -> Self {
        Self { dev: raw[0] }
    }
}

/// Errors of [FilterProgrammer]
#[derive(Debug, PartialEq)]
pub enum ProgramError<E> {
    /// Control transfer failed in the transport layer
    Usb(E),

    /// Transfer moved fewer bytes than requested
    Incomplete { expected: usize, actual: usize },

    /// Device does not advertise the hardware filter capability
    NoHardwareFilter,

    /// Device reports a filter family this library does not know
    UnknownHardware(u8),

    /// The filter definition text was rejected
    Parse(ParseError),

    /// Filter compilation failed
    Filter(FilterError),
}

impl<E> From<ParseError> for ProgramError<E> {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl<E> From<FilterError> for ProgramError<E> {
    fn from(error: FilterError) -> Self {
        Self::Filter(error)
    }
}

/// Programs hardware filters over a [UsbControl] transport
pub struct FilterProgrammer<U: UsbControl> {
    usb: U,
}

impl<U: UsbControl> FilterProgrammer<U> {
    pub fn new(usb: U) -> Self {
        Self { usb }
    }

    /// Releases the underlying transport
    pub fn release(self) -> U {
        self.usb
    }

    /// Reads the device capability record
    pub fn capability(&mut self) -> Result<DeviceCapability, ProgramError<U::Error>> {
        let mut raw = [0u8; DeviceCapability::SIZE];
        self.read(ControlRequest::BtConst, &mut raw)?;
        Ok(DeviceCapability::from_bytes(&raw))
    }

    /// True if the device carries a programmable hardware filter
    pub fn has_hardware_filter(&mut self) -> Result<bool, ProgramError<U::Error>> {
        Ok(self.capability()?.has_filter())
    }

    /// Reads which filter hardware family the device carries
    pub fn filter_hardware(&mut self) -> Result<Hardware, ProgramError<U::Error>> {
        let mut raw = [0u8; FilterInfo::SIZE];
        self.read(ControlRequest::GetFilter, &mut raw)?;

        let info = FilterInfo::from_bytes(&raw);
        Hardware::from_tag(info.dev).ok_or_else(|| {
            error!("unknown filter hardware tag {}", info.dev);
            ProgramError::UnknownHardware(info.dev)
        })
    }

    /// Compiles `definition` for the device's filter hardware and programs
    /// it in one control-OUT transfer. Returns the hardware family on
    /// success.
    pub fn program(&mut self, definition: &str) -> Result<Hardware, ProgramError<U::Error>> {
        if !self.has_hardware_filter()? {
            error!("device does not have a hardware filter");
            return Err(ProgramError::NoHardwareFilter);
        }

        let hardware = self.filter_hardware()?;
        let mut builder: Box<dyn FilterBuilder> = match hardware {
            Hardware::BxcanF0 => Box::new(BxcanF0::new()),
            Hardware::BxcanF4 => Box::new(BxcanF4::new()),
            Hardware::FdcanG0 => Box::new(FdcanG0::new()),
            Hardware::FdcanH7 => Box::new(FdcanH7::new()),
            Hardware::None => {
                error!("device reports no filter hardware");
                return Err(ProgramError::UnknownHardware(Hardware::None.tag()));
            }
        };
        info!("using {hardware}");

        builder.begin();
        builder.parse(definition).map_err(|e| {
            error!("filter definition rejected: {e}");
            e
        })?;
        builder.end().map_err(|e| {
            error!("filter compilation failed: {e}");
            e
        })?;

        let image = builder.image();
        self.write(ControlRequest::SetFilter, &image)?;

        builder.log_usage();
        info!("filter programmed");
        Ok(hardware)
    }

    fn read(&mut self, request: ControlRequest, data: &mut [u8]) -> Result<(), ProgramError<U::Error>> {
        let expected = data.len();
        let actual = self.usb.control_in(request, data).map_err(|e| {
            error!("usb transfer failed");
            ProgramError::Usb(e)
        })?;

        if actual != expected {
            error!("short transfer: expected {expected}, got {actual}");
            return Err(ProgramError::Incomplete { expected, actual });
        }
        Ok(())
    }

    fn write(&mut self, request: ControlRequest, data: &[u8]) -> Result<(), ProgramError<U::Error>> {
        let expected = data.len();
        let actual = self.usb.control_out(request, data).map_err(|e| {
            error!("usb transfer failed");
            ProgramError::Usb(e)
        })?;

        if actual != expected {
            error!("short transfer: expected {expected}, got {actual}");
            return Err(ProgramError::Incomplete { expected, actual });
        }
        Ok(())
    }
}
