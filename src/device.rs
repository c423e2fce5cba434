use core::fmt;

/// Filter hardware family reported by the adapter firmware.
///
/// The discriminant doubles as the device tag: it is the first byte of every
/// filter image and of the `GET_FILTER` answer, so the values must match the
/// firmware side exactly.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Hardware {
    /// No hardware filter support
    None = 0,
    /// bxCAN on STM32 F0/F1/F3, 14 filter banks
    BxcanF0 = 1,
    /// bxCAN on STM32 F4/F7, 28 filter banks
    BxcanF4 = 2,
    /// Bosch M_CAN on STM32 G0, 28 standard and 8 extended filters
    FdcanG0 = 3,
    /// Bosch M_CAN on STM32 H7, 128 standard and 64 extended filters
    FdcanH7 = 4,
}

impl Hardware {
    /// Maps a device tag byte to the hardware family
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::None),
            1 => Some(Self::BxcanF0),
            2 => Some(Self::BxcanF4),
            3 => Some(Self::FdcanG0),
            4 => Some(Self::FdcanH7),
            _ => None,
        }
    }

    /// Device tag byte stamped into the filter image
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Hardware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "no filter hardware"),
            Self::BxcanF0 => write!(f, "bxCAN (F0/F1/F3) with 14 filter banks"),
            Self::BxcanF4 => write!(f, "bxCAN (F4/F7) with 28 filter banks"),
            Self::FdcanG0 => write!(f, "FDCAN (G0) with 28 standard, 8 extended filters"),
            Self::FdcanH7 => write!(f, "FDCAN (H7) with 128 standard, 64 extended filters"),
        }
    }
}
