//! # Mock dummy structure for doc examples
//!
//! [ExampleUsb] answers the vendor requests the way a bxCAN-F0 adapter with
//! firmware filter support would, without any USB hardware attached.

use crate::usb::{ControlRequest, UsbControl};
use core::convert::Infallible;

#[derive(Default, Debug)]
pub struct ExampleUsb;

impl UsbControl for ExampleUsb {
    type Error = Infallible;

    fn control_in(&mut self, request: ControlRequest, data: &mut [u8]) -> Result<usize, Infallible> {
        data.fill(0);

        match request {
            ControlRequest::BtConst => {
                // feature word with the filter bit, 48 MHz CAN clock
                data[..4].copy_from_slice(&(1u32 << 16).to_le_bytes());
                data[4..8].copy_from_slice(&48_000_000u32.to_le_bytes());
            }
            ControlRequest::GetFilter => data[0] = 1,
            ControlRequest::SetFilter => {}
        }

        Ok(data.len())
    }

    fn control_out(&mut self, _request: ControlRequest, data: &[u8]) -> Result<usize, Infallible> {
        Ok(data.len())
    }
}
