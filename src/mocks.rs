use crate::usb::{ControlRequest, UsbControl};
use mockall::mock;

mock! {
    pub Usb {}

    impl UsbControl for Usb {
        type Error = u32;

        fn control_in(&mut self, request: ControlRequest, data: &mut [u8]) -> Result<usize, u32>;
        fn control_out(&mut self, request: ControlRequest, data: &[u8]) -> Result<usize, u32>;
    }
}
