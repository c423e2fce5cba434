mod fdcan;
mod usb;
