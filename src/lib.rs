#![no_std]
#![doc = include_str!("../README.md")]

mod address;
mod codec;
mod command;
mod driver;
#[cfg(feature = "ds18b20")]
pub mod ds18b20;
mod result;
mod search;
mod wire;

pub use address::Address;
pub use command::{Command, OpCode};
pub use driver::Driver;
pub use result::Error;
pub use search::{DeviceSearch, DeviceSearchIter};
pub use wire::{Serial, SerialError, SetBaudRate, Speed, UartWire};

/// Continues a Dallas/Maxim CRC-8 (polynomial x^8 + x^5 + x^4 + 1 in its
/// reflected 0x8C form, low bit first) over `data`.
pub fn compute_partial_crc8(crc: u8, data: &[u8]) -> u8 {
    let mut crc = crc;
    for byte in data.iter() {
        let mut byte = *byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0x00 {
                crc ^= 0x8C;
            }
            byte >>= 1;
        }
    }
    crc
}

/// Dallas/Maxim CRC-8 of `data`, starting from zero.
pub fn crc8(data: &[u8]) -> u8 {
    compute_partial_crc8(0, data)
}
