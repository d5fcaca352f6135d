//! A simulated 1-Wire segment behind the serial transport trait.
//!
//! The simulation works at the same granularity as the real electrical
//! layer: every transferred word is one time slot, and the word "observed"
//! on the line is the wired-AND of what the master sent and what the
//! addressed devices drove during that slot.

#![allow(dead_code)]

use core::cell::Cell;
use onewire_uart::ds18b20::TickSource;
use onewire_uart::{crc8, Speed, UartWire};

pub struct SimDevice {
    pub rom: [u8; 8],
    pub scratchpad: [u8; 9],
    selected: bool,
    in_search: bool,
}

impl SimDevice {
    pub fn new(rom: [u8; 8], scratchpad: [u8; 9]) -> Self {
        SimDevice {
            rom,
            scratchpad,
            selected: false,
            in_search: false,
        }
    }

    fn rom_bit(&self, index: u16) -> bool {
        self.rom[(index / 8) as usize] & (1 << (index % 8)) != 0
    }

    fn scratchpad_bit(&self, index: u16) -> bool {
        self.scratchpad[(index / 8) as usize] & (1 << (index % 8)) != 0
    }
}

/// Builds a ROM with a valid trailing checksum from a family code and a
/// six-byte serial.
pub fn rom(family: u8, serial: [u8; 6]) -> [u8; 8] {
    let mut rom = [0_u8; 8];
    rom[0] = family;
    rom[1..7].copy_from_slice(&serial);
    rom[7] = crc8(&rom[..7]);
    rom
}

/// Builds a scratchpad holding `raw` sixteenths of a degree under the given
/// configuration byte, with a valid trailing checksum.
pub fn scratchpad(raw: i16, config: u8) -> [u8; 9] {
    let [lo, hi] = raw.to_le_bytes();
    let mut scratchpad = [lo, hi, 0x4B, 0x46, config, 0xFF, 0x0C, 0x10, 0x00];
    scratchpad[8] = crc8(&scratchpad[..8]);
    scratchpad
}

#[derive(Debug, PartialEq, Eq)]
pub struct SimTimeout;

enum Phase {
    Idle,
    RomCommand { bits: u8, count: u8 },
    Search { bit: u16, slot: u8 },
    MatchRom { bit: u16 },
    FunctionCommand { bits: u8, count: u8 },
    ReadScratchpad { bit: u16 },
    WriteScratchpad { bytes: [u8; 3], bits: u16 },
    Inert,
}

pub struct SimBus {
    pub devices: Vec<SimDevice>,
    phase: Phase,
    speed: Speed,
    fail_next: bool,
    transfers: usize,
    reinits: usize,
}

impl SimBus {
    pub fn new(devices: Vec<SimDevice>) -> Self {
        SimBus {
            devices,
            phase: Phase::Idle,
            speed: Speed::Work,
            fail_next: false,
            transfers: 0,
            reinits: 0,
        }
    }

    /// Make the next transfer time out, once.
    pub fn fail_next_transfer(&mut self) {
        self.fail_next = true;
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers
    }

    pub fn reinit_count(&self) -> usize {
        self.reinits
    }

    fn on_reset(&mut self, word: u8) -> u8 {
        for device in &mut self.devices {
            device.selected = false;
            device.in_search = false;
        }
        if self.devices.is_empty() {
            self.phase = Phase::Idle;
            word
        } else {
            self.phase = Phase::RomCommand { bits: 0, count: 0 };
            // presence pulses deform the echoed word
            word & 0xE0
        }
    }

    fn dispatch_rom_command(&mut self, command: u8) {
        match command {
            // Search-ROM
            0xF0 => {
                for device in &mut self.devices {
                    device.in_search = true;
                }
                self.phase = Phase::Search { bit: 0, slot: 0 };
            }
            // Match-ROM
            0x55 => {
                for device in &mut self.devices {
                    device.selected = true;
                }
                self.phase = Phase::MatchRom { bit: 0 };
            }
            // Skip-ROM
            0xCC => {
                for device in &mut self.devices {
                    device.selected = true;
                }
                self.phase = Phase::FunctionCommand { bits: 0, count: 0 };
            }
            _ => self.phase = Phase::Inert,
        }
    }

    fn dispatch_function_command(&mut self, command: u8) {
        match command {
            // Read-Scratchpad
            0xBE => self.phase = Phase::ReadScratchpad { bit: 0 },
            // Write-Scratchpad: TH, TL, configuration follow
            0x4E => {
                self.phase = Phase::WriteScratchpad {
                    bytes: [0; 3],
                    bits: 0,
                }
            }
            // Convert-T and everything else produce no readable reply
            _ => self.phase = Phase::Inert,
        }
    }

    /// One work-rate slot: the master drove `sent`, the devices answer per
    /// protocol state. Returns whether the line stayed released.
    fn slot(&mut self, sent: bool) -> bool {
        match self.phase {
            Phase::Idle | Phase::Inert => true,

            Phase::RomCommand { mut bits, count } => {
                bits |= (sent as u8) << count;
                if count == 7 {
                    self.dispatch_rom_command(bits);
                } else {
                    self.phase = Phase::RomCommand {
                        bits,
                        count: count + 1,
                    };
                }
                true
            }

            Phase::Search { bit, slot } => match slot {
                // id bit: wired-AND over every participant
                0 => {
                    self.phase = Phase::Search { bit, slot: 1 };
                    self.devices
                        .iter()
                        .filter(|d| d.in_search)
                        .all(|d| d.rom_bit(bit))
                }
                // complement bit
                1 => {
                    self.phase = Phase::Search { bit, slot: 2 };
                    self.devices
                        .iter()
                        .filter(|d| d.in_search)
                        .all(|d| !d.rom_bit(bit))
                }
                // direction write: devices off the chosen branch go mute
                _ => {
                    for device in &mut self.devices {
                        if device.in_search && device.rom_bit(bit) != sent {
                            device.in_search = false;
                        }
                    }
                    self.phase = if bit == 63 {
                        Phase::Inert
                    } else {
                        Phase::Search {
                            bit: bit + 1,
                            slot: 0,
                        }
                    };
                    true
                }
            },

            Phase::MatchRom { bit } => {
                for device in &mut self.devices {
                    if device.selected && device.rom_bit(bit) != sent {
                        device.selected = false;
                    }
                }
                self.phase = if bit == 63 {
                    Phase::FunctionCommand { bits: 0, count: 0 }
                } else {
                    Phase::MatchRom { bit: bit + 1 }
                };
                true
            }

            Phase::FunctionCommand { mut bits, count } => {
                bits |= (sent as u8) << count;
                if count == 7 {
                    self.dispatch_function_command(bits);
                } else {
                    self.phase = Phase::FunctionCommand {
                        bits,
                        count: count + 1,
                    };
                }
                true
            }

            Phase::ReadScratchpad { bit } => {
                let released = self
                    .devices
                    .iter()
                    .filter(|d| d.selected)
                    .all(|d| d.scratchpad_bit(bit));
                self.phase = if bit == 71 {
                    Phase::Inert
                } else {
                    Phase::ReadScratchpad { bit: bit + 1 }
                };
                released
            }

            Phase::WriteScratchpad { mut bytes, bits } => {
                if sent {
                    bytes[(bits / 8) as usize] |= 1 << (bits % 8);
                }
                if bits == 23 {
                    for device in &mut self.devices {
                        if device.selected {
                            device.scratchpad[2] = bytes[0];
                            device.scratchpad[3] = bytes[1];
                            device.scratchpad[4] = bytes[2];
                            device.scratchpad[8] = crc8(&device.scratchpad[..8]);
                        }
                    }
                    self.phase = Phase::Inert;
                } else {
                    self.phase = Phase::WriteScratchpad {
                        bytes,
                        bits: bits + 1,
                    };
                }
                true
            }
        }
    }
}

impl UartWire for SimBus {
    type Error = SimTimeout;

    fn set_speed(&mut self, speed: Speed) -> Result<(), Self::Error> {
        self.speed = speed;
        Ok(())
    }

    fn transfer(&mut self, word: u8) -> Result<u8, Self::Error> {
        if self.fail_next {
            self.fail_next = false;
            return Err(SimTimeout);
        }
        self.transfers += 1;

        if self.speed == Speed::Reset {
            return Ok(self.on_reset(word));
        }

        let released = self.slot(word == 0xFF);
        Ok(if released { word } else { 0x00 })
    }

    fn reinit(&mut self) -> Result<(), Self::Error> {
        self.reinits += 1;
        self.phase = Phase::Idle;
        Ok(())
    }
}

pub struct TestClock(Cell<u32>);

impl TestClock {
    pub fn new() -> Self {
        TestClock(Cell::new(0))
    }

    pub fn set_ms(&self, now: u32) {
        self.0.set(now);
    }

    pub fn advance_ms(&self, delta: u32) {
        self.0.set(self.0.get() + delta);
    }
}

impl TickSource for TestClock {
    fn now_ms(&self) -> u32 {
        self.0.get()
    }
}
