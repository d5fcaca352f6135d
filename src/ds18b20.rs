//! DS18B20 temperature sensor registry and conversion manager.
//!
//! Discovery enumerates the bus once, keeps every CRC-valid address up to
//! capacity and pushes one resolution configuration to all devices in a
//! single broadcast, matching the hardware reality that every sensor on a
//! shared line runs at the same resolution. Conversions are non-blocking:
//! start one, poll [`Registry::is_ready`] against a millisecond tick
//! source, then read the scratchpad.

use byteorder::{ByteOrder, LittleEndian};

use crate::{Address, DeviceSearch, Driver, Error, OpCode, UartWire};
use core::fmt::Debug;

/// DS18B20 family code.
pub const FAMILY_CODE: u8 = 0x28;

const SCRATCHPAD_BYTES: usize = 9;

// alarm register placeholders written alongside the configuration byte
const ALARM_HIGH: u8 = 0x7F;
const ALARM_LOW: u8 = 0xFF;

#[derive(Clone, Copy, Debug)]
#[repr(u8)]
pub enum Command {
    ConvertTemp = 0x44,
    WriteScratchpad = 0x4E,
    ReadScratchpad = 0xBE,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}

/// Measurement resolution, set bus-wide at discovery time.
///
/// The discriminant is the device configuration byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Resolution {
    Bits9 = 0b0001_1111,
    Bits10 = 0b0011_1111,
    Bits11 = 0b0101_1111,
    Bits12 = 0b0111_1111,
}

impl Resolution {
    pub const fn config_byte(self) -> u8 {
        self as u8
    }

    /// Worst-case conversion time at this resolution.
    pub const fn conversion_time_ms(self) -> u32 {
        match self {
            Resolution::Bits9 => 100,
            Resolution::Bits10 => 195,
            Resolution::Bits11 => 380,
            Resolution::Bits12 => 760,
        }
    }

    /// Decode a configuration byte read back from a scratchpad.
    /// Unrecognized patterns decode as the 12-bit power-on default.
    pub const fn from_config_byte(config: u8) -> Self {
        match config & 0x60 {
            0x00 => Resolution::Bits9,
            0x20 => Resolution::Bits10,
            0x40 => Resolution::Bits11,
            _ => Resolution::Bits12,
        }
    }

    /// At reduced resolution the low raw bits are undefined and get zeroed.
    const fn undefined_bits_mask(self) -> i16 {
        match self {
            Resolution::Bits9 => !0x07,
            Resolution::Bits10 => !0x03,
            Resolution::Bits11 => !0x01,
            Resolution::Bits12 => !0x00,
        }
    }
}

/// Which sensor an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every sensor on the bus at once, via Skip-ROM.
    All,
    /// One sensor by registry index.
    Single(usize),
}

#[derive(Debug, Clone)]
struct Sensor {
    address: Address,
    /// Tick at which the last conversion was started; `None` until the
    /// first one, the reading is not trusted before that.
    started_at: Option<u32>,
    /// Calibration offset in 1/16 degree units, added to every reading.
    correction: i16,
}

impl Sensor {
    fn new(address: Address) -> Self {
        Sensor {
            address,
            started_at: None,
            correction: 0,
        }
    }
}

/// Monotonic millisecond tick counter, read-only.
pub trait TickSource {
    fn now_ms(&self) -> u32;
}

/// Bounded collection of discovered sensors sharing one bus.
///
/// `CAP` bounds how many sensors are tracked; further devices found during
/// discovery are left unregistered.
#[derive(Debug, Clone)]
pub struct Registry<const CAP: usize> {
    sensors: heapless::Vec<Sensor, CAP>,
    resolution: Resolution,
}

impl<const CAP: usize> Registry<CAP> {
    pub fn new(resolution: Resolution) -> Self {
        Registry {
            sensors: heapless::Vec::new(),
            resolution,
        }
    }

    /// Number of sensors admitted by the last [`Registry::discover`].
    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn address(&self, index: usize) -> Option<&Address> {
        self.sensors.get(index).map(|sensor| &sensor.address)
    }

    pub fn correction(&self, index: usize) -> Option<i16> {
        self.sensors.get(index).map(|sensor| sensor.correction)
    }

    /// Stores a calibration offset in 1/16 degree units for one sensor.
    /// Returns whether a sensor at that index existed.
    pub fn set_correction(&mut self, index: usize, correction: i16) -> bool {
        match self.sensors.get_mut(index) {
            Some(sensor) => {
                sensor.correction = correction;
                true
            }
            None => false,
        }
    }

    /// Enumerates the bus, registering every CRC-valid address up to
    /// capacity, then broadcasts the resolution configuration to all
    /// devices in one pass. Returns the number of sensors registered.
    pub fn discover<E: Debug, W: UartWire<Error = E>>(
        &mut self,
        driver: &mut Driver<W>,
    ) -> Result<usize, Error<E>> {
        self.sensors.clear();

        let mut search = DeviceSearch::new();
        while let Some(address) = driver.search_next(&mut search)? {
            if !address.is_crc_valid() {
                continue;
            }
            if self.sensors.push(Sensor::new(address)).is_err() {
                break;
            }
        }

        // one Skip-ROM broadcast configures every sensor in a single pass
        if driver.reset_presence()? {
            driver.skip()?;
            driver.write_bytes(&[
                Command::WriteScratchpad.op_code(),
                ALARM_HIGH,
                ALARM_LOW,
                self.resolution.config_byte(),
            ])?;
        }

        Ok(self.sensors.len())
    }

    /// Starts a temperature conversion and stamps the affected sensors with
    /// the current tick. Does not wait; poll [`Registry::is_ready`].
    pub fn start_conversion<E: Debug, W: UartWire<Error = E>>(
        &mut self,
        driver: &mut Driver<W>,
        clock: &impl TickSource,
        target: Target,
    ) -> Result<(), Error<E>> {
        let now = clock.now_ms();
        match target {
            Target::All => {
                driver.reset_skip_write_only(&[Command::ConvertTemp.op_code()])?;
                for sensor in &mut self.sensors {
                    sensor.started_at = Some(now);
                }
            }
            Target::Single(index) => {
                let address = *self.address(index).ok_or(Error::OutOfRange)?;
                driver.reset_select_write_only(&address, &[Command::ConvertTemp.op_code()])?;
                self.sensors[index].started_at = Some(now);
            }
        }
        Ok(())
    }

    /// Whether enough time has passed since the last conversion start for
    /// the configured resolution. `Target::All` checks sensor 0 as a proxy,
    /// conversions started together finish together. Out-of-range indices
    /// and sensors never started report not ready.
    pub fn is_ready(&self, clock: &impl TickSource, target: Target) -> bool {
        let index = match target {
            Target::All => 0,
            Target::Single(index) => index,
        };
        let Some(sensor) = self.sensors.get(index) else {
            return false;
        };
        let Some(started_at) = sensor.started_at else {
            return false;
        };
        clock.now_ms().wrapping_sub(started_at) >= self.resolution.conversion_time_ms()
    }

    /// Reads one scratchpad and returns the temperature in 1/16 degree
    /// units, low undefined bits masked per the configuration read back,
    /// the sensor's correction added.
    ///
    /// `Target::All` broadcasts the read and is only meaningful with a
    /// single device on the bus; with more, the replies would wire-AND into
    /// garbage, so that case is rejected as [`Error::Unsupported`].
    pub fn read_raw<E: Debug, W: UartWire<Error = E>>(
        &self,
        driver: &mut Driver<W>,
        target: Target,
    ) -> Result<i16, Error<E>> {
        let mut scratchpad = [0_u8; SCRATCHPAD_BYTES];
        let correction = match target {
            Target::All => {
                if self.sensors.len() > 1 {
                    return Err(Error::Unsupported);
                }
                driver.reset_skip_write_read(
                    &[Command::ReadScratchpad.op_code()],
                    &mut scratchpad,
                )?;
                self.correction(0).unwrap_or(0)
            }
            Target::Single(index) => {
                let address = *self.address(index).ok_or(Error::OutOfRange)?;
                driver.reset_select_write_read(
                    &address,
                    &[Command::ReadScratchpad.op_code()],
                    &mut scratchpad,
                )?;
                self.sensors[index].correction
            }
        };

        Ok(decode_scratchpad(&scratchpad)? + correction)
    }
}

/// Checks a raw 9-byte scratchpad and extracts the temperature, low
/// undefined bits zeroed per the configuration byte it carries.
fn decode_scratchpad<E: Debug>(scratchpad: &[u8; SCRATCHPAD_BYTES]) -> Result<i16, Error<E>> {
    // an all-zero response carries a formally valid zero checksum; it is a
    // bus artifact, not a reading
    if scratchpad.iter().all(|byte| *byte == 0) {
        return Err(Error::AllZeroPayload);
    }

    let computed = crate::crc8(&scratchpad[..8]);
    if computed != scratchpad[8] {
        return Err(Error::CrcMismatch(computed, scratchpad[8]));
    }

    let raw = LittleEndian::read_i16(&scratchpad[0..2]);
    Ok(raw & Resolution::from_config_byte(scratchpad[4]).undefined_bits_mask())
}

/// Split raw value to two parts: integer degrees and fraction N.
/// Original value may be calculated as: integer + fraction/10000
pub fn split_temp(raw: i16) -> (i16, i16) {
    if raw >= 0 {
        (raw >> 4, (raw & 0xF) * 625)
    } else {
        let abs = -raw;
        (-(abs >> 4), -625 * (abs & 0xF))
    }
}
