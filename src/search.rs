use crate::{Address, Command, Driver, Error, UartWire};
use core::fmt::Debug;

/// Walk position of the ROM enumeration, carried across search calls.
///
/// The search treats the 64-bit address space as an implicit binary tree:
/// each call descends to one leaf (a device), recording in
/// `last_discrepancy` the deepest bit where it took the zero branch while
/// devices disagreed. The following call replays the path up to that bit,
/// takes the one branch there, and so visits every device exactly once.
#[derive(Debug, Clone, Default)]
pub struct DeviceSearch {
    address: [u8; Address::BYTES as usize],
    /// Bit position, 1..=64, of the most recent zero-branch fork.
    last_discrepancy: u8,
    /// Same, restricted to the 8 family code bits.
    last_family_discrepancy: u8,
    last_device: bool,
}

impl DeviceSearch {
    pub fn new() -> DeviceSearch {
        DeviceSearch::default()
    }

    /// Forget the walk position; the next search starts a fresh enumeration.
    pub fn reset(&mut self) {
        *self = DeviceSearch::default();
    }

    /// Position of the deepest fork inside the family code bits, if any.
    pub fn last_family_discrepancy(&self) -> Option<u8> {
        if self.last_family_discrepancy != 0 {
            Some(self.last_family_discrepancy)
        } else {
            None
        }
    }

    fn address_bit(&self, index: u8) -> bool {
        self.address[(index / 8) as usize] & (0x01 << (index % 8)) != 0x00
    }

    fn write_address_bit(&mut self, index: u8, value: bool) {
        let mask = 0x01 << (index % 8);
        if value {
            self.address[(index / 8) as usize] |= mask;
        } else {
            self.address[(index / 8) as usize] &= !mask;
        }
    }

    pub fn into_iter<W: UartWire>(self, driver: &mut Driver<W>) -> DeviceSearchIter<'_, W> {
        DeviceSearchIter {
            search: Some(self),
            driver,
        }
    }
}

pub struct DeviceSearchIter<'a, W: UartWire> {
    search: Option<DeviceSearch>,
    driver: &'a mut Driver<W>,
}

impl<W: UartWire> Iterator for DeviceSearchIter<'_, W> {
    type Item = Result<Address, Error<W::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut search = self.search.take()?;
        let result = self.driver.search_next(&mut search).transpose()?;
        self.search = Some(search);
        Some(result)
    }
}

impl<E: Debug, W: UartWire<Error = E>> Driver<W> {
    /// Starts a fresh enumeration and returns the first device found.
    pub fn search_first(
        &mut self,
        search: &mut DeviceSearch,
    ) -> Result<Option<Address>, Error<E>> {
        search.reset();
        self.search(search, Command::SearchRom)
    }

    /// Continues the enumeration started by [`Driver::search_first`].
    /// Returns `Ok(None)` once every device has been visited.
    pub fn search_next(
        &mut self,
        search: &mut DeviceSearch,
    ) -> Result<Option<Address>, Error<E>> {
        self.search(search, Command::SearchRom)
    }

    fn search(
        &mut self,
        state: &mut DeviceSearch,
        cmd: Command,
    ) -> Result<Option<Address>, Error<E>> {
        if state.last_device {
            return Ok(None);
        }

        if !self.reset_presence()? {
            state.reset();
            return Ok(None);
        }

        self.write_command(cmd)?;

        let mut last_zero = 0_u8;
        let mut exhausted = false;

        for bit_number in 1..=Address::BITS {
            let id_bit = self.read_bit()?;
            let cmp_id_bit = self.read_bit()?;

            if id_bit && cmp_id_bit {
                // nothing answered this slot
                exhausted = true;
                break;
            }

            let direction = if id_bit != cmp_id_bit {
                // every remaining device agrees on this bit
                id_bit
            } else {
                // a real fork; replay below the previous fork, take the
                // one branch at it, the zero branch past it
                let direction = if bit_number < state.last_discrepancy {
                    state.address_bit(bit_number - 1)
                } else {
                    bit_number == state.last_discrepancy
                };
                if !direction {
                    last_zero = bit_number;
                    if last_zero <= 8 {
                        state.last_family_discrepancy = last_zero;
                    }
                }
                direction
            };

            state.write_address_bit(bit_number - 1, direction);
            // writing the chosen bit mutes every device on the other branch
            self.write_bit(direction)?;
        }

        if !exhausted {
            state.last_discrepancy = last_zero;
            if last_zero == 0 {
                state.last_device = true;
            }
            // a zero family code cannot belong to a real device
            if state.address[0] != 0 {
                return Ok(Some(Address::from(state.address)));
            }
        }

        state.reset();
        Ok(None)
    }
}
