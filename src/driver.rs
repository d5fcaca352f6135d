use crate::{codec, Address, Command, Error, OpCode, Speed, UartWire};
use core::fmt::Debug;

/// One 1-Wire line multiplexed onto a serial transport.
///
/// Every transaction starts with [`Driver::reset`]; the composed
/// `reset_*` helpers below enforce that ordering for the common command
/// sequences. A transport failure marks the session faulted; the next reset
/// reinitializes the transport before driving the line again, which is the
/// only recovery performed. Callers retry whole transactions.
pub struct Driver<W: UartWire> {
    wire: W,
    faulted: bool,
}

impl<E: Debug, W: UartWire<Error = E>> Driver<W> {
    pub fn new(wire: W) -> Self {
        Driver {
            wire,
            faulted: false,
        }
    }

    /// Has the last operation left the transport in a failed state?
    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    pub fn wire(&self) -> &W {
        &self.wire
    }

    pub fn wire_mut(&mut self) -> &mut W {
        &mut self.wire
    }

    pub fn release(self) -> W {
        self.wire
    }

    /// Performs a reset and listens for a presence pulse.
    /// Returns `Err(NoPresence)` if no device answered.
    pub fn reset(&mut self) -> Result<(), Error<E>> {
        if self.reset_presence()? {
            Ok(())
        } else {
            Err(Error::NoPresence)
        }
    }

    /// Performs a reset, returning whether a presence pulse was observed.
    ///
    /// The reset pulse is the one word sent at the slow rate, so its low
    /// time satisfies the reset timing; a device answering inside the slot
    /// deforms the echoed word.
    pub fn reset_presence(&mut self) -> Result<bool, Error<E>> {
        if self.faulted {
            self.wire.reinit()?;
            self.faulted = false;
        }

        self.set_speed(Speed::Reset)?;
        let echo = self.transfer(codec::RESET_PULSE);
        self.set_speed(Speed::Work)?;

        Ok(echo? != codec::RESET_PULSE)
    }

    pub fn reset_select_write_only(
        &mut self,
        addr: &Address,
        write: &[u8],
    ) -> Result<(), Error<E>> {
        self.reset()?;
        self.select(addr)?;
        self.write_bytes(write)?;
        Ok(())
    }

    pub fn reset_select_write_read(
        &mut self,
        addr: &Address,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Error<E>> {
        self.reset()?;
        self.select(addr)?;
        self.write_bytes(write)?;
        self.read_bytes(read)?;
        Ok(())
    }

    pub fn reset_skip_write_only(&mut self, write: &[u8]) -> Result<(), Error<E>> {
        self.reset()?;
        self.skip()?;
        self.write_bytes(write)?;
        Ok(())
    }

    pub fn reset_skip_write_read(
        &mut self,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Error<E>> {
        self.reset()?;
        self.skip()?;
        self.write_bytes(write)?;
        self.read_bytes(read)?;
        Ok(())
    }

    /// Broadcasts the Skip-ROM command, addressing every device at once.
    pub fn skip(&mut self) -> Result<(), Error<E>> {
        self.write_command(Command::SkipRom)
    }

    /// Sends the Match-ROM command and the address, routing everything up
    /// to the next reset to exactly one device.
    pub fn select(&mut self, addr: &Address) -> Result<(), Error<E>> {
        self.write_command(Command::MatchRom)?;
        self.write_bytes(addr.as_ref())?;
        Ok(())
    }

    pub fn write_command(&mut self, cmd: impl OpCode) -> Result<(), Error<E>> {
        self.write_byte(cmd.op_code())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error<E>> {
        for b in bytes {
            self.write_byte(*b)?;
        }
        Ok(())
    }

    /// One word per bit, least significant bit first. The word read back is
    /// discarded, but the round trip still happens: the transport is full
    /// duplex and the slot is not over until its echo arrives.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), Error<E>> {
        let mut byte = byte;
        for _ in 0..8 {
            self.write_bit((byte & 0x01) == 0x01)?;
            byte >>= 1;
        }
        Ok(())
    }

    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<(), Error<E>> {
        for d in dst {
            *d = self.read_byte()?;
        }
        Ok(())
    }

    pub fn read_byte(&mut self) -> Result<u8, Error<E>> {
        let mut byte = 0_u8;
        for _ in 0..8 {
            byte >>= 1;
            if self.read_bit()? {
                byte |= 0x80;
            }
        }
        Ok(byte)
    }

    pub(crate) fn write_bit(&mut self, bit: bool) -> Result<(), Error<E>> {
        self.transfer(codec::bit_to_word(bit))?;
        Ok(())
    }

    /// A read slot is a released "1" slot; the answer is whatever the
    /// devices did to the word meanwhile.
    pub(crate) fn read_bit(&mut self) -> Result<bool, Error<E>> {
        let echo = self.transfer(codec::SLOT_RELEASE)?;
        Ok(codec::word_to_bit(echo))
    }

    fn set_speed(&mut self, speed: Speed) -> Result<(), Error<E>> {
        self.wire.set_speed(speed).map_err(|e| {
            self.faulted = true;
            Error::PortError(e)
        })
    }

    fn transfer(&mut self, word: u8) -> Result<u8, Error<E>> {
        self.wire.transfer(word).map_err(|e| {
            self.faulted = true;
            Error::PortError(e)
        })
    }
}
