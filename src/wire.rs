use core::fmt::Debug;
use embedded_hal_nb::serial::{Read, Write};

/// Bit rate of the serial transport.
///
/// The bus never cares about the absolute values beyond "slow enough for a
/// valid reset pulse" and "fast enough for a valid data slot"; these are the
/// conventional rates for a 16x-oversampled UART.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    /// Reset pulse rate, one bit ~104 us.
    Reset,
    /// Data slot rate, one bit ~8.7 us.
    Work,
}

impl Speed {
    pub const fn baud_rate(self) -> u32 {
        match self {
            Speed::Reset => 9_600,
            Speed::Work => 115_200,
        }
    }
}

/// Full-duplex serial transport carrying the 1-Wire line.
///
/// `transfer` transmits one word and returns the word simultaneously
/// observed on the wire. The receive side must give up after a fixed short
/// window (one word time is enough); a missing word is a transport error,
/// not a valid bus state.
pub trait UartWire {
    type Error: Debug;

    /// Switch the transport bit rate.
    fn set_speed(&mut self, speed: Speed) -> Result<(), Self::Error>;

    /// Transmit one word and capture the word seen on the wire meanwhile.
    fn transfer(&mut self, word: u8) -> Result<u8, Self::Error>;

    /// Recover the peripheral after a failed transfer left transmit and
    /// receive sides desynchronized.
    fn reinit(&mut self) -> Result<(), Self::Error>;
}

/// Runtime baud rate switching, which no embedded-hal trait covers.
pub trait SetBaudRate {
    type Error: Debug;

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), Self::Error>;
}

/// Error of the [`Serial`] adapter.
#[derive(Debug)]
pub enum SerialError<E, C> {
    /// Word-level transfer failed.
    Word(E),
    /// Baud rate switch failed.
    Config(C),
    /// No word observed within the receive window.
    Timeout,
}

/// [`UartWire`] adapter for ports exposing the `embedded-hal-nb` serial
/// traits plus [`SetBaudRate`].
///
/// The bounded receive wait is a spin on `WouldBlock`; at the slow rate one
/// word lasts ~1 ms, so the budget below covers it with a wide margin on
/// any realistic core clock.
pub struct Serial<U> {
    port: U,
}

impl<U> Serial<U> {
    const RECV_SPINS: u32 = 500_000;

    pub fn new(port: U) -> Self {
        Serial { port }
    }

    pub fn release(self) -> U {
        self.port
    }
}

impl<U, E, C> UartWire for Serial<U>
where
    E: embedded_hal_nb::serial::Error,
    C: Debug,
    U: Read<u8, Error = E> + Write<u8, Error = E> + SetBaudRate<Error = C>,
{
    type Error = SerialError<E, C>;

    fn set_speed(&mut self, speed: Speed) -> Result<(), Self::Error> {
        self.port
            .set_baud_rate(speed.baud_rate())
            .map_err(SerialError::Config)
    }

    fn transfer(&mut self, word: u8) -> Result<u8, Self::Error> {
        nb::block!(self.port.write(word)).map_err(SerialError::Word)?;
        for _ in 0..Self::RECV_SPINS {
            match self.port.read() {
                Ok(word) => return Ok(word),
                Err(nb::Error::WouldBlock) => continue,
                Err(nb::Error::Other(e)) => return Err(SerialError::Word(e)),
            }
        }
        Err(SerialError::Timeout)
    }

    fn reinit(&mut self) -> Result<(), Self::Error> {
        // drop whatever half-received word is still pending
        while self.port.read().is_ok() {}
        Ok(())
    }
}
