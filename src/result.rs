use core::fmt::Debug;

/// Error type
#[derive(Debug, PartialEq, Eq)]
pub enum Error<E: Sized + Debug> {
    /// Operation not meaningful for the current bus population, e.g. a
    /// broadcast scratchpad read with more than one device attached
    Unsupported,
    /// No presence pulse after a reset
    NoPresence,
    /// Checksum mismatch (computed, found)
    CrcMismatch(u8, u8),
    /// Every payload byte read back as zero; the checksum of an all-zero
    /// span is itself zero, so this is reported apart from `CrcMismatch`
    AllZeroPayload,
    /// Sensor index past the end of the registry
    OutOfRange,
    PortError(E),
}

impl<E: Sized + Debug> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::PortError(e)
    }
}
