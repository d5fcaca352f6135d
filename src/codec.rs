//! Mapping between 1-Wire time slots and UART words.
//!
//! One UART word carries exactly one bus bit: the start bit provides the
//! falling edge that opens the slot, and the data bits decide how long the
//! line stays low. A transmitted `0xFF` releases the line right after the
//! start bit (a "1" slot, or a read slot); `0x00` holds it low for the whole
//! frame (a "0" slot). Because the line is open drain, the word captured
//! during transmission reads back as `0xFF` only when no device pulled the
//! line low.

/// Word transmitted for a "1" slot and for every read slot.
pub const SLOT_RELEASE: u8 = 0xFF;

/// Word transmitted for a "0" slot.
pub const SLOT_HOLD: u8 = 0x00;

/// Word transmitted at [`Speed::Reset`](crate::Speed::Reset) to produce the
/// reset pulse; devices answer by deforming the echoed word.
pub const RESET_PULSE: u8 = 0xF0;

pub const fn bit_to_word(bit: bool) -> u8 {
    if bit {
        SLOT_RELEASE
    } else {
        SLOT_HOLD
    }
}

/// A "1" is observed exactly when nothing pulled the line low, i.e. the word
/// came back intact. Any other value means some device asserted a "0".
pub const fn word_to_bit(word: u8) -> bool {
    word == SLOT_RELEASE
}
