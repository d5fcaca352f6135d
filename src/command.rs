pub trait OpCode {
    fn op_code(&self) -> u8;
}

/// ROM-level addressing commands, understood by every 1-Wire device.
#[derive(Clone, Copy, Debug)]
#[repr(u8)]
pub enum Command {
    MatchRom = 0x55,
    SearchRom = 0xF0,
    SkipRom = 0xCC,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}
