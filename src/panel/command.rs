//! MIPI DCS commands used by the badge LCD

/// Display commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(clippy::upper_case_acronyms)]
pub enum Command {
    /// Software Reset
    SWRESET = 0x01,
    /// Sleep In
    SLPIN = 0x10,
    /// Sleep Out
    SLPOUT = 0x11,
    /// Normal Display Mode On
    NORON = 0x13,
    /// Display Inversion On
    INVON = 0x21,
    /// Display Off
    DISPOFF = 0x28,
    /// Display On
    DISPON = 0x29,
    /// Column Address Set
    CASET = 0x2A,
    /// Row Address Set
    RASET = 0x2B,
    /// Memory Write
    RAMWR = 0x2C,
    /// Memory Data Access Control
    MADCTL = 0x36,
    /// Interface Pixel Format
    COLMOD = 0x3A,
}

impl Command {
    /// Get the command address byte
    #[inline]
    pub fn addr(self) -> u8 {
        self as u8
    }
}
