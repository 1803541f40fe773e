use std::fmt::{Display, Formatter};

use crate::errors::{Error, ProtocolError};
use crate::io::firmata::constants::{
    ANALOG_MESSAGE, DIGITAL_MESSAGE, MESSAGE_FAMILY_MASK, MESSAGE_NIBBLE_MASK, PINS_PER_PORT,
};

/// An input report decoded by the frame reader: the state of a digital port or the value of an
/// analog channel.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FirmataValue {
    /// The message command byte: family (`0x90` digital, `0xE0` analog) OR-ed with the
    /// port/channel.
    command: u8,
    /// The 14-bit value carried by the message.
    value: u16,
    /// The pin of an analog channel, resolved with the board mapping at decode time.
    analog_pin: Option<u8>,
}

impl FirmataValue {
    pub fn new(command: u8, value: u16, analog_pin: Option<u8>) -> Self {
        Self {
            command,
            value,
            analog_pin,
        }
    }

    pub fn command(&self) -> u8 {
        self.command
    }

    /// The raw 14-bit value.
    pub fn value(&self) -> u16 {
        self.value
    }

    pub fn is_analog(&self) -> bool {
        self.command & MESSAGE_FAMILY_MASK == ANALOG_MESSAGE
    }

    pub fn is_digital(&self) -> bool {
        self.command & MESSAGE_FAMILY_MASK == DIGITAL_MESSAGE
    }

    /// The port (digital) or channel (analog) the value belongs to.
    pub fn index(&self) -> u8 {
        self.command & MESSAGE_NIBBLE_MASK
    }

    /// The pin reporting an analog value, when the channel is mapped.
    pub fn analog_pin(&self) -> Option<u8> {
        self.analog_pin
    }

    /// The magnitude of an analog report (0..=16383).
    ///
    /// # Errors
    /// * `WrongValueKind`: this is a digital report.
    pub fn analog_value(&self) -> Result<u16, Error> {
        match self.is_analog() {
            true => Ok(self.value),
            false => Err(ProtocolError::WrongValueKind {
                expected: "an analog",
            }
            .into()),
        }
    }

    /// The levels of the 8 pins of a digital report, lowest pin of the port first.
    ///
    /// # Errors
    /// * `WrongValueKind`: this is an analog report.
    pub fn digital_levels(&self) -> Result<[bool; 8], Error> {
        if !self.is_digital() {
            return Err(ProtocolError::WrongValueKind {
                expected: "a digital",
            }
            .into());
        }
        let mut levels = [false; PINS_PER_PORT as usize];
        for (bit, level) in levels.iter_mut().enumerate() {
            *level = (self.value >> bit) & 0x01 == 0x01;
        }
        Ok(levels)
    }

    /// The level of one `pin` of the board, if this digital report covers it.
    pub fn digital_level(&self, pin: u8) -> Option<bool> {
        if !self.is_digital() || pin / PINS_PER_PORT != self.index() {
            return None;
        }
        Some((self.value >> (pin % PINS_PER_PORT)) & 0x01 == 0x01)
    }
}

impl Display for FirmataValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (self.is_analog(), self.analog_pin) {
            (true, Some(pin)) => write!(f, "Analog value {} = {}", pin, self.value),
            (true, None) => write!(f, "Analog channel {} = {}", self.index(), self.value),
            (false, _) => write!(f, "Digital port {} = {:08b}", self.index(), self.value & 0xFF),
        }
    }
}
