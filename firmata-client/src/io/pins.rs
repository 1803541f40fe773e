use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};

use log::warn;

use crate::errors::Error;
use crate::io::firmata::constants::{NO_ANALOG_CHANNEL, PIN_CAPABILITY_TERMINATOR};

/// Number of entries in a per-pin mode table: every mode id below [`PinModeId::UNSUPPORTED`] fits.
pub const MODE_TABLE_SIZE: usize = 16;

/// Enumerates the possible modes for a pin.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PinModeId {
    /// Same as INPUT defined in Arduino.
    INPUT = 0,
    /// Same as OUTPUT defined in Arduino.h
    OUTPUT = 1,
    /// Analog pin in analogInput mode
    ANALOG = 2,
    /// Digital pin in PWM output mode
    PWM = 3,
    /// Digital pin in Servo output mode
    SERVO = 4,
    /// shiftIn/shiftOut mode
    SHIFT = 5,
    /// Pin included in I2C setup
    I2C = 6,
    /// Pin configured for 1-wire
    ONEWIRE = 7,
    /// Pin configured for stepper motor
    STEPPER = 8,
    /// Pin configured for rotary encoders
    ENCODER = 9,
    /// Pin configured for serial communication
    SERIAL = 0x0A,
    /// Enable internal pull-up resistor for pin
    PULLUP = 0x0B,
    /// Pin configured for SPI
    SPI = 0x0C,
    /// Pin configured for proximity sensors
    SONAR = 0x0D,
    /// Pin configured for piezzo buzzer tone generation
    TONE = 0x0E,
    /// Pin configured for DHT humidity and temperature sensors
    DHT = 0x0F,
    /// Pin configured to be ignored by digitalWrite and capabilityResponse
    #[default]
    UNSUPPORTED = 0x7F,
}

impl PinModeId {
    /// Converts a `u8` byte value into a `PinModeId`.
    ///
    /// # Errors
    /// * `Unknown`: The value does not match any known pin mode.
    pub fn from_u8(value: u8) -> Result<PinModeId, Error> {
        match value {
            0 => Ok(PinModeId::INPUT),
            1 => Ok(PinModeId::OUTPUT),
            2 => Ok(PinModeId::ANALOG),
            3 => Ok(PinModeId::PWM),
            4 => Ok(PinModeId::SERVO),
            5 => Ok(PinModeId::SHIFT),
            6 => Ok(PinModeId::I2C),
            7 => Ok(PinModeId::ONEWIRE),
            8 => Ok(PinModeId::STEPPER),
            9 => Ok(PinModeId::ENCODER),
            0x0A => Ok(PinModeId::SERIAL),
            0x0B => Ok(PinModeId::PULLUP),
            0x0C => Ok(PinModeId::SPI),
            0x0D => Ok(PinModeId::SONAR),
            0x0E => Ok(PinModeId::TONE),
            0x0F => Ok(PinModeId::DHT),
            0x7F => Ok(PinModeId::UNSUPPORTED),
            x => Err(Error::Unknown {
                info: format!("PinMode not found with value: {}", x),
            }),
        }
    }

    /// Position of this mode in a [`PinCapability`] table, `None` for [`PinModeId::UNSUPPORTED`].
    fn slot(self) -> Option<usize> {
        let slot = self as usize;
        (slot < MODE_TABLE_SIZE).then_some(slot)
    }
}

impl From<PinModeId> for u8 {
    fn from(mode: PinModeId) -> u8 {
        mode as u8
    }
}

impl Display for PinModeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ########################################

/// A mode supported by a pin, with the resolution (number of bits) it works with.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Default, Copy, PartialEq, Eq)]
pub struct PinMode {
    pub id: PinModeId,
    pub resolution: u8,
}

impl Display for PinMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl Debug for PinMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[id: {}, resolution: {}]", self.id, self.resolution)
    }
}

// ########################################

/// The modes a single pin supports, indexed by mode id.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PinCapability {
    modes: [Option<u8>; MODE_TABLE_SIZE],
}

impl PinCapability {
    /// Returns the resolution of `mode` if the pin supports it.
    pub fn supports_mode(&self, mode: PinModeId) -> Option<u8> {
        mode.slot().and_then(|slot| self.modes[slot])
    }

    /// Iterates over the supported modes, in mode id order.
    pub fn supported_modes(&self) -> impl Iterator<Item = PinMode> + '_ {
        self.modes.iter().enumerate().filter_map(|(slot, resolution)| {
            let id = PinModeId::from_u8(slot as u8).ok()?;
            resolution.map(|resolution| PinMode { id, resolution })
        })
    }

    /// True for pins without any capability (reserved or not routed).
    pub fn is_empty(&self) -> bool {
        self.modes.iter().all(Option::is_none)
    }

    fn insert(&mut self, mode: PinModeId, resolution: u8) {
        if let Some(slot) = mode.slot() {
            self.modes[slot] = Some(resolution);
        }
    }
}

impl Debug for PinCapability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.supported_modes()).finish()
    }
}

impl FromIterator<PinMode> for PinCapability {
    fn from_iter<T: IntoIterator<Item = PinMode>>(iter: T) -> Self {
        let mut capability = PinCapability::default();
        for mode in iter {
            capability.insert(mode.id, mode.resolution);
        }
        capability
    }
}

/// The capability table of the whole board: one [`PinCapability`] per pin, pins numbered from 0.
///
/// The table is built once from a CAPABILITY_RESPONSE and only ever replaced as a whole.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PinCapabilities {
    pins: Vec<PinCapability>,
}

impl PinCapabilities {
    /// Parses a CAPABILITY_RESPONSE payload (without the sysex envelope and sub-command).
    ///
    /// The payload is a list of `(mode, resolution)` pairs for each pin, every pin being closed
    /// by a `0x7F` byte. A pin made of the terminator only is a pin without any capability.
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#capability-query>
    pub fn parse(payload: &[u8]) -> Self {
        let mut segments: Vec<&[u8]> = payload.split(|&b| b == PIN_CAPABILITY_TERMINATOR).collect();

        // What follows the last terminator is either nothing or a truncated pin.
        if let Some(tail) = segments.pop() {
            if !tail.is_empty() {
                warn!(
                    "Capability response ended early: {} trailing byte(s) discarded",
                    tail.len()
                );
            }
        }

        let pins = segments
            .into_iter()
            .enumerate()
            .map(|(pin, segment)| {
                let mut capability = PinCapability::default();
                for pair in segment.chunks(2) {
                    match pair {
                        [mode, resolution] => match PinModeId::from_u8(*mode) {
                            Ok(mode) => capability.insert(mode, *resolution),
                            Err(_) => warn!("Pin {}: unknown mode 0x{:02X} skipped", pin, mode),
                        },
                        _ => warn!("Pin {}: dangling capability byte ignored", pin),
                    }
                }
                capability
            })
            .collect();

        Self { pins }
    }

    /// Returns the resolution of `mode` on `pin`, or `None` when the pin does not exist or does
    /// not support the mode.
    pub fn lookup_mode(&self, pin: u8, mode: PinModeId) -> Option<u8> {
        self.pins
            .get(pin as usize)
            .and_then(|capability| capability.supports_mode(mode))
    }

    /// Retrieves the capability of a pin.
    pub fn get(&self, pin: u8) -> Option<&PinCapability> {
        self.pins.get(pin as usize)
    }

    /// Number of pins on the board.
    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PinCapability> {
        self.pins.iter()
    }
}

impl FromIterator<PinCapability> for PinCapabilities {
    fn from_iter<T: IntoIterator<Item = PinCapability>>(iter: T) -> Self {
        Self {
            pins: iter.into_iter().collect(),
        }
    }
}

// ########################################

/// Bidirectional mapping between a pin number and the board internal analog channel.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnalogChannelMap {
    pin_to_channel: BTreeMap<u8, u8>,
    channel_to_pin: BTreeMap<u8, u8>,
}

impl AnalogChannelMap {
    /// Parses an ANALOG_MAPPING_RESPONSE payload: one byte per pin holding its channel, `0x7F`
    /// for pins which are not analog capable.
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#analog-mapping-query>
    pub fn parse(payload: &[u8]) -> Self {
        let mut map = Self::default();
        for (pin, &channel) in payload.iter().enumerate() {
            if channel == NO_ANALOG_CHANNEL {
                continue;
            }
            match u8::try_from(pin) {
                Ok(pin) => {
                    map.pin_to_channel.insert(pin, channel);
                    map.channel_to_pin.insert(channel, pin);
                }
                Err(_) => warn!("Analog mapping: pin index {} cannot be addressed", pin),
            }
        }
        map
    }

    /// The analog channel of `pin`, if any.
    pub fn channel(&self, pin: u8) -> Option<u8> {
        self.pin_to_channel.get(&pin).copied()
    }

    /// The pin reporting on analog `channel`, if any.
    pub fn pin(&self, channel: u8) -> Option<u8> {
        self.channel_to_pin.get(&channel).copied()
    }

    /// All `(pin, channel)` pairs, by pin order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.pin_to_channel.iter().map(|(&pin, &channel)| (pin, channel))
    }

    pub fn len(&self) -> usize {
        self.pin_to_channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pin_to_channel.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_capability_response() {
        let capabilities =
            PinCapabilities::parse(&[0x00, 0x01, 0x01, 0x01, 0x7F, 0x02, 0x0A, 0x7F]);
        assert_eq!(capabilities.len(), 2);

        let pin0 = capabilities.get(0).unwrap();
        assert_eq!(pin0.supports_mode(PinModeId::INPUT), Some(1));
        assert_eq!(pin0.supports_mode(PinModeId::OUTPUT), Some(1));
        assert_eq!(pin0.supports_mode(PinModeId::ANALOG), None);
        assert_eq!(pin0.supported_modes().count(), 2);

        let pin1 = capabilities.get(1).unwrap();
        assert_eq!(pin1.supports_mode(PinModeId::ANALOG), Some(10));
        assert_eq!(pin1.supported_modes().count(), 1);
    }

    #[test]
    fn test_parse_capability_response_with_empty_pin() {
        // Pin 0 and 1 have no capabilities (reserved for the board serial link for instance).
        let capabilities = PinCapabilities::parse(&[0x7F, 0x7F, 0x03, 0x08, 0x04, 0x0E, 0x7F]);
        assert_eq!(capabilities.len(), 3);
        assert!(capabilities.get(0).unwrap().is_empty());
        assert!(capabilities.get(1).unwrap().is_empty());
        assert_eq!(capabilities.lookup_mode(2, PinModeId::PWM), Some(8));
        assert_eq!(capabilities.lookup_mode(2, PinModeId::SERVO), Some(14));
    }

    #[test]
    fn test_parse_truncated_capability_response() {
        // The last pin never got its terminator: it is dropped.
        let capabilities = PinCapabilities::parse(&[0x00, 0x01, 0x7F, 0x01, 0x01]);
        assert_eq!(capabilities.len(), 1);

        // A dangling byte and an unknown mode do not prevent the rest of the pin from parsing.
        let capabilities = PinCapabilities::parse(&[0x00, 0x01, 0x42, 0x01, 0x01, 0x7F]);
        assert_eq!(capabilities.len(), 1);
        assert_eq!(capabilities.get(0).unwrap().supported_modes().count(), 1);

        assert!(PinCapabilities::parse(&[]).is_empty());
    }

    #[test]
    fn test_lookup_mode() {
        let capabilities = PinCapabilities::parse(&[0x00, 0x01, 0x01, 0x01, 0x7F]);
        assert_eq!(capabilities.lookup_mode(0, PinModeId::OUTPUT), Some(1));
        assert_eq!(capabilities.lookup_mode(0, PinModeId::PWM), None);
        assert_eq!(capabilities.lookup_mode(1, PinModeId::OUTPUT), None);
        assert_eq!(capabilities.lookup_mode(0, PinModeId::UNSUPPORTED), None);
    }

    #[test]
    fn test_parse_analog_mapping() {
        let map = AnalogChannelMap::parse(&[0x7F, 0x7F, 0x00, 0x01]);
        assert_eq!(map.len(), 2);
        assert_eq!(map.channel(2), Some(0));
        assert_eq!(map.channel(3), Some(1));
        assert_eq!(map.channel(0), None);
        assert_eq!(map.pin(0), Some(2));
        assert_eq!(map.pin(1), Some(3));
        assert_eq!(map.pin(2), None);
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(2, 0), (3, 1)]);
    }

    #[test]
    fn test_capability_from_iterator() {
        let capability: PinCapability = [
            PinMode {
                id: PinModeId::INPUT,
                resolution: 1,
            },
            PinMode {
                id: PinModeId::UNSUPPORTED,
                resolution: 1,
            },
        ]
        .into_iter()
        .collect();
        assert_eq!(capability.supported_modes().count(), 1);
        assert_eq!(format!("{:?}", capability), "[[id: INPUT, resolution: 1]]");
    }

    #[test]
    fn test_pin_mode_display() {
        let pin_mode = PinMode {
            id: PinModeId::ANALOG,
            resolution: 10,
        };
        assert_eq!(format!("{}", pin_mode), "ANALOG");
        assert_eq!(format!("{:?}", pin_mode), "[id: ANALOG, resolution: 10]");
    }

    #[test]
    fn test_pin_mode_id_conversions() {
        assert_eq!(PinModeId::from_u8(0).unwrap(), PinModeId::INPUT);
        assert_eq!(PinModeId::from_u8(0x0C).unwrap(), PinModeId::SPI);
        assert_eq!(PinModeId::from_u8(0x7F).unwrap(), PinModeId::UNSUPPORTED);

        let error_mode = PinModeId::from_u8(100);
        assert_eq!(
            error_mode.err().unwrap().to_string(),
            "Unknown error: PinMode not found with value: 100."
        );

        assert_eq!(u8::from(PinModeId::SHIFT), 5);
        assert_eq!(format!("{}", PinModeId::PWM), "PWM");
    }
}
