//! Firmata protocol constants
//! <https://github.com/firmata/protocol/blob/master/protocol.md#message-types>

// ########################################
// Message command bytes (128-255/0x80-0xFF)

/// Send data for a digital port (collection of 8 pins)
pub const DIGITAL_MESSAGE: u8 = 0x90;
/// Send data for an analog pin (or PWM)
pub const ANALOG_MESSAGE: u8 = 0xE0;
/// Enable analog input by channel #
pub const REPORT_ANALOG: u8 = 0xC0;
/// Enable digital input by port
pub const REPORT_DIGITAL: u8 = 0xD0;
/// Mask isolating the message family from the port/channel nibble.
pub const MESSAGE_FAMILY_MASK: u8 = 0xF0;
/// Mask isolating the port/channel nibble.
pub const MESSAGE_NIBBLE_MASK: u8 = 0x0F;
//
/// Set a pin to INPUT/OUTPUT/PWM/etc
pub const SET_PIN_MODE: u8 = 0xF4;
//
/// Report protocol version
pub const REPORT_VERSION: u8 = 0xF9;
/// Reset from MIDI
pub const SYSTEM_RESET: u8 = 0xFF;
//
/// Start a MIDI Sysex message
pub const START_SYSEX: u8 = 0xF0;
/// End a MIDI Sysex message
pub const END_SYSEX: u8 = 0xF7;

// ########################################
// Extended command set using sysex (0-127/0x00-0x7F)

/// Communicate with serial devices (serial bridge)
pub const SERIAL_DATA: u8 = 0x60;
/// Ask for mapping of analog to pin numbers
pub const ANALOG_MAPPING_QUERY: u8 = 0x69;
/// Reply with analog mapping info
pub const ANALOG_MAPPING_RESPONSE: u8 = 0x6A;
/// Ask for supported modes and resolution of all pins
pub const CAPABILITY_QUERY: u8 = 0x6B;
/// Reply with supported modes and resolution
pub const CAPABILITY_RESPONSE: u8 = 0x6C;
/// Analog write (PWM, Servo, etc.) to any pin
pub const EXTENDED_ANALOG: u8 = 0x6F;
/// String message with 14-bits per char
pub const STRING_DATA: u8 = 0x71;
/// Report name and version of the firmware
pub const REPORT_FIRMWARE: u8 = 0x79;
/// Set the poll rate of the main loop
pub const SAMPLING_INTERVAL: u8 = 0x7A;
/// Communicate with SPI devices (SPI bridge)
pub const SPI_DATA: u8 = 0x80;

// ########################################
// Payload markers

/// Ends the list of modes of a pin in a CAPABILITY_RESPONSE.
pub const PIN_CAPABILITY_TERMINATOR: u8 = 0x7F;
/// Marks a pin without analog channel in an ANALOG_MAPPING_RESPONSE.
pub const NO_ANALOG_CHANNEL: u8 = 0x7F;
/// Mask applied to every byte sent inside a payload.
pub const SEVEN_BIT_MASK: u8 = 0x7F;

// ########################################
// Serial bridge sub-commands (OR-ed with the serial port id)

/// Configure a serial port (baud rate, buffer size, terminator)
pub const SERIAL_CONFIG: u8 = 0x10;
/// Send/receive data through a serial port
pub const SERIAL_COMM: u8 = 0x20;
/// Flush a serial port
pub const SERIAL_FLUSH: u8 = 0x30;
/// Close a serial port
pub const SERIAL_CLOSE: u8 = 0x40;

// ########################################
// SPI bridge sub-commands

/// Configure chip-select pin and SPI mode
pub const SPI_CONFIG: u8 = 0x10;
/// Synchronous write-read transaction
pub const SPI_COMM: u8 = 0x20;

// ########################################
// Limits

/// Digital pins are grouped by 8 in ports.
pub const PINS_PER_PORT: u8 = 8;
/// Number of digital ports tracked by the client.
pub const DIGITAL_PORTS: usize = 8;
/// Largest value a 14-bit field can carry.
pub const MAX_14_BITS: u16 = 0x3FFF;
/// Highest pin addressable through a plain ANALOG_MESSAGE.
pub const MAX_ANALOG_MESSAGE_PIN: u8 = 0x0F;
