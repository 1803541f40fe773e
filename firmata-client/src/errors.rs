use log::error;
use snafu::Snafu;

use crate::io::PinModeId;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Protocol error: {source}.
    ProtocolError { source: ProtocolError },
    /// Hardware error: {source}.
    HardwareError { source: HardwareError },
    /// Unknown error: {info}.
    Unknown { info: String },
}

impl Error {
    /// Anomalies the reader can log and skip: the stream resynchronizes on the next opcode.
    pub(crate) fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ProtocolError {
                source: ProtocolError::MessageTooShort { .. }
            }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        error!("std::io error {:?}", error);
        let info = match error.kind() {
            std::io::ErrorKind::NotFound => String::from("Board not found or already in use"),
            std::io::ErrorKind::PermissionDenied => String::from("Board connection lost"),
            _ => error.to_string(),
        };
        Self::ProtocolError {
            source: ProtocolError::IoException { info },
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(value: ProtocolError) -> Self {
        Self::ProtocolError { source: value }
    }
}

impl From<HardwareError> for Error {
    fn from(value: HardwareError) -> Self {
        Self::HardwareError { source: value }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProtocolError {
    /// {info}
    IoException { info: String },
    /// Connection has not been initialized
    NotInitialized,
    /// Connection to the board is closed
    Disconnected,
    /// Board did not complete the handshake within {millis}ms
    InitializationTimeout { millis: u128 },
    /// Not enough bytes received - '{operation}' expected {expected} bytes, {received} received
    MessageTooShort {
        operation: &'static str,
        expected: usize,
        received: usize,
    },
    /// Value {value} is out of range for '{context}' (max {max})
    ValueOutOfRange {
        value: u32,
        max: u32,
        context: &'static str,
    },
    /// No SPI reply received within {millis}ms
    SpiTimeout { millis: u128 },
    /// The {channel} channel has already been taken
    ChannelTaken { channel: &'static str },
    /// Value is not {expected} report
    WrongValueKind { expected: &'static str },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum HardwareError {
    /// Pin ({pin}) not compatible with mode ({mode}) - {context}
    IncompatibleMode {
        pin: u8,
        mode: PinModeId,
        context: &'static str,
    },
    /// Unknown pin {pin}
    UnknownPin { pin: u8 },
    /// Pin {pin} is not mapped to an analog channel
    NoAnalogChannel { pin: u8 },
    /// Port {port} cannot be addressed
    PortOutOfRange { port: u8 },
}
