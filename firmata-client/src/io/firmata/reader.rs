//! The frame reader: the only consumer of the incoming byte stream.
//!
//! It runs on a blocking thread, splits the stream into frames, decodes them and routes the
//! result: board data updates go to the shared [`IoData`], input reports, serial bridge bytes
//! and SPI replies go to their own channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Notify};

use crate::errors::{Error, ProtocolError};
use crate::io::firmata::codec::{decode_byte, decode_bytes, decode_multibyte_string, decode_u14};
use crate::io::firmata::commands;
use crate::io::firmata::constants::*;
use crate::io::{AnalogChannelMap, FirmataValue, IoData, IoTransport, PinCapabilities, Version};
use crate::utils::format_as_hex;

/// The write side of the connection, shared by the client and the frame reader.
pub(crate) type SharedTransport = Arc<Mutex<Box<dyn IoTransport>>>;

/// What a call to [`FrameReader::read_and_decode`] went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Message {
    /// A byte which does not start any known frame.
    Discarded,
    ProtocolVersion,
    Value,
    StringData,
    CapabilityResponse,
    AnalogMappingResponse,
    ReportFirmware,
    SerialData,
    SpiReply,
    /// An empty or unknown sysex message.
    EmptyResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReaderState {
    /// Nothing is trusted until the board reports its protocol version.
    AwaitingInit,
    Ready,
}

/// An SPI reply: the chip-select pin it answers for and the bytes read.
pub(crate) type SpiReply = (u8, Vec<u8>);

/// Where decoded messages are published.
#[derive(Debug)]
pub(crate) struct ReaderChannels {
    /// Input reports: a full channel blocks the reader until the consumer catches up.
    pub values: mpsc::Sender<FirmataValue>,
    /// Serial bridge bytes: a full channel drops the message.
    pub serial: mpsc::Sender<Vec<u8>>,
    /// Number of serial bridge messages dropped so far.
    pub serial_overflows: Arc<AtomicU64>,
    /// SPI replies: one outstanding transaction at a time.
    pub spi: mpsc::Sender<SpiReply>,
}

#[derive(Debug)]
pub(crate) struct FrameReader {
    /// The read side of the connection.
    pub transport: Box<dyn IoTransport>,
    /// The write side of the connection, used for the queries following the firmware report.
    pub writer: SharedTransport,
    pub data: Arc<RwLock<IoData>>,
    /// Woken whenever the handshake makes progress, and when the reader stops.
    pub ready: Arc<Notify>,
    pub shutdown: watch::Receiver<bool>,
    pub channels: ReaderChannels,
    pub state: ReaderState,
}

impl FrameReader {
    /// Reads and dispatches frames until the connection fails or the client shuts down.
    pub fn run(mut self) {
        debug!("Frame reader started on {}", self.transport);
        loop {
            match self.read_and_decode() {
                Ok(message) => trace!("Frame decoded: {:?}", message),
                Err(error) if error.is_recoverable() => warn!("Frame discarded: {}", error),
                Err(error) => {
                    match self.is_shutting_down() {
                        true => debug!("Frame reader stopped"),
                        false => error!("Frame reader stopped: {}", error),
                    }
                    break;
                }
            }
        }
        self.data.write().connected = false;
        self.ready.notify_one();
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }

    /// Blocks until the next byte. Each read timeout is a chance to notice the shutdown.
    fn read_byte(&mut self) -> Result<u8, Error> {
        loop {
            if let Some(byte) = self.transport.read_byte()? {
                return Ok(byte);
            }
            if self.is_shutting_down() {
                return Err(ProtocolError::Disconnected.into());
            }
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        for slot in buf.iter_mut() {
            *slot = self.read_byte()?;
        }
        Ok(())
    }

    fn write(&self, frame: &[u8]) -> Result<(), Error> {
        trace!("Send: [{}]", format_as_hex(frame));
        self.writer.lock().write(frame)
    }

    /// Sends an item to a bounded channel, waiting for room as long as the client is alive.
    ///
    /// An item nobody listens to anymore is discarded.
    fn publish<T>(&self, sender: &mpsc::Sender<T>, item: T, stream: &str) -> Result<(), Error> {
        let mut shutdown = self.shutdown.clone();
        futures::executor::block_on(async {
            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => {
                    Err(Error::from(ProtocolError::Disconnected))
                }
                sent = sender.send(item) => {
                    if sent.is_err() {
                        debug!("No {} receiver: message discarded", stream);
                    }
                    Ok(())
                }
            }
        })
    }

    /// Reads one frame from the transport, decodes it and dispatches the result.
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#message-types>
    pub fn read_and_decode(&mut self) -> Result<Message, Error> {
        let command = self.read_byte()?;

        if self.state == ReaderState::AwaitingInit && command != REPORT_VERSION {
            debug!("Waiting for the board: 0x{:02X} discarded", command);
            return Ok(Message::Discarded);
        }

        match command {
            REPORT_VERSION => self.handle_protocol_version(),
            START_SYSEX => self.handle_sysex_message(),
            _ if command & MESSAGE_FAMILY_MASK == DIGITAL_MESSAGE => self.handle_value(command),
            _ if command & MESSAGE_FAMILY_MASK == ANALOG_MESSAGE => self.handle_value(command),
            _ => {
                debug!("Unexpected data: 0x{:02X} discarded", command);
                Ok(Message::Discarded)
            }
        }
    }

    /// Handle a REPORT_VERSION message (0xF9 - protocol version).
    fn handle_protocol_version(&mut self) -> Result<Message, Error> {
        let mut buf = [0; 2];
        self.read_exact(&mut buf)?;
        let version = Version::new(buf[0], buf[1]);
        info!("Board protocol version: {}", version);
        self.data.write().handshake.protocol_version = Some(version);
        self.state = ReaderState::Ready;
        self.ready.notify_one();
        Ok(Message::ProtocolVersion)
    }

    /// Handle a DIGITAL_MESSAGE (0x90 - state of a port) or an ANALOG_MESSAGE (0xE0 - value of
    /// an analog channel).
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#data-message-expansion>
    fn handle_value(&mut self, command: u8) -> Result<Message, Error> {
        let mut buf = [0; 2];
        self.read_exact(&mut buf)?;
        let value = decode_u14(buf[0], buf[1]);

        let analog_pin = match command & MESSAGE_FAMILY_MASK {
            ANALOG_MESSAGE => self
                .data
                .read()
                .analog_map
                .pin(command & MESSAGE_NIBBLE_MASK),
            _ => None,
        };

        let value = FirmataValue::new(command, value, analog_pin);
        trace!("Received {}", value);
        self.publish(&self.channels.values, value, "value")?;
        Ok(Message::Value)
    }

    /// Handle a START_SYSEX message: reads up to END_SYSEX and dispatches on the sub-command.
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#sysex-message-format>
    fn handle_sysex_message(&mut self) -> Result<Message, Error> {
        let mut payload = Vec::new();
        loop {
            let byte = self.read_byte()?;
            if byte == END_SYSEX {
                break;
            }
            payload.push(byte);
        }
        trace!("Sysex received: [{}]", format_as_hex(&payload));

        let Some((&command, body)) = payload.split_first() else {
            debug!("Empty sysex discarded");
            return Ok(Message::EmptyResponse);
        };

        match command {
            STRING_DATA => self.handle_string_data(body),
            CAPABILITY_RESPONSE => self.handle_capability_response(body),
            ANALOG_MAPPING_RESPONSE => self.handle_analog_mapping_response(body),
            REPORT_FIRMWARE => self.handle_firmware_report(body),
            SERIAL_DATA => self.handle_serial_reply(body),
            SPI_DATA => self.handle_spi_reply(body),
            _ => {
                debug!("Unexpected sysex 0x{:02X} discarded", command);
                Ok(Message::EmptyResponse)
            }
        }
    }

    /// Handle a STRING_DATA message (0x71 - text sent by the firmware).
    fn handle_string_data(&mut self, body: &[u8]) -> Result<Message, Error> {
        info!("Board says: {}", decode_multibyte_string(body));
        Ok(Message::StringData)
    }

    /// Handle a CAPABILITY_RESPONSE message (0x6C - supported modes and resolution of all pins).
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#capability-query>
    fn handle_capability_response(&mut self, body: &[u8]) -> Result<Message, Error> {
        let capabilities = PinCapabilities::parse(body);
        debug!("Received capabilities for {} pins", capabilities.len());
        {
            let mut data = self.data.write();
            data.capabilities = Arc::new(capabilities);
            data.handshake.capabilities_ready = true;
        }
        self.ready.notify_one();
        Ok(Message::CapabilityResponse)
    }

    /// Handle an ANALOG_MAPPING_RESPONSE message (0x6A - analog channel of each pin).
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#analog-mapping-query>
    fn handle_analog_mapping_response(&mut self, body: &[u8]) -> Result<Message, Error> {
        let analog_map = AnalogChannelMap::parse(body);
        debug!("Received {} analog channels", analog_map.len());
        {
            let mut data = self.data.write();
            data.analog_map = Arc::new(analog_map);
            data.handshake.analog_mapping_ready = true;
        }
        self.ready.notify_one();
        Ok(Message::AnalogMappingResponse)
    }

    /// Handle a REPORT_FIRMWARE message (0x79 - name and version of the firmware), then asks
    /// for the analog mapping and the pin capabilities.
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#query-firmware-name-and-version>
    fn handle_firmware_report(&mut self, body: &[u8]) -> Result<Message, Error> {
        if body.len() < 2 {
            return Err(ProtocolError::MessageTooShort {
                operation: "handle_firmware_report",
                expected: 2,
                received: body.len(),
            }
            .into());
        }
        let version = Version::new(body[0], body[1]);
        let name = decode_multibyte_string(&body[2..]);
        info!("Firmware: {} [{}]", name, version);
        {
            let mut data = self.data.write();
            data.handshake.firmware_version = Some(version);
            data.handshake.firmware_name = name;
            data.handshake.firmware_ready = true;
        }
        self.ready.notify_one();

        self.write(&commands::query_analog_mapping())?;
        self.write(&commands::query_capabilities())?;
        Ok(Message::ReportFirmware)
    }

    /// Handle a SERIAL_DATA reply (0x60 - bytes received by a board-side serial port).
    /// <https://github.com/firmata/protocol/blob/master/serial-1.0.md>
    fn handle_serial_reply(&mut self, body: &[u8]) -> Result<Message, Error> {
        let Some((&port, data)) = body.split_first() else {
            return Err(ProtocolError::MessageTooShort {
                operation: "handle_serial_reply",
                expected: 1,
                received: 0,
            }
            .into());
        };
        let bytes = decode_bytes(data);
        trace!(
            "Serial port {} received: [{}]",
            port & MESSAGE_NIBBLE_MASK,
            format_as_hex(&bytes)
        );

        match self.channels.serial.try_send(bytes) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.channels.serial_overflows.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("Serial data buffer overflow ({} dropped): no listener?", dropped);
            }
            Err(TrySendError::Closed(_)) => debug!("No serial receiver: message discarded"),
        }
        Ok(Message::SerialData)
    }

    /// Handle an SPI_DATA reply (0x80 - `[sub-command, cs(2), data pairs...]`).
    fn handle_spi_reply(&mut self, body: &[u8]) -> Result<Message, Error> {
        if body.len() < 3 {
            return Err(ProtocolError::MessageTooShort {
                operation: "handle_spi_reply",
                expected: 3,
                received: body.len(),
            }
            .into());
        }
        let cs_pin = decode_byte(body[1], body[2]);
        let reply = decode_bytes(&body[3..]);
        trace!("SPI reply for pin {}: [{}]", cs_pin, format_as_hex(&reply));
        self.publish(&self.channels.spi, (cs_pin, reply), "SPI")?;
        Ok(Message::SpiReply)
    }
}
