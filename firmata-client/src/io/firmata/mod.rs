//! Official Firmata documentation: https://github.com/firmata/protocol
//! Helper unofficial documentation: https://github.com/martin-eden/firmata_protocol/blob/main/protocol.md

pub mod codec;
pub mod commands;
pub mod constants;
mod options;
mod reader;
mod value;

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::Instant;

pub use commands::{SerialPortId, SpiMode};
pub use options::FirmataOptions;
pub use value::FirmataValue;

use crate::errors::{Error, HardwareError, ProtocolError};
use crate::io::firmata::constants::*;
use crate::io::firmata::reader::{
    FrameReader, ReaderChannels, ReaderState, SharedTransport, SpiReply,
};
use crate::io::{AnalogChannelMap, IoData, IoTransport, PinCapabilities, PinModeId, Version};
use crate::utils::format_as_hex;

/// Largest value a 3 x 7-bit field can carry.
const MAX_21_BITS: u32 = 0x1F_FFFF;

/// A client speaking the [Firmata protocol](https://github.com/firmata/protocol) with a board.
///
/// The client owns the connection: a background frame reader decodes what the board sends while
/// the methods below encode commands. It can only be built through [`Firmata::open`], which
/// returns once the board is ready. Dropping the client stops the reader.
#[derive(Debug)]
pub struct Firmata {
    /// Write side of the connection.
    transport: SharedTransport,
    /// Board data maintained by the frame reader.
    data: Arc<RwLock<IoData>>,
    /// Last level written to each digital pin, one byte per port.
    ports: [AtomicU8; DIGITAL_PORTS],
    options: FirmataOptions,

    // ########################################
    // # Streams fed by the frame reader.
    values: Mutex<Option<mpsc::Receiver<FirmataValue>>>,
    serial: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    serial_overflows: Arc<AtomicU64>,
    /// SPI replies: the lock is held for the whole transaction.
    spi: tokio::sync::Mutex<mpsc::Receiver<SpiReply>>,
    /// Tells the frame reader to stop.
    shutdown: watch::Sender<bool>,
}

impl Firmata {
    /// Opens the connection and waits for the board to be ready, with default options.
    ///
    /// # Example
    /// ```no_run
    /// use firmata_client::io::{Firmata, Serial};
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let board = Firmata::open(Serial::new("/dev/ttyACM0")).await.unwrap();
    ///     println!("{}", board);
    /// }
    /// ```
    ///
    /// # Errors
    /// See [`Firmata::open_with`].
    pub async fn open<T: IoTransport + 'static>(transport: T) -> Result<Self, Error> {
        Self::open_with(transport, FirmataOptions::default()).await
    }

    /// Opens the connection and waits for the board to be ready.
    ///
    /// The board is reset, then the client waits for it to report its firmware, its analog
    /// mapping and its pin capabilities. Whenever the board stays silent for
    /// `options.nudge_interval`, it is reset and queried again.
    ///
    /// # Errors
    /// * `IoException`: the transport could not be opened.
    /// * `InitializationTimeout`: the board did not complete the handshake within
    ///   `options.handshake_timeout`. The transport is closed.
    /// * `Disconnected`: the connection failed during the handshake.
    pub async fn open_with<T: IoTransport + 'static>(
        transport: T,
        options: FirmataOptions,
    ) -> Result<Self, Error> {
        let mut transport: Box<dyn IoTransport> = Box::new(transport);
        transport.open()?;
        debug!("Transport {} opened", transport);

        let (values_tx, values_rx) = mpsc::channel(1);
        let (serial_tx, serial_rx) = mpsc::channel(options.serial_buffer.max(1));
        let (spi_tx, spi_rx) = mpsc::channel(1);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let serial_overflows = Arc::new(AtomicU64::new(0));
        let ready = Arc::new(Notify::new());
        let data = Arc::new(RwLock::new(IoData {
            connected: true,
            ..Default::default()
        }));

        let reader = FrameReader {
            transport: dyn_clone::clone_box(&*transport),
            writer: Arc::new(Mutex::new(transport)),
            data: data.clone(),
            ready: ready.clone(),
            shutdown: shutdown_rx,
            channels: ReaderChannels {
                values: values_tx,
                serial: serial_tx,
                serial_overflows: serial_overflows.clone(),
                spi: spi_tx,
            },
            state: ReaderState::AwaitingInit,
        };
        let board = Self {
            transport: reader.writer.clone(),
            data,
            ports: Default::default(),
            options,
            values: Mutex::new(Some(values_rx)),
            serial: Mutex::new(Some(serial_rx)),
            serial_overflows,
            spi: tokio::sync::Mutex::new(spi_rx),
            shutdown,
        };
        tokio::task::spawn_blocking(move || reader.run());

        if let Err(error) = board.handshake(&ready).await {
            // Nothing useful can be done with a failed close here.
            let _ = board.close();
            return Err(error);
        }
        Ok(board)
    }

    /// Resets the board and waits until the frame reader has seen every handshake reply.
    async fn handshake(&self, ready: &Notify) -> Result<(), Error> {
        self.send(&commands::system_reset())?;

        let nudge_interval = self.options.nudge_interval;
        let mut nudge = tokio::time::interval_at(Instant::now() + nudge_interval, nudge_interval);
        let deadline = tokio::time::sleep(self.options.handshake_timeout);
        tokio::pin!(deadline);

        loop {
            {
                let data = self.data.read();
                if data.handshake.is_complete() {
                    info!(
                        "Board ready: {} [{}] with {} pins",
                        data.handshake.firmware_name,
                        data.handshake.firmware_version.unwrap_or_default(),
                        data.capabilities.len()
                    );
                    return Ok(());
                }
                if !data.connected {
                    return Err(ProtocolError::Disconnected.into());
                }
            }

            tokio::select! {
                _ = ready.notified() => nudge.reset(),
                _ = nudge.tick() => {
                    warn!("Board silent for {:?}: resetting it", nudge_interval);
                    self.send(&commands::system_reset())?;
                    self.send(&commands::report_version())?;
                    self.send(&commands::query_firmware())?;
                }
                _ = &mut deadline => {
                    let millis = self.options.handshake_timeout.as_millis();
                    error!("Board did not complete the handshake within {}ms", millis);
                    return Err(ProtocolError::InitializationTimeout { millis }.into());
                }
            }
        }
    }

    // ########################################
    // Outbound helpers

    /// Sends a complete frame to the board.
    fn send(&self, frame: &[u8]) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(ProtocolError::Disconnected.into());
        }
        trace!("Send: [{}]", format_as_hex(frame));
        let result = self.transport.lock().write(frame);
        result.map_err(|error| self.connection_lost(error))
    }

    /// A failed write ends the connection: the frame reader is stopped and every later call
    /// fails with `Disconnected`.
    fn connection_lost(&self, error: Error) -> Error {
        error!("Connection lost: {}", error);
        self.shutdown.send_replace(true);
        self.data.write().connected = false;
        error
    }

    /// Fails with `UnknownPin` when `pin` is not on the board.
    fn check_pin(&self, pin: u8) -> Result<Arc<PinCapabilities>, Error> {
        let capabilities = self.capabilities();
        match capabilities.get(pin) {
            Some(_) => Ok(capabilities),
            None => Err(HardwareError::UnknownPin { pin }.into()),
        }
    }

    fn check_range(value: u32, max: u32, context: &'static str) -> Result<(), Error> {
        match value > max {
            true => Err(ProtocolError::ValueOutOfRange {
                value,
                max,
                context,
            }
            .into()),
            false => Ok(()),
        }
    }

    // ########################################
    // Pin control

    /// Sets the mode of a pin.
    ///
    /// # Errors
    /// * `UnknownPin`: the board has no such pin.
    /// * `IncompatibleMode`: the pin does not support `mode`.
    pub fn set_pin_mode(&self, pin: u8, mode: PinModeId) -> Result<(), Error> {
        let capabilities = self.check_pin(pin)?;
        capabilities
            .lookup_mode(pin, mode)
            .ok_or(HardwareError::IncompatibleMode {
                pin,
                mode,
                context: "set_pin_mode",
            })?;
        self.send(&commands::set_pin_mode(pin, mode))
    }

    /// Turns input reporting on or off for the port `pin` belongs to.
    ///
    /// # Errors
    /// * `UnknownPin`: the board has no such pin.
    pub fn enable_digital_input(&self, pin: u8, enable: bool) -> Result<(), Error> {
        self.check_pin(pin)?;
        self.send(&commands::report_digital(pin / PINS_PER_PORT, enable))
    }

    /// Turns input reporting on or off for the analog channel of `pin`.
    ///
    /// # Errors
    /// * `NoAnalogChannel`: the pin is not mapped to an analog channel.
    /// * `ValueOutOfRange`: the channel cannot be addressed by REPORT_ANALOG.
    pub fn enable_analog_input(&self, pin: u8, enable: bool) -> Result<(), Error> {
        let channel = self
            .analog_channel(pin)
            .ok_or(HardwareError::NoAnalogChannel { pin })?;
        Self::check_range(
            u32::from(channel),
            u32::from(MAX_ANALOG_MESSAGE_PIN),
            "enable_analog_input",
        )?;
        self.send(&commands::report_analog(channel, enable))
    }

    /// Sets the level of a digital output pin.
    ///
    /// The whole port is written: the other pins of the port keep the level last written to them.
    ///
    /// # Errors
    /// * `UnknownPin`: the board has no such pin.
    /// * `IncompatibleMode`: the pin does not support OUTPUT.
    /// * `PortOutOfRange`: the pin port is not tracked.
    pub fn digital_write(&self, pin: u8, level: bool) -> Result<(), Error> {
        let capabilities = self.check_pin(pin)?;
        capabilities
            .lookup_mode(pin, PinModeId::OUTPUT)
            .ok_or(HardwareError::IncompatibleMode {
                pin,
                mode: PinModeId::OUTPUT,
                context: "digital_write",
            })?;
        let port = pin / PINS_PER_PORT;
        let state = self
            .ports
            .get(port as usize)
            .ok_or(HardwareError::PortOutOfRange { port })?;
        if !self.is_connected() {
            return Err(ProtocolError::Disconnected.into());
        }

        // Port updates only happen under the transport lock: frames leave in update order.
        let mut transport = self.transport.lock();
        let mask = 1 << (pin % PINS_PER_PORT);
        let port_value = match level {
            true => state.load(Ordering::SeqCst) | mask,
            false => state.load(Ordering::SeqCst) & !mask,
        };
        let frame = commands::digital_message(port, port_value);
        trace!("Send: [{}]", format_as_hex(&frame));
        match transport.write(&frame) {
            Ok(()) => {
                state.store(port_value, Ordering::SeqCst);
                Ok(())
            }
            Err(error) => {
                drop(transport);
                Err(self.connection_lost(error))
            }
        }
    }

    /// Writes an analog (PWM or servo) value to a pin.
    ///
    /// Pins above 15 go through the extended analog sysex.
    ///
    /// # Errors
    /// * `UnknownPin`: the board has no such pin.
    /// * `IncompatibleMode`: the pin supports neither PWM nor SERVO.
    /// * `ValueOutOfRange`: the value does not fit in 14 bits.
    pub fn analog_write(&self, pin: u8, value: u16) -> Result<(), Error> {
        let capabilities = self.check_pin(pin)?;
        if capabilities.lookup_mode(pin, PinModeId::PWM).is_none()
            && capabilities.lookup_mode(pin, PinModeId::SERVO).is_none()
        {
            return Err(HardwareError::IncompatibleMode {
                pin,
                mode: PinModeId::PWM,
                context: "analog_write",
            }
            .into());
        }
        Self::check_range(u32::from(value), u32::from(MAX_14_BITS), "analog_write")?;
        match pin > MAX_ANALOG_MESSAGE_PIN {
            true => self.send(&commands::extended_analog(pin, u32::from(value))),
            false => self.send(&commands::analog_message(pin, value)),
        }
    }

    /// Sets how often the board reports its inputs, in milliseconds.
    ///
    /// # Errors
    /// * `ValueOutOfRange`: the interval does not fit in 14 bits.
    pub fn sampling_interval(&self, interval: u16) -> Result<(), Error> {
        Self::check_range(
            u32::from(interval),
            u32::from(MAX_14_BITS),
            "sampling_interval",
        )?;
        self.send(&commands::sampling_interval(interval))
    }

    /// Sends a text message to the firmware.
    pub fn send_string(&self, text: &str) -> Result<(), Error> {
        self.send(&commands::string_data(text))
    }

    /// Takes the stream of input reports (digital ports and analog channels).
    ///
    /// The stream holds a single report: the frame reader waits while it is full, so it must be
    /// drained once input reporting is enabled.
    ///
    /// # Errors
    /// * `ChannelTaken`: the stream has already been taken.
    pub fn values(&self) -> Result<mpsc::Receiver<FirmataValue>, Error> {
        self.values
            .lock()
            .take()
            .ok_or(ProtocolError::ChannelTaken { channel: "values" }.into())
    }

    // ########################################
    // Serial bridge

    /// Configures a board-side serial port. Must be called before writing to the port.
    ///
    /// # Errors
    /// * `ValueOutOfRange`: the baud rate or buffer size does not fit in 21 bits.
    pub fn serial_config(
        &self,
        port: SerialPortId,
        baud_rate: u32,
        buffer_size: u32,
        terminator: u8,
    ) -> Result<(), Error> {
        Self::check_range(baud_rate, MAX_21_BITS, "serial_config baud rate")?;
        Self::check_range(buffer_size, MAX_21_BITS, "serial_config buffer size")?;
        self.send(&commands::serial_config(
            port,
            baud_rate,
            buffer_size,
            terminator,
        ))
    }

    /// Sends bytes through a board-side serial port.
    pub fn serial_write(&self, port: SerialPortId, data: &[u8]) -> Result<(), Error> {
        self.send(&commands::serial_write(port, data))
    }

    pub fn serial_flush(&self, port: SerialPortId) -> Result<(), Error> {
        self.send(&commands::serial_flush(port))
    }

    pub fn serial_close(&self, port: SerialPortId) -> Result<(), Error> {
        self.send(&commands::serial_close(port))
    }

    /// Takes the stream of bytes received by the board-side serial ports, one message per
    /// SERIAL_DATA reply.
    ///
    /// Messages arriving while the stream is full are dropped and counted by
    /// [`Firmata::serial_overflows`].
    ///
    /// # Errors
    /// * `ChannelTaken`: the stream has already been taken.
    pub fn serial_data(&self) -> Result<mpsc::Receiver<Vec<u8>>, Error> {
        self.serial
            .lock()
            .take()
            .ok_or(ProtocolError::ChannelTaken { channel: "serial" }.into())
    }

    /// Number of serial bridge messages dropped because the stream was full.
    pub fn serial_overflows(&self) -> u64 {
        self.serial_overflows.load(Ordering::Relaxed)
    }

    // ########################################
    // SPI bridge

    /// Enables SPI for a chip-select pin.
    ///
    /// # Errors
    /// * `UnknownPin`: the board has no such pin.
    pub fn spi_config(&self, cs_pin: u8, mode: SpiMode) -> Result<(), Error> {
        self.check_pin(cs_pin)?;
        self.send(&commands::spi_config(cs_pin, mode))
    }

    /// Writes `data` to an SPI device and returns the bytes it answered.
    ///
    /// Transactions are serialized: a concurrent call waits for the current one to complete.
    /// Replies for another chip-select pin are discarded.
    ///
    /// # Errors
    /// * `UnknownPin`: the board has no such pin.
    /// * `SpiTimeout`: no reply within `options.spi_timeout`.
    /// * `Disconnected`: the connection is closed.
    pub async fn spi_read_write(&self, cs_pin: u8, data: &[u8]) -> Result<Vec<u8>, Error> {
        self.check_pin(cs_pin)?;
        let mut replies = self.spi.lock().await;
        while let Ok((pin, stale)) = replies.try_recv() {
            warn!("Stale SPI reply for pin {} discarded: [{}]", pin, format_as_hex(&stale));
        }

        self.send(&commands::spi_transfer(cs_pin, data))?;
        let deadline = Instant::now() + self.options.spi_timeout;
        loop {
            match tokio::time::timeout_at(deadline, replies.recv()).await {
                Ok(Some((pin, reply))) if pin == cs_pin => return Ok(reply),
                Ok(Some((pin, reply))) => warn!(
                    "SPI reply for pin {} discarded while waiting for pin {}: [{}]",
                    pin,
                    cs_pin,
                    format_as_hex(&reply)
                ),
                Ok(None) => return Err(ProtocolError::Disconnected.into()),
                Err(_) => {
                    return Err(ProtocolError::SpiTimeout {
                        millis: self.options.spi_timeout.as_millis(),
                    }
                    .into())
                }
            }
        }
    }

    // ########################################
    // Board data

    /// Version of the Firmata protocol implemented by the board.
    pub fn protocol_version(&self) -> Option<Version> {
        self.data.read().handshake.protocol_version
    }

    pub fn firmware_name(&self) -> String {
        self.data.read().handshake.firmware_name.clone()
    }

    pub fn firmware_version(&self) -> Option<Version> {
        self.data.read().handshake.firmware_version
    }

    /// The modes supported by each pin of the board.
    pub fn capabilities(&self) -> Arc<PinCapabilities> {
        self.data.read().capabilities.clone()
    }

    pub fn analog_map(&self) -> Arc<AnalogChannelMap> {
        self.data.read().analog_map.clone()
    }

    /// The analog channel of a pin.
    pub fn analog_channel(&self, pin: u8) -> Option<u8> {
        self.data.read().analog_map.channel(pin)
    }

    /// The pin behind an analog channel.
    pub fn analog_pin(&self, channel: u8) -> Option<u8> {
        self.data.read().analog_map.pin(channel)
    }

    /// The levels last written to the pins of a port, one bit per pin.
    pub fn digital_port_state(&self, port: u8) -> Option<u8> {
        self.ports
            .get(port as usize)
            .map(|state| state.load(Ordering::SeqCst))
    }

    /// True until the client is closed or the connection fails.
    pub fn is_connected(&self) -> bool {
        !*self.shutdown.borrow() && self.data.read().connected
    }

    /// Stops the frame reader and closes the transport.
    pub fn close(&self) -> Result<(), Error> {
        self.shutdown.send_replace(true);
        self.transport.lock().close()
    }
}

impl Drop for Firmata {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

impl Display for Firmata {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let data = self.data.read();
        write!(
            f,
            "Firmata [firmware={}, version={}, protocol={}, transport={}]",
            data.handshake.firmware_name,
            data.handshake.firmware_version.unwrap_or_default(),
            data.handshake.protocol_version.unwrap_or_default(),
            self.transport.lock()
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mocks::transport::{simulated_uno, MockTransport, SIMULATED_FIRMWARE};

    async fn open_simulated_board() -> (Firmata, MockTransport) {
        let transport = MockTransport::simulated_board();
        let board = Firmata::open(transport.clone()).await.unwrap();
        transport.clear_frames();
        (board, transport)
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    fn last_frame(transport: &MockTransport) -> Vec<u8> {
        transport.frames().last().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_handshake() {
        let transport = MockTransport::simulated_board();
        let result = Firmata::open(transport.clone()).await;
        assert!(result.is_ok(), "{:?}", result);
        let board = result.unwrap();

        assert!(transport.is_opened());
        assert_eq!(
            transport.frames(),
            vec![
                vec![0xFF],             // system reset
                vec![0xF0, 0x69, 0xF7], // query analog mapping
                vec![0xF0, 0x6B, 0xF7], // query capabilities
            ],
            "Sending sequence is correct"
        );
        assert!(board.is_connected());
        assert_eq!(board.protocol_version(), Some(Version::new(2, 5)));
        assert_eq!(board.firmware_version(), Some(Version::new(2, 5)));
        assert_eq!(board.firmware_name(), SIMULATED_FIRMWARE);
        assert_eq!(board.capabilities().len(), 20);
        assert_eq!(board.analog_map().len(), 6);
        assert_eq!(board.analog_channel(14), Some(0));
        assert_eq!(board.analog_pin(5), Some(19));
        assert_eq!(
            board.to_string(),
            "Firmata [firmware=StandardFirmata.ino, version=2.5, protocol=2.5, transport=MockTransport]"
        );
    }

    #[tokio::test]
    async fn test_handshake_nudge() {
        // The board misses the first reset.
        let mut resets = 0;
        let transport = MockTransport::with_responder(move |frame: &[u8]| {
            if matches!(frame, [0xFF]) {
                resets += 1;
                if resets == 1 {
                    return vec![];
                }
            }
            simulated_uno(frame)
        });
        let options = FirmataOptions::default()
            .with_nudge_interval(Duration::from_millis(20))
            .with_handshake_timeout(Duration::from_secs(5));

        let result = Firmata::open_with(transport.clone(), options).await;
        assert!(result.is_ok(), "{:?}", result);
        let frames = transport.frames();
        assert_eq!(
            &frames[..4],
            &[
                vec![0xFF],
                vec![0xFF],
                vec![0xF9],
                vec![0xF0, 0x79, 0xF7]
            ],
            "The board is reset and queried again"
        );
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let transport = MockTransport::default();
        let options = FirmataOptions::default()
            .with_nudge_interval(Duration::from_millis(20))
            .with_handshake_timeout(Duration::from_millis(100));

        let result = Firmata::open_with(transport.clone(), options).await;
        assert!(result.is_err());
        assert_eq!(
            result.err().unwrap().to_string(),
            "Protocol error: Board did not complete the handshake within 100ms."
        );
        assert!(transport.is_closed(), "The transport is closed");
        let frames = transport.frames();
        assert_eq!(frames[0], vec![0xFF]);
        assert!(frames.contains(&vec![0xF0, 0x79, 0xF7]), "Nudges were sent");
    }

    #[tokio::test]
    async fn test_handshake_disconnected() {
        let transport = MockTransport::default();
        let options = FirmataOptions::default().with_handshake_timeout(Duration::from_secs(5));

        let remote = transport.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            remote.disconnect();
        });

        let result = Firmata::open_with(transport, options).await;
        assert_eq!(
            result.err().unwrap().to_string(),
            "Protocol error: Connection to the board is closed."
        );
    }

    #[tokio::test]
    async fn test_set_pin_mode() {
        let (board, transport) = open_simulated_board().await;

        assert!(board.set_pin_mode(13, PinModeId::OUTPUT).is_ok());
        assert_eq!(last_frame(&transport), vec![0xF4, 0x0D, 0x01]);
        assert!(board.set_pin_mode(14, PinModeId::ANALOG).is_ok());
        assert_eq!(last_frame(&transport), vec![0xF4, 0x0E, 0x02]);

        let result = board.set_pin_mode(14, PinModeId::PWM);
        assert_eq!(
            result.err().unwrap().to_string(),
            "Hardware error: Pin (14) not compatible with mode (PWM) - set_pin_mode."
        );
        let result = board.set_pin_mode(66, PinModeId::OUTPUT);
        assert_eq!(
            result.err().unwrap().to_string(),
            "Hardware error: Unknown pin 66."
        );
        assert_eq!(transport.frames().len(), 2, "No frame sent on error");
    }

    #[tokio::test]
    async fn test_digital_write() {
        let (board, transport) = open_simulated_board().await;

        assert!(board.digital_write(3, true).is_ok());
        assert_eq!(last_frame(&transport), vec![0x90, 0x08, 0x00]);
        assert!(board.digital_write(4, false).is_ok());
        assert_eq!(last_frame(&transport), vec![0x90, 0x08, 0x00]);
        assert!(board.digital_write(4, false).is_ok());
        assert_eq!(last_frame(&transport), vec![0x90, 0x08, 0x00]);
        assert!(board.digital_write(4, true).is_ok());
        assert_eq!(last_frame(&transport), vec![0x90, 0x18, 0x00]);
        assert!(board.digital_write(3, false).is_ok());
        assert_eq!(last_frame(&transport), vec![0x90, 0x10, 0x00]);
        assert_eq!(board.digital_port_state(0), Some(0x10));

        assert!(board.digital_write(13, true).is_ok());
        assert_eq!(last_frame(&transport), vec![0x91, 0x20, 0x00]);
        assert!(board.digital_write(7, true).is_ok());
        assert_eq!(last_frame(&transport), vec![0x90, 0x10, 0x01]);
        assert_eq!(board.digital_port_state(1), Some(0x20));
        assert_eq!(board.digital_port_state(8), None);

        let result = board.digital_write(66, true);
        assert_eq!(
            result.err().unwrap().to_string(),
            "Hardware error: Unknown pin 66."
        );
        assert_eq!(transport.frames().len(), 7, "No frame sent on error");
    }

    #[tokio::test]
    async fn test_write_failure_ends_connection() {
        let (board, transport) = open_simulated_board().await;
        assert!(board.digital_write(13, true).is_ok());
        assert_eq!(board.digital_port_state(1), Some(0x20));

        transport.break_writes();
        let result = board.digital_write(12, true);
        assert_eq!(
            result.err().unwrap().to_string(),
            "Protocol error: broken pipe."
        );
        assert!(!board.is_connected());
        assert_eq!(board.digital_port_state(1), Some(0x20), "Failed level not kept");
        assert!(wait_until(|| !board.data.read().connected).await, "Reader stopped");

        let result = board.set_pin_mode(13, PinModeId::OUTPUT);
        assert_eq!(
            result.err().unwrap().to_string(),
            "Protocol error: Connection to the board is closed."
        );
    }

    #[tokio::test]
    async fn test_send_failure_ends_connection() {
        let (board, transport) = open_simulated_board().await;
        transport.break_writes();
        assert!(board.sampling_interval(10).is_err());
        assert!(!board.is_connected());
        let result = board.analog_write(3, 10);
        assert_eq!(
            result.err().unwrap().to_string(),
            "Protocol error: Connection to the board is closed."
        );
    }

    #[tokio::test]
    async fn test_analog_write() {
        let (board, transport) = open_simulated_board().await;

        assert!(board.analog_write(3, 170).is_ok());
        assert_eq!(last_frame(&transport), vec![0xE3, 0x2A, 0x01]);
        // Servo only.
        assert!(board.analog_write(2, 90).is_ok());
        assert_eq!(last_frame(&transport), vec![0xE2, 0x5A, 0x00]);

        let result = board.analog_write(14, 10);
        assert_eq!(
            result.err().unwrap().to_string(),
            "Hardware error: Pin (14) not compatible with mode (PWM) - analog_write."
        );
        let result = board.analog_write(3, 0x4000);
        assert_eq!(
            result.err().unwrap().to_string(),
            "Protocol error: Value 16384 is out of range for 'analog_write' (max 16383)."
        );
        assert_eq!(transport.frames().len(), 2, "No frame sent on error");
    }

    #[tokio::test]
    async fn test_input_reporting() {
        let (board, transport) = open_simulated_board().await;

        assert!(board.enable_digital_input(10, true).is_ok());
        assert_eq!(last_frame(&transport), vec![0xD1, 0x01]);
        assert!(board.enable_digital_input(2, false).is_ok());
        assert_eq!(last_frame(&transport), vec![0xD0, 0x00]);
        assert!(board.enable_analog_input(15, true).is_ok());
        assert_eq!(last_frame(&transport), vec![0xC1, 0x01]);
        assert!(board.sampling_interval(100).is_ok());
        assert_eq!(last_frame(&transport), vec![0xF0, 0x7A, 0x64, 0x00, 0xF7]);
        assert!(board.send_string("Hi").is_ok());
        assert_eq!(
            last_frame(&transport),
            vec![0xF0, 0x71, 0x48, 0x00, 0x69, 0x00, 0xF7]
        );

        let result = board.enable_analog_input(3, true);
        assert_eq!(
            result.err().unwrap().to_string(),
            "Hardware error: Pin 3 is not mapped to an analog channel."
        );
        assert!(board.enable_digital_input(20, true).is_err());
        assert!(board.sampling_interval(0x4000).is_err());
        assert_eq!(transport.frames().len(), 5, "No frame sent on error");
    }

    #[tokio::test]
    async fn test_values() {
        let (board, transport) = open_simulated_board().await;
        let mut values = board.values().unwrap();
        assert_eq!(
            board.values().err().unwrap().to_string(),
            "Protocol error: The values channel has already been taken."
        );

        transport.push(&[0xE0, 0x7F, 0x07, 0x91, 0x20, 0x00]);
        let value = values.recv().await.unwrap();
        assert_eq!(value.analog_pin(), Some(14));
        assert_eq!(value.analog_value().unwrap(), 1023);
        let value = values.recv().await.unwrap();
        assert_eq!(value.digital_level(13), Some(true));
        assert_eq!(value.digital_level(12), Some(false));
    }

    #[tokio::test]
    async fn test_serial_bridge() {
        let (board, transport) = open_simulated_board().await;

        assert!(board
            .serial_config(SerialPortId::HardSerial1, 57_600, 1024, b'\n')
            .is_ok());
        assert_eq!(
            last_frame(&transport),
            vec![0xF0, 0x60, 0x11, 0x00, 0x42, 0x03, 0x00, 0x08, 0x00, 0x0A, 0x00, 0xF7]
        );
        assert!(board.serial_write(SerialPortId::HardSerial1, b"AT").is_ok());
        assert_eq!(
            last_frame(&transport),
            vec![0xF0, 0x60, 0x21, 0x41, 0x00, 0x54, 0x00, 0xF7]
        );
        assert!(board.serial_flush(SerialPortId::HardSerial1).is_ok());
        assert!(board.serial_close(SerialPortId::HardSerial1).is_ok());
        assert_eq!(last_frame(&transport), vec![0xF0, 0x60, 0x41, 0xF7]);
        assert!(board
            .serial_config(SerialPortId::SoftSerial, 0x20_0000, 64, 0)
            .is_err());

        let mut serial = board.serial_data().unwrap();
        assert!(board.serial_data().is_err());
        transport.push(&[0xF0, 0x60, 0x21, 0x6F, 0x00, 0x6B, 0x00, 0xF7]);
        assert_eq!(serial.recv().await.unwrap(), b"ok".to_vec());
        assert_eq!(board.serial_overflows(), 0);
    }

    #[tokio::test]
    async fn test_serial_overflow() {
        let transport = MockTransport::simulated_board();
        let options = FirmataOptions::default().with_serial_buffer(1);
        let board = Firmata::open_with(transport.clone(), options).await.unwrap();

        let frame = [0xF0, 0x60, 0x21, 0x6F, 0x00, 0x6B, 0x00, 0xF7];
        transport.push(&[frame, frame, frame].concat());
        assert!(wait_until(|| board.serial_overflows() == 2).await);

        // The reader keeps going.
        let mut values = board.values().unwrap();
        transport.push(&[0xE0, 0x01, 0x00]);
        assert!(values.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_spi() {
        let (board, transport) = open_simulated_board().await;

        assert!(board.spi_config(10, SpiMode::Mode0).is_ok());
        assert_eq!(
            last_frame(&transport),
            vec![0xF0, 0x80, 0x10, 0x0A, 0x00, 0x00, 0x00, 0xF7]
        );
        let reply = board.spi_read_write(10, &[0x01, 0x02]).await;
        assert_eq!(reply.unwrap(), vec![0x02, 0x03]);
    }

    #[tokio::test]
    async fn test_spi_unknown_pin() {
        let (board, transport) = open_simulated_board().await;

        let result = board.spi_config(200, SpiMode::Mode0);
        assert_eq!(
            result.err().unwrap().to_string(),
            "Hardware error: Unknown pin 200."
        );
        let result = board.spi_read_write(20, &[0x01]).await;
        assert_eq!(
            result.err().unwrap().to_string(),
            "Hardware error: Unknown pin 20."
        );
        assert!(transport.frames().is_empty(), "No frame sent on error");
    }

    #[tokio::test]
    async fn test_spi_concurrent_calls() {
        let (board, _) = open_simulated_board().await;

        let (first, second) = tokio::join!(
            board.spi_read_write(10, &[0x01, 0x02]),
            board.spi_read_write(9, &[0x03])
        );
        assert_eq!(first.unwrap(), vec![0x02, 0x03]);
        assert_eq!(second.unwrap(), vec![0x04]);
    }

    #[tokio::test]
    async fn test_spi_stale_reply() {
        let (board, transport) = open_simulated_board().await;

        // A reply nobody asked for.
        transport.push(&[0xF0, 0x80, 0x20, 0x0A, 0x00, 0x09, 0x00, 0xF7]);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let reply = board.spi_read_write(10, &[0x01]).await;
        assert_eq!(reply.unwrap(), vec![0x02]);
    }

    #[tokio::test]
    async fn test_spi_reply_for_other_pin() {
        // A late reply for pin 9 arrives before the one for pin 10.
        let transport = MockTransport::with_responder(|frame: &[u8]| match frame {
            [0xF0, 0x80, 0x20, 0x0A, ..] => [
                vec![0xF0, 0x80, 0x20, 0x09, 0x00, 0x7F, 0x01, 0xF7],
                simulated_uno(frame),
            ]
            .concat(),
            _ => simulated_uno(frame),
        });
        let board = Firmata::open(transport).await.unwrap();

        let reply = board.spi_read_write(10, &[0x01]).await;
        assert_eq!(reply.unwrap(), vec![0x02]);
    }

    #[tokio::test]
    async fn test_spi_timeout() {
        let transport = MockTransport::with_responder(|frame: &[u8]| match frame {
            [0xF0, 0x80, ..] => vec![],
            _ => simulated_uno(frame),
        });
        let options = FirmataOptions::default().with_spi_timeout(Duration::from_millis(50));
        let board = Firmata::open_with(transport, options).await.unwrap();

        let result = board.spi_read_write(10, &[0x01]).await;
        assert_eq!(
            result.err().unwrap().to_string(),
            "Protocol error: No SPI reply received within 50ms."
        );
    }

    #[tokio::test]
    async fn test_close() {
        let (board, transport) = open_simulated_board().await;

        // Fill the value stream so the reader is stuck publishing.
        transport.push(&[0xE0, 0x01, 0x00, 0xE0, 0x02, 0x00, 0xE0, 0x03, 0x00]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(board.is_connected());

        assert!(board.close().is_ok());
        assert!(transport.is_closed());
        assert!(!board.is_connected());
        assert!(wait_until(|| !board.data.read().connected).await, "Reader stopped");

        let result = board.digital_write(13, true);
        assert_eq!(
            result.err().unwrap().to_string(),
            "Protocol error: Connection to the board is closed."
        );
        assert_eq!(board.digital_port_state(1), Some(0), "State untouched");
    }

    #[tokio::test]
    async fn test_connection_lost() {
        let (board, transport) = open_simulated_board().await;
        transport.disconnect();
        assert!(wait_until(|| !board.is_connected()).await);
        assert!(board.set_pin_mode(13, PinModeId::OUTPUT).is_err());
    }
}
