use crate::errors::{Error, ProtocolError};
use crate::io::IoTransport;
use log::trace;
use parking_lot::Mutex;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::fmt::{Display, Formatter};
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::Duration;

/// Default Firmata baud rate (StandardFirmata sketches use 57600).
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// A serial port handle shared between clones of the transport.
type SharedPort = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

/// Serial transport layer: 8 data bits, no parity, one stop bit, no flow control.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug)]
pub struct Serial {
    /// The connection port.
    port: String,
    /// The connection speed.
    baud_rate: u32,
    /// How long a read waits for a byte before giving the hand back.
    timeout: Duration,
    /// Write side of the connection.
    #[cfg_attr(feature = "serde", serde(skip))]
    io: SharedPort,
    /// Read side of the connection: a clone of the port so reads never hold the write lock.
    #[cfg_attr(feature = "serde", serde(skip))]
    reader: SharedPort,
}

impl Serial {
    /// Constructs a new `Serial` transport layer instance for communication through the specified port.
    ///
    /// # Example
    /// ```no_run
    /// use firmata_client::io::{Firmata, Serial};
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let board = Firmata::open(Serial::new("/dev/ttyACM0")).await;
    /// }
    /// ```
    pub fn new<P: Into<String>>(port: P) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(100),
            io: Arc::new(Mutex::new(None)),
            reader: Arc::new(Mutex::new(None)),
        }
    }

    /// Uses a custom baud rate: the board sketch must have been configured accordingly.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Sets how long a single read waits for incoming data.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retrieves the configured port.
    pub fn get_port(&self) -> String {
        self.port.clone()
    }

    /// Retrieves the configured baud rate.
    pub fn get_baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Binds an opened serial port to this transport (write side + cloned read side).
    fn attach(&mut self, port: Box<dyn SerialPort>) -> Result<(), Error> {
        let reader = port.try_clone()?;
        *self.io.lock() = Some(port);
        *self.reader.lock() = Some(reader);
        Ok(())
    }
}

impl Default for Serial {
    /// Creates a new serial transport connection with the first available port or an empty string if no ports are available.
    ///
    /// # Notes
    /// The first available port will be used, None otherwise, which will probably lead to an error
    /// during the open phase.
    #[cfg(not(tarpaulin_include))]
    fn default() -> Self {
        let ports = serialport::available_ports().unwrap_or_else(|_| vec![]);
        match ports.first() {
            Some(port) => Self::new(&port.port_name),
            None => Self::new(""),
        }
    }
}

impl Display for Serial {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Serial({}@{})", self.port, self.baud_rate)
    }
}

impl IoTransport for Serial {
    #[cfg(not(tarpaulin_include))]
    fn open(&mut self) -> Result<(), Error> {
        let connexion = serialport::new(self.port.clone(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.timeout)
            .open()?;
        trace!("Serial port is now opened: {:?}", connexion.name());
        self.attach(connexion)
    }

    fn close(&mut self) -> Result<(), Error> {
        *self.io.lock() = None;
        *self.reader.lock() = None;
        trace!("Serial port {} closed", self.port);
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut lock = self.io.lock();
        let port = lock.as_mut().ok_or(ProtocolError::NotInitialized)?;
        port.write_all(buf)?;
        port.flush()?;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<Option<u8>, Error> {
        let mut lock = self.reader.lock();
        let port = lock.as_mut().ok_or(ProtocolError::NotInitialized)?;
        let mut buf = [0u8; 1];
        match port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(err) if err.kind() == ErrorKind::TimedOut => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl From<serialport::Error> for Error {
    fn from(value: serialport::Error) -> Self {
        std::io::Error::from(value).into()
    }
}
