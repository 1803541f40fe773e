use std::time::Duration;

/// Tuning of a [`Firmata`](crate::io::Firmata) client.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use firmata_client::io::FirmataOptions;
///
/// let options = FirmataOptions::default()
///     .with_handshake_timeout(Duration::from_secs(10))
///     .with_serial_buffer(32);
/// assert_eq!(options.nudge_interval, Duration::from_secs(15));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirmataOptions {
    /// Silence during the handshake after which the board is reset and queried again.
    pub nudge_interval: Duration,
    /// Time given to the board to complete the whole handshake.
    pub handshake_timeout: Duration,
    /// Number of serial bridge messages kept while nobody reads them.
    pub serial_buffer: usize,
    /// Time given to the board to answer an SPI transaction.
    pub spi_timeout: Duration,
}

impl Default for FirmataOptions {
    fn default() -> Self {
        Self {
            nudge_interval: Duration::from_secs(15),
            handshake_timeout: Duration::from_secs(30),
            serial_buffer: 10,
            spi_timeout: Duration::from_secs(5),
        }
    }
}

impl FirmataOptions {
    pub fn with_nudge_interval(mut self, interval: Duration) -> Self {
        self.nudge_interval = interval;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the serial bridge buffer size (at least 1 message).
    pub fn with_serial_buffer(mut self, size: usize) -> Self {
        self.serial_buffer = size.max(1);
        self
    }

    pub fn with_spi_timeout(mut self, timeout: Duration) -> Self {
        self.spi_timeout = timeout;
        self
    }
}
