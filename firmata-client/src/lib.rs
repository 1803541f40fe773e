#![doc(html_root_url = "https://docs.rs/firmata-client/0.1.0")]

//! <h1 align="center">FIRMATA-CLIENT - A host-side Firmata protocol engine</h1>
//!
//! # Documentation
//!
//! This crate speaks the [Firmata protocol](https://github.com/firmata/protocol) with a
//! microcontroller connected over a byte-oriented link (a serial port, most of the time).
//!
//! # Features
//!
//! - Opens a [`Firmata`](io::Firmata) client over any [`IoTransport`](io::IoTransport)
//!   ([`Serial`](io::Serial) out of the box) and waits for the board to be ready: firmware
//!   report, pin capabilities and analog mapping are all retrieved before the client is returned.
//! - Pin control: pin modes, digital and analog writes, digital and analog input reporting.
//! - Decoded digital/analog reports are streamed as [`FirmataValue`](io::FirmataValue) events.
//! - Serial bridging (board-side UARTs) and synchronous SPI transactions.
//!
//! # Prerequisites
//!
//! [StandardFirmata.ino](https://github.com/firmata/arduino/blob/main/examples/StandardFirmata/StandardFirmata.ino)
//! (or a compatible sketch) **MUST** be installed on the board.
//!
//! # Getting Started
//!
//! - Add the following to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! firmata-client = "0.1.0"
//! ```
//!
//! - Blink the embedded led on pin 13 and print the value of analog pin 14 (A0):
//! ```no_run
//! use firmata_client::io::{Firmata, PinModeId, Serial};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), firmata_client::errors::Error> {
//!     let board = Firmata::open(Serial::new("/dev/ttyACM0")).await?;
//!
//!     board.set_pin_mode(13, PinModeId::OUTPUT)?;
//!     board.digital_write(13, true)?;
//!
//!     board.set_pin_mode(14, PinModeId::ANALOG)?;
//!     board.enable_analog_input(14, true)?;
//!
//!     let mut values = board.values()?;
//!     while let Some(value) = values.recv().await {
//!         println!("{}", value);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Feature flags
//!
//! - **libudev** -- (enabled by default) Activates `serialport` crate _libudev_ feature under-the-hood (required on Linux only for port listing).
//! - **serde** -- Enables serialize/deserialize capabilities for the board data model.
//! - **mocks** -- Provides a mocked transport and a simulated board (useful for tests mostly).

pub mod errors;
pub mod io;
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
pub mod utils;
