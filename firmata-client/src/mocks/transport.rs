use std::collections::VecDeque;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::errors::{Error, ProtocolError};
use crate::io::firmata::codec::{decode_bytes, encode_bytes};
use crate::io::firmata::commands::sysex;
use crate::io::firmata::constants::*;
use crate::io::IoTransport;

/// Reacts to a frame written to a [`MockTransport`] with the bytes the board would answer.
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

#[derive(Default)]
struct MockState {
    incoming: VecDeque<u8>,
    frames: Vec<Vec<u8>>,
    responder: Option<Responder>,
    opened: bool,
    closed: bool,
    broken_writes: bool,
}

/// In-memory transport: reads pop from a scripted buffer, writes are recorded frame by frame.
///
/// Clones share the same state, like clones of a real transport share the connection.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// A transport with `data` waiting to be read.
    pub fn with_data(data: &[u8]) -> Self {
        let transport = Self::default();
        transport.push(data);
        transport
    }

    /// A transport answering each written frame through `responder`.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        let transport = Self::default();
        transport.state.lock().responder = Some(Box::new(responder));
        transport
    }

    /// A transport connected to a [`simulated_uno`] board.
    pub fn simulated_board() -> Self {
        Self::with_responder(simulated_uno)
    }

    /// Makes `data` available to the reader, as if the board had sent it.
    pub fn push(&self, data: &[u8]) {
        self.state.lock().incoming.extend(data);
    }

    /// Every frame written so far, in order.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().frames.clone()
    }

    /// Every byte written so far.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().frames.concat()
    }

    pub fn clear_frames(&self) {
        self.state.lock().frames.clear();
    }

    pub fn is_opened(&self) -> bool {
        self.state.lock().opened
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Simulates a lost connection: every later operation fails.
    pub fn disconnect(&self) {
        self.state.lock().closed = true;
    }

    /// Makes every later write fail, while reads keep working.
    pub fn break_writes(&self) {
        self.state.lock().broken_writes = true;
    }
}

impl Debug for MockTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockTransport")
            .field("incoming", &state.incoming.len())
            .field("frames", &state.frames.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl Display for MockTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockTransport")
    }
}

impl IoTransport for MockTransport {
    fn open(&mut self) -> Result<(), Error> {
        let mut state = self.state.lock();
        state.opened = true;
        state.closed = false;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.state.lock().closed = true;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ProtocolError::NotInitialized.into());
        }
        if state.broken_writes {
            return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into());
        }
        state.frames.push(buf.to_vec());
        if let Some(responder) = state.responder.as_mut() {
            let response = responder(buf);
            state.incoming.extend(response);
        }
        Ok(())
    }

    fn read_byte(&mut self) -> Result<Option<u8>, Error> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(ProtocolError::NotInitialized.into());
            }
            if let Some(byte) = state.incoming.pop_front() {
                return Ok(Some(byte));
            }
        }
        // Nothing to read: behave like a short read timeout.
        std::thread::sleep(Duration::from_millis(1));
        Ok(None)
    }
}

// ########################################

/// Name reported by the simulated board firmware.
pub const SIMULATED_FIRMWARE: &str = "StandardFirmata.ino";

/// The frames an UNO-like board running StandardFirmata 2.5 answers with.
///
/// 20 pins: digital pins 0 to 13 (PWM on 3, 5, 6, 9, 10 and 11, servo on 2 to 13) and analog
/// pins 14 to 19 (channels 0 to 5). SPI transactions answer each byte incremented by one.
pub fn simulated_uno(frame: &[u8]) -> Vec<u8> {
    match frame {
        [SYSTEM_RESET] => [report_version(), firmware_report()].concat(),
        [REPORT_VERSION] => report_version(),
        [START_SYSEX, REPORT_FIRMWARE, END_SYSEX] => firmware_report(),
        [START_SYSEX, ANALOG_MAPPING_QUERY, END_SYSEX] => {
            let channels: Vec<u8> = (0..20)
                .map(|pin| match pin {
                    14.. => pin - 14,
                    _ => NO_ANALOG_CHANNEL,
                })
                .collect();
            sysex(ANALOG_MAPPING_RESPONSE, &channels)
        }
        [START_SYSEX, CAPABILITY_QUERY, END_SYSEX] => {
            let mut pins = vec![];
            for pin in 0..20u8 {
                // INPUT, OUTPUT and PULLUP everywhere.
                pins.extend_from_slice(&[0x00, 0x01, 0x01, 0x01, 0x0B, 0x01]);
                match pin {
                    3 | 5 | 6 | 9 | 10 | 11 => pins.extend_from_slice(&[0x03, 0x08, 0x04, 0x0E]),
                    2..=13 => pins.extend_from_slice(&[0x04, 0x0E]),
                    14.. => pins.extend_from_slice(&[0x02, 0x0A]),
                    _ => {}
                }
                pins.push(PIN_CAPABILITY_TERMINATOR);
            }
            sysex(CAPABILITY_RESPONSE, &pins)
        }
        [START_SYSEX, SPI_DATA, SPI_COMM, cs_low, cs_high, data @ .., END_SYSEX] => {
            let reply: Vec<u8> = decode_bytes(data)
                .iter()
                .map(|byte| byte.wrapping_add(1))
                .collect();
            let mut payload = vec![SPI_COMM, *cs_low, *cs_high];
            payload.extend(encode_bytes(&reply));
            sysex(SPI_DATA, &payload)
        }
        _ => vec![],
    }
}

fn report_version() -> Vec<u8> {
    vec![REPORT_VERSION, 0x02, 0x05]
}

fn firmware_report() -> Vec<u8> {
    let mut payload = vec![0x02, 0x05];
    for character in SIMULATED_FIRMWARE.bytes() {
        payload.extend_from_slice(&[character, 0x00]);
    }
    sysex(REPORT_FIRMWARE, &payload)
}
