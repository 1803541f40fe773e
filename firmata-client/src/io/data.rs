use std::fmt::{Display, Formatter};
use std::sync::Arc;

use crate::io::{AnalogChannelMap, PinCapabilities};

/// Represents the board data shared between the frame reader and the [`Firmata`](crate::io::Firmata) client.
///
/// This struct is hidden behind an `Arc<RwLock<IoData>>`: the frame reader is its only writer,
/// the client only reads it. Capability table and analog mapping are swapped as a whole, so a
/// reader never observes a partially built table.
#[derive(Clone, Debug, Default)]
pub struct IoData {
    /// Progress of the initialization sequence and what the board reported about itself.
    pub handshake: HandshakeState,
    /// The board pins capabilities.
    pub capabilities: Arc<PinCapabilities>,
    /// The board analog channels mapping.
    pub analog_map: Arc<AnalogChannelMap>,
    /// A boolean indicating whether the frame reader is still running.
    pub connected: bool,
}

/// A `major.minor` version as reported by the board.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Initialization progress: three readiness flags which only ever go from `false` to `true`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HandshakeState {
    /// REPORT_FIRMWARE has been received.
    pub firmware_ready: bool,
    /// ANALOG_MAPPING_RESPONSE has been received.
    pub analog_mapping_ready: bool,
    /// CAPABILITY_RESPONSE has been received.
    pub capabilities_ready: bool,
    /// Version of the Firmata protocol implemented by the board.
    pub protocol_version: Option<Version>,
    /// Version of the firmware (sketch) running on the board.
    pub firmware_version: Option<Version>,
    /// Name of the firmware (sketch) running on the board.
    pub firmware_name: String,
}

impl HandshakeState {
    /// True when the board answered every stage of the initialization sequence.
    pub fn is_complete(&self) -> bool {
        self.firmware_ready && self.analog_mapping_ready && self.capabilities_ready
    }
}
