use crate::errors::Error;
use dyn_clone::DynClone;
use std::fmt::{Debug, Display};

pub mod serial;

pub use serial::Serial;

// Makes a Box<dyn IoTransport> clone: the frame reader runs on its own handle.
dyn_clone::clone_trait_object!(IoTransport);

/// The byte link the Firmata protocol runs on.
///
/// Clones of a transport must share the same underlying connection: the client keeps one
/// handle to write commands while the frame reader owns another one to read replies.
pub trait IoTransport: Debug + Display + DynClone + Send + Sync {
    /// Opens communication (in a blocking way) using the transport layer.
    ///
    /// # Notes
    ///  The method is sync and may block until the connection is established.
    fn open(&mut self) -> Result<(), Error>;

    /// Gracefully shuts down the transport layer.
    ///
    /// Any pending or later read from a clone of this transport must fail.
    fn close(&mut self) -> Result<(), Error>;

    /// Writes a complete frame to the connection.
    ///
    /// # Notes
    /// This function blocks until the write operation is complete: frames written from
    /// different threads never interleave.
    fn write(&mut self, buf: &[u8]) -> Result<(), Error>;

    /// Reads the next byte from the connection.
    ///
    /// Returns `Ok(None)` when nothing arrived within the transport read timeout: the caller
    /// gets a chance to stop reading before trying again.
    fn read_byte(&mut self) -> Result<Option<u8>, Error>;
}
