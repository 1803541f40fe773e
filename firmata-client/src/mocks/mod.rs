//! Test doubles: an in-memory [`IoTransport`](crate::io::IoTransport) answering like a real
//! board, and a fake [`serialport::SerialPort`].

pub mod serial_port;
pub mod transport;
