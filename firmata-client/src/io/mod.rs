//! Defines the Firmata protocol engine and the transports it runs on.

mod data;
pub mod firmata;
mod pins;
mod transports;

pub use data::*;
pub use firmata::*;
pub use pins::*;
pub use transports::*;
