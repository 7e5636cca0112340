//! Mapping between controller actions, HID reports and the on-screen keyboard.
//!
//! - [`actions`] - the fixed action set and its resolved handles
//! - [`keyboard`] - sticky modifiers and host LED decoding

pub mod actions;
pub mod error;
pub mod keyboard;

pub use error::MappingError;
