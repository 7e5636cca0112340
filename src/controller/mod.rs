//! Controller subsystem for gamepad input handling
//!
//! 1. [`provider`] - Action-based input abstraction
//! 2. [`gilrs_provider`] - Provider backed by gilrs and the configured bindings
//! 3. [`connection`] - Controller presence tracking
//! 4. [`poller`] - Fixed-rate loop driving the gadget devices
//!
//! # Architecture
//!
//! ```text
//! Gamepad ──► GilrsProvider ──► ConnectionMonitor ──► InputPoller ──► GadgetBridge
//!                                                        ▲
//!                                        on-screen keys ─┘
//! ```
//!
//! The poller runs on its own thread at a 4ms tick by default.

pub mod connection;
pub mod gilrs_provider;
pub mod poller;
pub mod provider;
