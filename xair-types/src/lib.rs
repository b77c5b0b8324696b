//! # xair-types
//!
//! Shared type definitions for the xair-remote bridge.
//! This crate contains the plain data that crosses between the surface transport,
//! the mixer transport and the state coordinator in `xair-core`.

pub mod action;
mod param;
pub mod surface;

pub use action::*;
pub use param::ParamValue;
pub use surface::*;

/// Number of level/enable slots per channel: the primary level plus ten sends.
pub const SLOT_COUNT: usize = 11;

/// Highest auxiliary send index addressable on a channel.
pub const MAX_SEND: u8 = 10;

/// Index into the level/enable slots of a channel. 0 is the primary level or mute,
/// 1..=10 are the auxiliary sends.
pub type Bus = u8;
