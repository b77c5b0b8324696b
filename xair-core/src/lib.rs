//! # xair-core
//!
//! Engine for bridging a MIDI control surface to a Behringer X-Air mixer.
//! Keeps the surface's rings and LEDs and the mixer's parameters in step,
//! independent of how the process is started.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Instant;
//! use xair_core::config::Config;
//! use xair_core::dispatch::MixerState;
//! use xair_core::layer::Layout;
//! use xair_core::tempo::TempoCell;
//!
//! let config = Config::load();
//! let layout = Layout::embedded()?;
//! let mut state = MixerState::new(layout, &config.tuning, &config.metering, TempoCell::default());
//!
//! // Handlers collect transport operations instead of performing them
//! let mut effects = Vec::new();
//! state.on_surface_event(event, Instant::now(), &mut effects);
//! // apply_side_effects(&effects, &mut mixer, &mut surface);
//! ```
//!
//! ## Module Overview
//!
//! - [`channel`]: cached levels and enables per parameter group, the shared registry
//! - [`layer`]: layer bindings, control resolution, JSON layout loading
//! - [`dispatch`]: `MixerState`, the coordinator, and its `SideEffect` list
//! - [`tempo`] / [`meter`]: tap tempo, input metering and clip protection
//! - [`midi`] / [`osc`]: the surface and mixer transports
//! - [`runtime`]: the single-writer event loop and shutdown flag
//! - [`config`]: TOML runtime settings (embedded + user override)

pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod layer;
pub mod meter;
pub mod midi;
pub mod osc;
pub mod runtime;
pub mod subprocess;
pub mod tempo;

pub use error::{ConfigError, RemoteError};
