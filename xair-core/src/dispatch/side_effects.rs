//! SideEffect: describes transport operations produced by the coordinator.
//!
//! Handlers push side effects into a `Vec<SideEffect>` instead of talking to
//! the mixer or the surface directly. The runtime applies them after the
//! handler returns, so no I/O ever happens while coordinator state is borrowed.

use xair_types::{ParameterWrite, SurfaceFeedback};

use crate::error::RemoteError;

/// A deferred operation produced while handling one event.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    // ── Mixer ──
    /// Write a parameter; the value is already in wire polarity
    Mixer(ParameterWrite),
    /// Ask the mixer to report a parameter
    Query { address: String },

    // ── Surface ──
    Surface(SurfaceFeedback),

    // ── Process ──
    RunCommand { name: String, argv: Vec<String> },
    Shutdown,
}

impl SideEffect {
    pub fn query(address: impl Into<String>) -> Self {
        SideEffect::Query {
            address: address.into(),
        }
    }
}

/// The network side of the bridge as seen by the runtime.
pub trait MixerLink: Send {
    fn send(&mut self, write: &ParameterWrite) -> Result<(), RemoteError>;
    fn query(&mut self, address: &str) -> Result<(), RemoteError>;
}

/// The control surface side of the bridge as seen by the runtime.
pub trait SurfaceLink: Send {
    fn feedback(&mut self, feedback: SurfaceFeedback) -> Result<(), RemoteError>;
}

/// What applying a batch of effects asked the runtime to do next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Applied {
    pub shutdown: bool,
    pub surface_lost: bool,
}

/// Apply effects in order. Mixer failures are logged and dropped; the first
/// surface failure stops further surface feedback and is reported back.
pub fn apply_side_effects(
    effects: &[SideEffect],
    mixer: &mut dyn MixerLink,
    surface: &mut dyn SurfaceLink,
) -> Applied {
    let mut applied = Applied::default();
    for effect in effects {
        match effect {
            SideEffect::Mixer(write) => {
                if let Err(e) = mixer.send(write) {
                    log::warn!(target: "mixer", "send {} failed: {}", write.address, e);
                }
            }
            SideEffect::Query { address } => {
                if let Err(e) = mixer.query(address) {
                    log::warn!(target: "mixer", "query {} failed: {}", address, e);
                }
            }
            SideEffect::Surface(feedback) => {
                if applied.surface_lost {
                    continue;
                }
                if let Err(e) = surface.feedback(*feedback) {
                    log::error!(target: "surface", "{}", e);
                    applied.surface_lost = true;
                    applied.shutdown = true;
                }
            }
            SideEffect::RunCommand { name, argv } => {
                crate::subprocess::spawn_command(name, argv.clone());
            }
            SideEffect::Shutdown => {
                applied.shutdown = true;
            }
        }
    }
    applied
}
