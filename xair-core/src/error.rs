//! Error types for layout loading, transports and startup.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// A malformed or incomplete layout/config file. Always fatal at startup.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Json(serde_json::Error),
    NoLayers,
    DuplicateLayer(String),
    /// A layer declares the wrong number of encoders/buttons
    BindingCount {
        layer: String,
        control: &'static str,
        expected: usize,
        found: usize,
    },
    /// A binding has the wrong number of arguments or an argument of the wrong type
    Arity {
        layer: String,
        control: String,
        detail: String,
    },
    UnknownKeyword {
        layer: String,
        control: String,
        keyword: String,
    },
    UnknownLayerTarget { layer: String, target: String },
    UnknownSubprocess { layer: String, name: String },
    BusOutOfRange { layer: String, control: String, bus: u64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "cannot read {}: {}", path.display(), source),
            Self::Json(e) => write!(f, "layout is not valid JSON: {}", e),
            Self::NoLayers => write!(f, "layout declares no layers"),
            Self::DuplicateLayer(name) => write!(f, "layer '{}' is declared twice", name),
            Self::BindingCount {
                layer,
                control,
                expected,
                found,
            } => write!(
                f,
                "layer '{}': expected {} {} bindings, found {}",
                layer, expected, control, found
            ),
            Self::Arity {
                layer,
                control,
                detail,
            } => write!(f, "layer '{}', {}: {}", layer, control, detail),
            Self::UnknownKeyword {
                layer,
                control,
                keyword,
            } => write!(f, "layer '{}', {}: unknown action '{}'", layer, control, keyword),
            Self::UnknownLayerTarget { layer, target } => write!(
                f,
                "layer '{}': switch target '{}' is not a declared layer",
                layer, target
            ),
            Self::UnknownSubprocess { layer, name } => write!(
                f,
                "layer '{}': subprocess '{}' is not declared",
                layer, name
            ),
            Self::BusOutOfRange { layer, control, bus } => write!(
                f,
                "layer '{}', {}: bus {} is out of range 0..=10",
                layer, control, bus
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// Which side of the bridge a transport error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Surface,
    Mixer,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Surface => write!(f, "control surface"),
            Transport::Mixer => write!(f, "mixer"),
        }
    }
}

/// Top-level error for the bridge.
#[derive(Debug)]
pub enum RemoteError {
    Config(ConfigError),
    TransportUnavailable { transport: Transport, reason: String },
    HandshakeTimeout { address: String, waited: Duration },
    Io(std::io::Error),
}

impl RemoteError {
    pub fn surface(reason: impl Into<String>) -> Self {
        Self::TransportUnavailable {
            transport: Transport::Surface,
            reason: reason.into(),
        }
    }

    pub fn mixer(reason: impl Into<String>) -> Self {
        Self::TransportUnavailable {
            transport: Transport::Mixer,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {}", e),
            Self::TransportUnavailable { transport, reason } => {
                write!(f, "{} unavailable: {}", transport, reason)
            }
            Self::HandshakeTimeout { address, waited } => write!(
                f,
                "no answer from mixer at {} after {} ms, check the address",
                address,
                waited.as_millis()
            ),
            Self::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for RemoteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for RemoteError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<std::io::Error> for RemoteError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
