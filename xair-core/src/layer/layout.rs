//! Layout file loading.
//!
//! The layout is a JSON document declaring named layers (8 encoders, 18 buttons
//! and one fader each) plus optional subprocess toggles. Bindings are short
//! arrays led by a keyword, e.g. `["mute", "/ch/01/mix", 0]`. Any malformed
//! entry fails the whole load; there is no partial layout.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use xair_types::{Bus, LedState, BUTTON_COUNT, ENCODER_COUNT, MAX_SEND};

use super::{ButtonBinding, EncoderBinding, FaderBinding, Layer, PressAction};
use crate::channel::{has_sends, ChannelRegistry};
use crate::error::ConfigError;
use crate::subprocess::{SubprocessSpec, SubprocessTable};

const EMBEDDED_LAYOUT: &str = include_str!("../../layouts/xtouch-mini.json");

/// Level an encoder press returns to when the binding names no press action
/// (0 dB on the fader law).
pub const DEFAULT_RESET_LEVEL: f32 = 0.75;

#[derive(Deserialize)]
struct LayoutFile {
    #[serde(default)]
    subprocesses: BTreeMap<String, SubprocessSpec>,
    layers: Vec<LayerSpec>,
}

#[derive(Deserialize)]
struct LayerSpec {
    name: String,
    encoders: Vec<Option<EncoderSpec>>,
    buttons: Vec<Vec<Value>>,
    fader: Vec<Value>,
}

#[derive(Deserialize)]
struct EncoderSpec {
    channel: String,
    #[serde(default)]
    bus: u64,
    #[serde(default)]
    press: Option<Vec<Value>>,
}

/// Everything the coordinator needs from the layout: the shared channel
/// registry, the layers referring into it and the subprocess toggles.
#[derive(Debug, Clone)]
pub struct Layout {
    pub registry: ChannelRegistry,
    pub layers: Vec<Layer>,
    pub subprocesses: SubprocessTable,
}

impl Layout {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!(target: "config", "loading layout {}", path.display());
        Self::from_json(&text)
    }

    /// The layout compiled into the binary.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_json(EMBEDDED_LAYOUT)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let file: LayoutFile = serde_json::from_str(text)?;
        if file.layers.is_empty() {
            return Err(ConfigError::NoLayers);
        }

        let mut names = HashSet::new();
        for spec in &file.layers {
            if !names.insert(spec.name.as_str()) {
                return Err(ConfigError::DuplicateLayer(spec.name.clone()));
            }
        }

        let mut registry = ChannelRegistry::new();
        let mut layers = Vec::with_capacity(file.layers.len());
        for spec in &file.layers {
            let mut parser = LayerParser {
                layer: &spec.name,
                layer_names: &names,
                subprocesses: &file.subprocesses,
                registry: &mut registry,
            };
            layers.push(parser.parse(spec)?);
        }

        Ok(Self {
            registry,
            layers,
            subprocesses: SubprocessTable::new(file.subprocesses),
        })
    }
}

struct LayerParser<'a> {
    layer: &'a str,
    layer_names: &'a HashSet<&'a str>,
    subprocesses: &'a BTreeMap<String, SubprocessSpec>,
    registry: &'a mut ChannelRegistry,
}

impl LayerParser<'_> {
    fn parse(&mut self, spec: &LayerSpec) -> Result<Layer, ConfigError> {
        self.check_count("encoder", ENCODER_COUNT, spec.encoders.len())?;
        self.check_count("button", BUTTON_COUNT, spec.buttons.len())?;

        let encoders = spec
            .encoders
            .iter()
            .enumerate()
            .map(|(i, e)| match e {
                Some(e) => self.encoder(&format!("encoder {}", i + 1), e).map(Some),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let buttons = spec
            .buttons
            .iter()
            .enumerate()
            .map(|(i, b)| self.button(&format!("button {}", i + 1), b))
            .collect::<Result<Vec<_>, _>>()?;

        let fader = self.fader(&spec.fader)?;

        Ok(Layer::new(self.layer, encoders, buttons, fader))
    }

    fn check_count(&self, control: &'static str, expected: usize, found: usize) -> Result<(), ConfigError> {
        if expected != found {
            return Err(ConfigError::BindingCount {
                layer: self.layer.to_string(),
                control,
                expected,
                found,
            });
        }
        Ok(())
    }

    fn encoder(&mut self, control: &str, spec: &EncoderSpec) -> Result<EncoderBinding, ConfigError> {
        let channel = self.channel(control, &spec.channel)?;
        let bus = self.bus_from(control, spec.bus)?;
        let press = match &spec.press {
            None => PressAction::Reset(DEFAULT_RESET_LEVEL),
            Some(args) => match self.keyword(control, args)? {
                "reset" => {
                    self.arity(control, args, 2)?;
                    PressAction::Reset(self.level(control, &args[1])?)
                }
                "mute" => {
                    self.arity(control, args, 3)?;
                    let address = self.string(control, &args[1])?;
                    PressAction::ToggleMute {
                        channel: self.channel(control, address)?,
                        bus: self.bus(control, &args[2])?,
                    }
                }
                "subprocess" => {
                    self.arity(control, args, 2)?;
                    let name = self.string(control, &args[1])?;
                    if !self.subprocesses.contains_key(name) {
                        return Err(ConfigError::UnknownSubprocess {
                            layer: self.layer.to_string(),
                            name: name.to_string(),
                        });
                    }
                    PressAction::Subprocess(name.to_string())
                }
                other => return Err(self.unknown(control, other)),
            },
        };
        Ok(EncoderBinding {
            channel,
            bus,
            has_sends: has_sends(&spec.channel),
            press,
        })
    }

    fn button(&mut self, control: &str, args: &[Value]) -> Result<ButtonBinding, ConfigError> {
        let binding = match self.keyword(control, args)? {
            "mute" => {
                self.arity(control, args, 3)?;
                let address = self.string(control, &args[1])?;
                ButtonBinding::Mute {
                    channel: self.channel(control, address)?,
                    bus: self.bus(control, &args[2])?,
                }
            }
            "layer" => {
                self.arity(control, args, 3)?;
                let target = self.string(control, &args[1])?;
                if !self.layer_names.contains(target) {
                    return Err(ConfigError::UnknownLayerTarget {
                        layer: self.layer.to_string(),
                        target: target.to_string(),
                    });
                }
                ButtonBinding::LayerSwitch {
                    target: target.to_string(),
                    max_bus: self.bus(control, &args[2])?,
                }
            }
            "send" => {
                self.arity(control, args, 2)?;
                ButtonBinding::SendSelect(self.bus(control, &args[1])?)
            }
            "clip" => {
                self.arity(control, args, 1)?;
                ButtonBinding::ClipToggle
            }
            "tap" => {
                self.arity(control, args, 1)?;
                ButtonBinding::TapTempo
            }
            "quit" => {
                self.arity(control, args, 1)?;
                ButtonBinding::Quit
            }
            "none" => match args.len() {
                1 => ButtonBinding::Fixed(LedState::Off),
                2 => {
                    let state = self.string(control, &args[1])?;
                    let led = LedState::parse(state).ok_or_else(|| self.arity_error(
                        control,
                        format!("LED state must be on, off or blink, got '{}'", state),
                    ))?;
                    ButtonBinding::Fixed(led)
                }
                n => return Err(self.arity_error(control, format!("expected 1 or 2 entries, found {}", n))),
            },
            other => return Err(self.unknown(control, other)),
        };
        Ok(binding)
    }

    fn fader(&mut self, args: &[Value]) -> Result<FaderBinding, ConfigError> {
        let control = "fader";
        match self.keyword(control, args)? {
            "quit" => {
                self.arity(control, args, 1)?;
                Ok(FaderBinding::Quit)
            }
            "level" => {
                self.arity(control, args, 3)?;
                let address = self.string(control, &args[1])?;
                Ok(FaderBinding::Level {
                    channel: self.channel(control, address)?,
                    bus: self.bus(control, &args[2])?,
                })
            }
            other => Err(self.unknown(control, other)),
        }
    }

    fn channel(&mut self, control: &str, address: &str) -> Result<crate::channel::ChannelId, ConfigError> {
        if !address.starts_with('/') || address.len() < 2 || address.ends_with('/') {
            return Err(self.arity_error(control, format!("'{}' is not a channel address", address)));
        }
        Ok(self.registry.get_or_insert(address))
    }

    fn keyword<'v>(&self, control: &str, args: &'v [Value]) -> Result<&'v str, ConfigError> {
        match args.first() {
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(other) => Err(self.arity_error(control, format!("expected an action keyword, found {}", other))),
            None => Err(self.arity_error(control, "empty binding".to_string())),
        }
    }

    fn arity(&self, control: &str, args: &[Value], expected: usize) -> Result<(), ConfigError> {
        if args.len() != expected {
            return Err(self.arity_error(
                control,
                format!("'{}' takes {} argument(s), found {}", args[0], expected - 1, args.len() - 1),
            ));
        }
        Ok(())
    }

    fn string<'v>(&self, control: &str, value: &'v Value) -> Result<&'v str, ConfigError> {
        value
            .as_str()
            .ok_or_else(|| self.arity_error(control, format!("expected a string, found {}", value)))
    }

    fn bus(&self, control: &str, value: &Value) -> Result<Bus, ConfigError> {
        let raw = value
            .as_u64()
            .ok_or_else(|| self.arity_error(control, format!("expected a bus number, found {}", value)))?;
        self.bus_from(control, raw)
    }

    fn bus_from(&self, control: &str, raw: u64) -> Result<Bus, ConfigError> {
        if raw > MAX_SEND as u64 {
            return Err(ConfigError::BusOutOfRange {
                layer: self.layer.to_string(),
                control: control.to_string(),
                bus: raw,
            });
        }
        Ok(raw as Bus)
    }

    fn level(&self, control: &str, value: &Value) -> Result<f32, ConfigError> {
        match value.as_f64() {
            Some(v) if (0.0..=1.0).contains(&v) => Ok(v as f32),
            _ => Err(self.arity_error(control, format!("expected a level in 0.0..=1.0, found {}", value))),
        }
    }

    fn unknown(&self, control: &str, keyword: &str) -> ConfigError {
        ConfigError::UnknownKeyword {
            layer: self.layer.to_string(),
            control: control.to_string(),
            keyword: keyword.to_string(),
        }
    }

    fn arity_error(&self, control: &str, detail: String) -> ConfigError {
        ConfigError::Arity {
            layer: self.layer.to_string(),
            control: control.to_string(),
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layer_json(name: &str, buttons: Vec<Value>, fader: Value) -> Value {
        let mut encoders: Vec<Value> = (1..=8)
            .map(|i| json!({ "channel": format!("/ch/{:02}/mix", i), "bus": 0 }))
            .collect();
        encoders[7] = Value::Null;
        json!({ "name": name, "encoders": encoders, "buttons": buttons, "fader": fader })
    }

    fn plain_buttons() -> Vec<Value> {
        (0..18).map(|_| json!(["none"])).collect()
    }

    #[test]
    fn embedded_layout_parses() {
        let layout = Layout::embedded().unwrap();
        assert!(!layout.layers.is_empty());
        assert!(layout.registry.len() > 8);
    }

    #[test]
    fn layers_share_channels() {
        let doc = json!({
            "layers": [
                layer_json("main", plain_buttons(), json!(["quit"])),
                layer_json("other", plain_buttons(), json!(["level", "/ch/01/mix", 0])),
            ]
        });
        let layout = Layout::from_json(&doc.to_string()).unwrap();
        assert_eq!(layout.layers.len(), 2);
        // ch 1..7 plus nothing new from the fader
        assert_eq!(layout.registry.len(), 7);
        let a = layout.layers[0].encoder(0).unwrap().channel;
        let b = match layout.layers[1].fader() {
            FaderBinding::Level { channel, .. } => *channel,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(a, b);
        assert!(layout.layers[0].encoder(7).is_none());
        assert_eq!(
            layout.layers[0].encoder(0).unwrap().press,
            PressAction::Reset(DEFAULT_RESET_LEVEL)
        );
    }

    #[test]
    fn all_button_keywords() {
        let mut buttons = plain_buttons();
        buttons[0] = json!(["mute", "/config/mute/1", 0]);
        buttons[1] = json!(["layer", "main", 6]);
        buttons[2] = json!(["send", 3]);
        buttons[3] = json!(["clip"]);
        buttons[4] = json!(["tap"]);
        buttons[5] = json!(["quit"]);
        buttons[6] = json!(["none", "blink"]);
        let doc = json!({ "layers": [layer_json("main", buttons, json!(["quit"]))] });
        let layout = Layout::from_json(&doc.to_string()).unwrap();
        let layer = &layout.layers[0];
        assert!(matches!(layer.button(0), Some(ButtonBinding::Mute { bus: 0, .. })));
        assert_eq!(
            layer.button(1),
            Some(&ButtonBinding::LayerSwitch {
                target: "main".into(),
                max_bus: 6
            })
        );
        assert_eq!(layer.button(2), Some(&ButtonBinding::SendSelect(3)));
        assert_eq!(layer.button(3), Some(&ButtonBinding::ClipToggle));
        assert_eq!(layer.button(4), Some(&ButtonBinding::TapTempo));
        assert_eq!(layer.button(5), Some(&ButtonBinding::Quit));
        assert_eq!(layer.button(6), Some(&ButtonBinding::Fixed(LedState::Blink)));
    }

    #[test]
    fn rejects_unknown_layer_target() {
        let mut buttons = plain_buttons();
        buttons[0] = json!(["layer", "nowhere", 0]);
        let doc = json!({ "layers": [layer_json("main", buttons, json!(["quit"]))] });
        let err = Layout::from_json(&doc.to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownLayerTarget { ref target, .. } if target == "nowhere"));
    }

    #[test]
    fn rejects_wrong_arity_and_keywords() {
        let mut buttons = plain_buttons();
        buttons[0] = json!(["mute", "/ch/01/mix"]);
        let doc = json!({ "layers": [layer_json("main", buttons, json!(["quit"]))] });
        assert!(matches!(
            Layout::from_json(&doc.to_string()),
            Err(ConfigError::Arity { .. })
        ));

        let mut buttons = plain_buttons();
        buttons[0] = json!(["explode"]);
        let doc = json!({ "layers": [layer_json("main", buttons, json!(["quit"]))] });
        assert!(matches!(
            Layout::from_json(&doc.to_string()),
            Err(ConfigError::UnknownKeyword { .. })
        ));

        let doc = json!({ "layers": [layer_json("main", plain_buttons(), json!(["level", "/lr/mix"]))] });
        assert!(matches!(
            Layout::from_json(&doc.to_string()),
            Err(ConfigError::Arity { .. })
        ));
    }

    #[test]
    fn rejects_wrong_counts_and_empty_layouts() {
        let mut buttons = plain_buttons();
        buttons.pop();
        let doc = json!({ "layers": [layer_json("main", buttons, json!(["quit"]))] });
        assert!(matches!(
            Layout::from_json(&doc.to_string()),
            Err(ConfigError::BindingCount { expected: 18, found: 17, .. })
        ));

        assert!(matches!(
            Layout::from_json(r#"{ "layers": [] }"#),
            Err(ConfigError::NoLayers)
        ));
        assert!(matches!(Layout::from_json("{ not json"), Err(ConfigError::Json(_))));
    }

    #[test]
    fn rejects_duplicates_buses_and_subprocesses() {
        let doc = json!({
            "layers": [
                layer_json("main", plain_buttons(), json!(["quit"])),
                layer_json("main", plain_buttons(), json!(["quit"])),
            ]
        });
        assert!(matches!(
            Layout::from_json(&doc.to_string()),
            Err(ConfigError::DuplicateLayer(_))
        ));

        let mut buttons = plain_buttons();
        buttons[0] = json!(["send", 11]);
        let doc = json!({ "layers": [layer_json("main", buttons, json!(["quit"]))] });
        assert!(matches!(
            Layout::from_json(&doc.to_string()),
            Err(ConfigError::BusOutOfRange { bus: 11, .. })
        ));

        let mut layer = layer_json("main", plain_buttons(), json!(["quit"]));
        layer["encoders"][0]["press"] = json!(["subprocess", "player"]);
        let doc = json!({ "layers": [layer] });
        assert!(matches!(
            Layout::from_json(&doc.to_string()),
            Err(ConfigError::UnknownSubprocess { .. })
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        let doc = json!({
            "subprocesses": { "player": { "on": ["mpc", "play"], "off": ["mpc", "pause"] } },
            "layers": [layer_json("main", plain_buttons(), json!(["quit"]))]
        });
        std::fs::write(&path, doc.to_string()).unwrap();
        let layout = Layout::load(&path).unwrap();
        assert_eq!(layout.layers[0].name(), "main");
        assert!(layout.subprocesses.contains("player"));

        let missing = dir.path().join("missing.json");
        assert!(matches!(Layout::load(&missing), Err(ConfigError::Io { .. })));
    }
}
