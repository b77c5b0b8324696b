//! Named two-state command toggles bound to encoder presses.
//!
//! The coordinator only decides which command line to run; spawning happens in
//! the runtime after dispatch.

use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubprocessSpec {
    pub on: Vec<String>,
    pub off: Vec<String>,
    /// Whatever the command controls is assumed to be running at startup
    #[serde(default = "default_running")]
    pub running: bool,
}

fn default_running() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubprocessBinding {
    on: Vec<String>,
    off: Vec<String>,
    running: bool,
}

impl SubprocessBinding {
    pub fn new(spec: SubprocessSpec) -> Self {
        Self {
            on: spec.on,
            off: spec.off,
            running: spec.running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Flip the state and return the command line that performs the flip.
    pub fn toggle(&mut self) -> Vec<String> {
        let argv = if self.running {
            self.off.clone()
        } else {
            self.on.clone()
        };
        self.running = !self.running;
        argv
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubprocessTable {
    bindings: BTreeMap<String, SubprocessBinding>,
}

impl SubprocessTable {
    pub fn new(specs: BTreeMap<String, SubprocessSpec>) -> Self {
        let bindings = specs
            .into_iter()
            .map(|(name, spec)| (name, SubprocessBinding::new(spec)))
            .collect();
        Self { bindings }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&SubprocessBinding> {
        self.bindings.get(name)
    }

    /// Toggle `name`, returning the command to run. `None` for unknown names or
    /// bindings with an empty command.
    pub fn toggle(&mut self, name: &str) -> Option<Vec<String>> {
        let argv = self.bindings.get_mut(name)?.toggle();
        if argv.is_empty() {
            None
        } else {
            Some(argv)
        }
    }
}

/// Run a command to completion on a detached thread. Failures are logged.
pub fn spawn_command(name: &str, argv: Vec<String>) {
    let name = name.to_string();
    let spawned = std::thread::Builder::new()
        .name(format!("subprocess-{}", name))
        .spawn(move || {
            let Some((program, args)) = argv.split_first() else {
                return;
            };
            match std::process::Command::new(program).args(args).status() {
                Ok(status) if status.success() => {
                    log::debug!(target: "runtime", "subprocess '{}' finished", name);
                }
                Ok(status) => {
                    log::warn!(target: "runtime", "subprocess '{}' exited with {}", name, status);
                }
                Err(e) => {
                    log::warn!(target: "runtime", "cannot run '{}' for '{}': {}", program, name, e);
                }
            }
        });
    if let Err(e) = spawned {
        log::warn!(target: "runtime", "cannot start subprocess thread: {}", e);
    }
}
