//! OSC over UDP to the mixer.
//!
//! One socket bound to an ephemeral port is used for everything. A receive
//! thread decodes inbound packets into [`NetworkEvent`]s; a keep-alive thread
//! renews the update and meter subscriptions.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rosc::{OscMessage, OscPacket, OscType};
use xair_types::{ParamValue, ParameterWrite};

use crate::dispatch::MixerLink;
use crate::error::RemoteError;
use crate::meter::decode_meter_blob;
use crate::runtime::ShutdownFlag;

/// Receive timeout; bounds how long the receive thread takes to notice shutdown.
const RECV_TIMEOUT: Duration = Duration::from_millis(50);

const HANDSHAKE_POLL: Duration = Duration::from_millis(10);

/// Meter set carrying the 16 input levels.
const INPUT_METERS: &str = "/meters/2";

/// Something the mixer told us.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    Parameter { address: String, value: ParamValue },
    /// One input meter frame, 1/256 dB per sample
    Meters(Vec<i16>),
}

/// The `/xinfo` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixerInfo {
    pub ip: String,
    pub name: String,
    pub model: String,
    pub firmware: String,
}

enum Inbound {
    Event(NetworkEvent),
    Info(MixerInfo),
}

/// Recursively decode a packet (bundles wrap messages).
fn collect_inbound(packet: &OscPacket, out: &mut Vec<Inbound>) {
    match packet {
        OscPacket::Message(msg) => {
            if let Some(inbound) = decode_message(msg) {
                out.push(inbound);
            }
        }
        OscPacket::Bundle(bundle) => {
            for p in &bundle.content {
                collect_inbound(p, out);
            }
        }
    }
}

fn decode_message(msg: &OscMessage) -> Option<Inbound> {
    if msg.addr == "/xinfo" {
        let text: Vec<String> = msg
            .args
            .iter()
            .filter_map(|a| match a {
                OscType::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        let [ip, name, model, firmware] = <[String; 4]>::try_from(text.get(..4)?.to_vec()).ok()?;
        return Some(Inbound::Info(MixerInfo {
            ip,
            name,
            model,
            firmware,
        }));
    }
    if msg.addr.starts_with("/meters") {
        return match msg.args.first() {
            Some(OscType::Blob(blob)) => decode_meter_blob(blob).map(|s| Inbound::Event(NetworkEvent::Meters(s))),
            _ => None,
        };
    }
    if msg.addr.starts_with("/-") {
        return None;
    }
    let value = match msg.args.first()? {
        OscType::Float(v) => ParamValue::Float(*v),
        OscType::Int(v) => ParamValue::Int(*v),
        other => {
            log::debug!(target: "mixer", "ignoring {} {:?}", msg.addr, other);
            return None;
        }
    };
    Some(Inbound::Event(NetworkEvent::Parameter {
        address: msg.addr.clone(),
        value,
    }))
}

fn encode_message(addr: &str, args: Vec<OscType>) -> std::io::Result<Vec<u8>> {
    let msg = OscPacket::Message(OscMessage {
        addr: addr.to_string(),
        args,
    });
    rosc::encoder::encode(&msg)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
}

fn to_osc(value: ParamValue) -> OscType {
    match value {
        ParamValue::Float(v) => OscType::Float(v),
        ParamValue::Int(v) => OscType::Int(v),
    }
}

pub struct OscClient {
    socket: UdpSocket,
    mixer_addr: SocketAddr,
    info: Arc<RwLock<Option<MixerInfo>>>,
    _recv_thread: Option<JoinHandle<()>>,
}

impl OscClient {
    /// Open a socket towards `address:port` and start the receive thread.
    /// `on_event` returning false stops the thread.
    pub fn connect<F>(
        address: &str,
        port: u16,
        shutdown: ShutdownFlag,
        mut on_event: F,
    ) -> Result<Self, RemoteError>
    where
        F: FnMut(NetworkEvent) -> bool + Send + 'static,
    {
        let mixer_addr = (address, port)
            .to_socket_addrs()
            .map_err(|e| RemoteError::mixer(format!("cannot resolve {}: {}", address, e)))?
            .next()
            .ok_or_else(|| RemoteError::mixer(format!("{} has no address", address)))?;

        let socket = UdpSocket::bind("0.0.0.0:0")?;
        let recv_socket = socket.try_clone()?;
        recv_socket.set_read_timeout(Some(RECV_TIMEOUT))?;
        let info = Arc::new(RwLock::new(None));
        let info_slot = Arc::clone(&info);

        let handle = thread::Builder::new()
            .name("osc-recv".into())
            .spawn(move || {
                let mut buf = [0u8; 4096];
                let mut inbound = Vec::new();
                while !shutdown.is_set() {
                    let n = match recv_socket.recv(&mut buf) {
                        Ok(n) => n,
                        Err(ref e)
                            if e.kind() == std::io::ErrorKind::WouldBlock
                                || e.kind() == std::io::ErrorKind::TimedOut =>
                        {
                            continue
                        }
                        Err(e) => {
                            log::error!(target: "mixer", "receive failed: {}", e);
                            break;
                        }
                    };
                    match rosc::decoder::decode_udp(&buf[..n]) {
                        Ok((_, packet)) => collect_inbound(&packet, &mut inbound),
                        Err(e) => log::debug!(target: "mixer", "undecodable packet: {}", e),
                    }
                    for item in inbound.drain(..) {
                        match item {
                            Inbound::Info(found) => {
                                if let Ok(mut slot) = info_slot.write() {
                                    *slot = Some(found);
                                }
                            }
                            Inbound::Event(event) => {
                                if !on_event(event) {
                                    return;
                                }
                            }
                        }
                    }
                }
                log::debug!(target: "mixer", "receive thread stopped");
            })?;

        Ok(Self {
            socket,
            mixer_addr,
            info,
            _recv_thread: Some(handle),
        })
    }

    pub fn mixer_addr(&self) -> SocketAddr {
        self.mixer_addr
    }

    /// Send `/xinfo` and wait up to `timeout` for the answer.
    pub fn handshake(&self, timeout: Duration) -> Result<MixerInfo, RemoteError> {
        self.send_message("/xinfo", Vec::new())?;
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(info) = self.info.read().ok().and_then(|slot| slot.clone()) {
                log::info!(
                    target: "mixer",
                    "connected to {} ({}) firmware {} at {}",
                    info.name,
                    info.model,
                    info.firmware,
                    info.ip
                );
                return Ok(info);
            }
            if Instant::now() >= deadline {
                return Err(RemoteError::HandshakeTimeout {
                    address: self.mixer_addr.to_string(),
                    waited: timeout,
                });
            }
            thread::sleep(HANDSHAKE_POLL);
        }
    }

    pub fn send_message(&self, addr: &str, args: Vec<OscType>) -> std::io::Result<()> {
        let buf = encode_message(addr, args)?;
        self.socket.send_to(&buf, self.mixer_addr)?;
        Ok(())
    }

    /// Renew `/xremotenfb` (and the input meters when `meters` is set) every
    /// `interval` until shutdown.
    pub fn spawn_keepalive(
        &self,
        interval: Duration,
        meters: bool,
        shutdown: ShutdownFlag,
    ) -> std::io::Result<JoinHandle<()>> {
        let socket = self.socket.try_clone()?;
        let target = self.mixer_addr;
        let renew = encode_message("/xremotenfb", Vec::new())?;
        let meter_request = encode_message("/meters", vec![OscType::String(INPUT_METERS.into())])?;
        thread::Builder::new()
            .name("osc-keepalive".into())
            .spawn(move || {
                while !shutdown.is_set() {
                    if let Err(e) = socket.send_to(&renew, target) {
                        log::warn!(target: "mixer", "keep-alive failed: {}", e);
                    }
                    if meters {
                        if let Err(e) = socket.send_to(&meter_request, target) {
                            log::warn!(target: "mixer", "meter renewal failed: {}", e);
                        }
                    }
                    shutdown.sleep(interval);
                }
                log::debug!(target: "mixer", "keep-alive stopped");
            })
    }
}

impl MixerLink for OscClient {
    fn send(&mut self, write: &ParameterWrite) -> Result<(), RemoteError> {
        log::debug!(target: "mixer", "{} -> {}", write.address, write.value);
        self.send_message(&write.address, vec![to_osc(write.value)])
            .map_err(RemoteError::from)
    }

    fn query(&mut self, address: &str) -> Result<(), RemoteError> {
        self.send_message(address, Vec::new()).map_err(RemoteError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::OscBundle;

    fn message(addr: &str, args: Vec<OscType>) -> OscPacket {
        OscPacket::Message(OscMessage {
            addr: addr.into(),
            args,
        })
    }

    fn events(packet: &OscPacket) -> Vec<NetworkEvent> {
        let mut out = Vec::new();
        collect_inbound(packet, &mut out);
        out.into_iter()
            .filter_map(|i| match i {
                Inbound::Event(e) => Some(e),
                Inbound::Info(_) => None,
            })
            .collect()
    }

    #[test]
    fn decodes_parameters_in_bundles() {
        let packet = OscPacket::Bundle(OscBundle {
            timetag: (0, 1).into(),
            content: vec![
                message("/ch/01/mix/fader", vec![OscType::Float(0.5)]),
                message("/ch/01/mix/on", vec![OscType::Int(0)]),
                message("/-stat/solo", vec![OscType::Int(1)]),
                message("/ch/01/config/name", vec![OscType::String("Kick".into())]),
            ],
        });
        assert_eq!(
            events(&packet),
            vec![
                NetworkEvent::Parameter {
                    address: "/ch/01/mix/fader".into(),
                    value: ParamValue::Float(0.5)
                },
                NetworkEvent::Parameter {
                    address: "/ch/01/mix/on".into(),
                    value: ParamValue::Int(0)
                },
            ]
        );
    }

    #[test]
    fn decodes_meter_blobs() {
        let mut blob = 2u32.to_le_bytes().to_vec();
        blob.extend_from_slice(&(-512i16).to_le_bytes());
        blob.extend_from_slice(&(-256i16).to_le_bytes());
        let packet = message("/meters/2", vec![OscType::Blob(blob)]);
        assert_eq!(events(&packet), vec![NetworkEvent::Meters(vec![-512, -256])]);
    }

    #[test]
    fn decodes_xinfo() {
        let packet = message(
            "/xinfo",
            ["192.168.1.2", "XR18-1", "XR18", "1.17"]
                .iter()
                .map(|s| OscType::String(s.to_string()))
                .collect(),
        );
        let mut out = Vec::new();
        collect_inbound(&packet, &mut out);
        match out.as_slice() {
            [Inbound::Info(info)] => {
                assert_eq!(info.model, "XR18");
                assert_eq!(info.firmware, "1.17");
            }
            _ => panic!("expected mixer info"),
        }
    }

    #[test]
    fn handshake_against_local_mixer() {
        let mixer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = mixer.local_addr().unwrap().port();
        let shutdown = ShutdownFlag::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let client = OscClient::connect("127.0.0.1", port, shutdown.clone(), move |e| {
            tx.send(e).is_ok()
        })
        .unwrap();

        let responder = thread::spawn(move || {
            let mut buf = [0u8; 1024];
            let (n, from) = mixer.recv_from(&mut buf).unwrap();
            let (_, packet) = rosc::decoder::decode_udp(&buf[..n]).unwrap();
            assert!(matches!(packet, OscPacket::Message(ref m) if m.addr == "/xinfo"));
            let args = ["127.0.0.1", "test", "XR12", "1.0"]
                .iter()
                .map(|s| OscType::String(s.to_string()))
                .collect();
            mixer.send_to(&encode_message("/xinfo", args).unwrap(), from).unwrap();
            let update = encode_message("/lr/mix/fader", vec![OscType::Float(0.25)]).unwrap();
            mixer.send_to(&update, from).unwrap();
        });

        let info = client.handshake(Duration::from_secs(2)).unwrap();
        assert_eq!(info.model, "XR12");
        responder.join().unwrap();
        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(
            event,
            NetworkEvent::Parameter {
                address: "/lr/mix/fader".into(),
                value: ParamValue::Float(0.25)
            }
        );
        shutdown.set();
    }

    #[test]
    fn handshake_times_out_without_mixer() {
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = silent.local_addr().unwrap().port();
        let shutdown = ShutdownFlag::new();
        let client = OscClient::connect("127.0.0.1", port, shutdown.clone(), |_| true).unwrap();
        let err = client.handshake(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, RemoteError::HandshakeTimeout { .. }));
        shutdown.set();
    }
}
