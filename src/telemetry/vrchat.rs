//! VRChat avatar parameters over OSC
//!
//! VRChat sends every avatar parameter change as an OSC message to
//! `receiving_port` and accepts parameter writes on `sending_port`.
//! Contact receivers in "proximity" mode report 0 when far and 1 at contact.
//!
//! Without a `receiving_port` the source picks a free port and announces it
//! through OSCQuery, see [`super::oscquery`].

use super::oscquery::{wait_for_vrchat, QueryService};
use super::{Callback, Dispatcher, TelemetrySource};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use mdns_sd::ServiceDaemon;
use rosc::{decoder, encoder, OscMessage, OscPacket, OscType};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{lookup_host, UdpSocket};
use tokio::task::JoinHandle;

/// Largest OSC datagram accepted
const RECV_BUFFER_SIZE: usize = 1536;

/// VRChat OSC endpoint parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VrChatParams {
    /// Host running VRChat
    #[serde(default = "default_hostname")]
    pub hostname: String,
    /// Port VRChat listens on for parameter writes
    #[serde(default = "default_sending_port")]
    pub sending_port: u16,
    /// Port this bridge listens on for parameter changes; OSCQuery when unset
    #[serde(default)]
    pub receiving_port: Option<u16>,
    /// Service name announced over OSCQuery
    #[serde(default = "default_osc_server_name")]
    pub osc_server_name: String,
}

fn default_hostname() -> String {
    "127.0.0.1".to_string()
}
fn default_sending_port() -> u16 {
    9000
}
fn default_osc_server_name() -> String {
    "DakyHaptics".to_string()
}

/// VRChat telemetry source
pub struct VrChat {
    params: VrChatParams,
    dispatcher: Arc<RwLock<Dispatcher>>,
    socket: Option<Arc<UdpSocket>>,
    target: Option<SocketAddr>,
    receiver: Option<JoinHandle<()>>,
    query: Option<QueryService>,
}

impl VrChat {
    pub fn new(params: VrChatParams) -> Self {
        Self {
            params,
            dispatcher: Arc::new(RwLock::new(Dispatcher::new())),
            socket: None,
            target: None,
            receiver: None,
            query: None,
        }
    }

    /// Whether the receive port is discovered through OSCQuery
    pub fn uses_osc_query(&self) -> bool {
        self.params.receiving_port.is_none()
    }

    /// Wait for VRChat on mDNS, then advertise `osc_addr` to it
    async fn advertise(&mut self, osc_addr: SocketAddr) -> Result<()> {
        let mdns = ServiceDaemon::new()?;
        if let Err(e) = wait_for_vrchat(&mdns).await {
            if let Err(e) = mdns.shutdown() {
                log::debug!("mDNS shutdown: {}", e);
            }
            return Err(e);
        }
        let service = QueryService::start(
            mdns,
            &self.params.osc_server_name,
            osc_addr,
            Arc::clone(&self.dispatcher),
        )
        .await?;
        if let Some(old) = self.query.replace(service) {
            old.stop();
        }
        Ok(())
    }

    /// Bound receive address, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    async fn resolve(&self, port: u16) -> Result<SocketAddr> {
        let host = self.params.hostname.as_str();
        lookup_host((host, port))
            .await
            .map_err(|e| Error::HostResolution(format!("{}: {}", host, e)))?
            .next()
            .ok_or_else(|| Error::HostResolution(host.to_string()))
    }
}

/// Finite numeric value of an OSC argument
fn osc_value(arg: &OscType) -> Option<f32> {
    let value = match arg {
        OscType::Float(v) => *v,
        OscType::Double(v) => *v as f32,
        OscType::Int(v) => *v as f32,
        OscType::Long(v) => *v as f32,
        OscType::Bool(v) => {
            if *v {
                1.0
            } else {
                0.0
            }
        }
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// Dispatch every message in `packet`, descending into bundles
fn dispatch_packet(dispatcher: &Dispatcher, packet: &OscPacket) {
    match packet {
        OscPacket::Message(msg) => match msg.args.first().and_then(osc_value) {
            Some(value) => {
                dispatcher.dispatch(&msg.addr, value);
            }
            None => log::trace!("OSC {} has no numeric argument", msg.addr),
        },
        OscPacket::Bundle(bundle) => {
            for content in &bundle.content {
                dispatch_packet(dispatcher, content);
            }
        }
    }
}

#[async_trait]
impl TelemetrySource for VrChat {
    async fn start(&mut self) -> Result<()> {
        let bind = self.resolve(self.params.receiving_port.unwrap_or(0)).await?;
        let target = self.resolve(self.params.sending_port).await?;
        let socket = Arc::new(UdpSocket::bind(bind).await?);
        log::info!(
            "VRChat OSC: listening on {}, sending to {}",
            socket.local_addr()?,
            target
        );

        let reader = Arc::clone(&socket);
        let dispatcher = Arc::clone(&self.dispatcher);
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUFFER_SIZE];
            loop {
                let n = match reader.recv_from(&mut buf).await {
                    Ok((n, _)) => n,
                    Err(e) => {
                        log::warn!("VRChat OSC receive error: {}", e);
                        continue;
                    }
                };
                match decoder::decode_udp(&buf[..n]) {
                    Ok((_, packet)) => dispatch_packet(&dispatcher.read(), &packet),
                    Err(e) => log::debug!("VRChat OSC: undecodable packet: {:?}", e),
                }
            }
        });

        if let Some(old) = self.receiver.replace(task) {
            old.abort();
        }
        let local = socket.local_addr()?;
        self.socket = Some(socket);
        self.target = Some(target);

        if self.uses_osc_query() {
            log::info!("VRChat OSC: using OSCQuery for port {}", local.port());
            self.advertise(local).await?;
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(query) = self.query.take() {
            query.stop();
        }
        self.disconnect().await
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(task) = self.receiver.take() {
            task.abort();
        }
        if self.socket.take().is_some() {
            log::info!("VRChat OSC: stopped");
        }
        self.target = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Under OSCQuery, registered paths are advertised as they are added
    fn listen(&mut self, path: &str, callback: Callback, wildcard: bool) {
        log::debug!("VRChat OSC: listening to {}{}", path, if wildcard { "*" } else { "" });
        self.dispatcher.write().map(path, callback, wildcard);
    }

    fn listen_distance(&mut self, path: &str, callback: Callback, wildcard: bool) {
        let to_distance: Callback =
            Arc::new(move |path: &str, proximity: f32| callback(path, 1.0 - proximity));
        self.listen(path, to_distance, wildcard);
    }

    async fn send(&self, path: &str, value: f32) -> Result<()> {
        let (socket, target) = match (&self.socket, self.target) {
            (Some(socket), Some(target)) => (socket, target),
            _ => return Err(Error::NotConnected),
        };
        let packet = OscPacket::Message(OscMessage {
            addr: path.to_string(),
            args: vec![OscType::Float(value)],
        });
        let bytes = encoder::encode(&packet)?;
        socket.send_to(&bytes, target).await?;
        Ok(())
    }
}
