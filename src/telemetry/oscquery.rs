//! OSCQuery: find VRChat on the LAN and advertise what we listen to
//!
//! When no receiving port is configured the bridge binds a free UDP port,
//! waits for a `VRChat-Client-XXXXXX` service on mDNS, then publishes its
//! own OSCQuery HTTP endpoint so VRChat starts sending parameters to it.
//!
//! ```text
//!  GET /?HOST_INFO              -> {"NAME", "OSC_IP", "OSC_PORT", ...}
//!  GET /avatar/parameters       -> node with CONTENTS
//! ```

use super::Dispatcher;
use crate::error::{Error, Result};
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// mDNS service type of OSCQuery HTTP endpoints
pub const OSCJSON_SERVICE: &str = "_oscjson._tcp.local.";
/// mDNS service type of plain OSC receivers
pub const OSC_SERVICE: &str = "_osc._udp.local.";

const VRCHAT_CLIENT_PREFIX: &str = "VRChat-Client-";

/// Endpoint accepts values from the peer
const ACCESS_WRITE: u8 = 2;

/// True for `VRChat-Client-` followed by six hex digits, e.g.
/// `VRChat-Client-1A2B3C._oscjson._tcp.local.`
pub fn is_vrchat_client(fullname: &str) -> bool {
    let Some(rest) = fullname.strip_prefix(VRCHAT_CLIENT_PREFIX) else {
        return false;
    };
    let id = rest.split('.').next().unwrap_or_default();
    id.len() == 6 && id.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
}

/// Reply to `GET /?HOST_INFO`
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct HostInfo {
    pub name: String,
    pub osc_ip: String,
    pub osc_port: u16,
    pub osc_transport: &'static str,
    pub extensions: BTreeMap<&'static str, bool>,
}

impl HostInfo {
    pub fn new(name: &str, osc_addr: SocketAddr) -> Self {
        Self {
            name: name.to_string(),
            osc_ip: osc_addr.ip().to_string(),
            osc_port: osc_addr.port(),
            osc_transport: "UDP",
            extensions: BTreeMap::from([("ACCESS", true), ("VALUE", false)]),
        }
    }
}

/// One node of the OSC address space
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Node {
    #[serde(rename = "FULL_PATH")]
    pub full_path: String,
    #[serde(rename = "ACCESS")]
    pub access: u8,
    #[serde(rename = "TYPE", skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(rename = "CONTENTS", skip_serializing_if = "BTreeMap::is_empty")]
    pub contents: BTreeMap<String, Node>,
}

impl Node {
    /// Address space holding one float endpoint per pattern
    pub fn tree<S: AsRef<str>>(patterns: &[S]) -> Self {
        let mut root = Node {
            full_path: "/".to_string(),
            ..Default::default()
        };
        for pattern in patterns {
            root.insert(pattern.as_ref());
        }
        root
    }

    fn insert(&mut self, pattern: &str) {
        let mut node = self;
        for segment in pattern.split('/').filter(|s| !s.is_empty()) {
            let full_path = format!("{}/{}", node.full_path.trim_end_matches('/'), segment);
            node = node
                .contents
                .entry(segment.to_string())
                .or_insert_with(|| Node {
                    full_path,
                    ..Default::default()
                });
        }
        node.access = ACCESS_WRITE;
        node.kind = Some("f");
    }

    /// Node at `path`, if the address space has one
    pub fn find(&self, path: &str) -> Option<&Node> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |node, segment| node.contents.get(segment))
    }
}

struct QueryState {
    host_info: HostInfo,
    dispatcher: Arc<RwLock<Dispatcher>>,
}

async fn handle(State(state): State<Arc<QueryState>>, uri: Uri) -> Response {
    if uri.query() == Some("HOST_INFO") {
        return Json(state.host_info.clone()).into_response();
    }
    let patterns = state.dispatcher.read().patterns();
    let tree = Node::tree(&patterns[..]);
    match tree.find(uri.path()) {
        Some(node) => Json(node).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Serve the OSCQuery HTTP endpoint on a free port next to `osc_addr`
///
/// The address space is rebuilt from the dispatcher on every request, so
/// paths registered later are advertised too.
pub async fn serve_http(
    name: &str,
    osc_addr: SocketAddr,
    dispatcher: Arc<RwLock<Dispatcher>>,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind((osc_addr.ip(), 0)).await?;
    let http_addr = listener.local_addr()?;
    let state = Arc::new(QueryState {
        host_info: HostInfo::new(name, osc_addr),
        dispatcher,
    });
    let app = Router::new().fallback(handle).with_state(state);
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            log::error!("OSCQuery HTTP server failed: {}", e);
        }
    });
    Ok((http_addr, task))
}

/// Browse mDNS until a VRChat client shows up; returns its service name
pub async fn wait_for_vrchat(mdns: &ServiceDaemon) -> Result<String> {
    let events = mdns.browse(OSCJSON_SERVICE)?;
    log::info!("OSCQuery: waiting for VRChat on {}", OSCJSON_SERVICE);
    let found = loop {
        match events.recv_async().await {
            Ok(ServiceEvent::ServiceResolved(info)) if is_vrchat_client(info.get_fullname()) => {
                break info.get_fullname().to_string();
            }
            Ok(event) => log::trace!("mDNS: {:?}", event),
            Err(_) => return Err(Error::Discovery("mDNS browse ended".to_string())),
        }
    };
    if let Err(e) = mdns.stop_browse(OSCJSON_SERVICE) {
        log::debug!("mDNS stop_browse: {}", e);
    }
    log::info!("OSCQuery: found {}", found);
    Ok(found)
}

/// Running OSCQuery advertisement
pub struct QueryService {
    mdns: ServiceDaemon,
    registered: Vec<String>,
    server: JoinHandle<()>,
}

impl QueryService {
    /// Serve HTTP and announce both the HTTP and the OSC endpoint on mDNS
    pub async fn start(
        mdns: ServiceDaemon,
        name: &str,
        osc_addr: SocketAddr,
        dispatcher: Arc<RwLock<Dispatcher>>,
    ) -> Result<Self> {
        let (http_addr, server) = serve_http(name, osc_addr, dispatcher).await?;
        let mut service = Self {
            mdns,
            registered: Vec::new(),
            server,
        };

        let host = format!("{}.local.", name);
        let ip = osc_addr.ip().to_string();
        let endpoints = [
            (OSCJSON_SERVICE, http_addr.port()),
            (OSC_SERVICE, osc_addr.port()),
        ];
        for (service_type, port) in endpoints {
            let registered = ServiceInfo::new(
                service_type,
                name,
                &host,
                ip.as_str(),
                port,
                HashMap::<String, String>::new(),
            )
            .and_then(|info| {
                let fullname = info.get_fullname().to_string();
                service.mdns.register(info).map(|()| fullname)
            });
            match registered {
                Ok(fullname) => service.registered.push(fullname),
                Err(e) => {
                    service.stop();
                    return Err(e.into());
                }
            }
        }
        log::info!("OSCQuery: advertising {} at http://{}", name, http_addr);
        Ok(service)
    }

    /// Withdraw the announcements and stop serving
    pub fn stop(self) {
        for fullname in &self.registered {
            if let Err(e) = self.mdns.unregister(fullname) {
                log::warn!("mDNS unregister {}: {}", fullname, e);
            }
        }
        if let Err(e) = self.mdns.shutdown() {
            log::debug!("mDNS shutdown: {}", e);
        }
        self.server.abort();
        log::info!("OSCQuery: stopped");
    }
}
