//! UDP datagram transport
//!
//! Each datagram is one payload in both directions, no framing.

use super::{Connection, FrameSender};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{lookup_host, UdpSocket};
use tokio::task::JoinHandle;

/// Largest datagram accepted from a device
const RECV_BUFFER_SIZE: usize = 1500;

/// UDP endpoint parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UdpParams {
    /// Hostname or IP of the device
    pub address: String,
    /// Device UDP port
    pub port: u16,
}

/// Connected UDP socket to one device
pub struct UdpConnection {
    params: UdpParams,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl UdpConnection {
    pub fn new(params: UdpParams) -> Self {
        Self {
            params,
            socket: Mutex::new(None),
            receiver: Mutex::new(None),
        }
    }

    /// Resolve the device hostname once, preferring IPv4
    async fn resolve(&self) -> Result<SocketAddr> {
        let host = self.params.address.as_str();
        let addrs: Vec<SocketAddr> = lookup_host((host, self.params.port))
            .await
            .map_err(|e| Error::HostResolution(format!("{}: {}", host, e)))?
            .collect();
        addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| Error::HostResolution(host.to_string()))
    }

    fn socket(&self) -> Result<Arc<UdpSocket>> {
        self.socket.lock().clone().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl Connection for UdpConnection {
    async fn connect(&self, frames: FrameSender) -> Result<()> {
        let remote = self.resolve().await?;
        let local: SocketAddr = if remote.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;
        let socket = Arc::new(socket);
        log::debug!("UDP {} -> {}", socket.local_addr()?, remote);

        let reader = Arc::clone(&socket);
        let endpoint = self.describe();
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUFFER_SIZE];
            loop {
                match reader.recv(&mut buf).await {
                    Ok(n) => {
                        if frames.send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                            break;
                        }
                    }
                    // ICMP unreachable surfaces here on connected sockets
                    Err(e) => log::warn!("{}: receive error: {}", endpoint, e),
                }
            }
        });

        *self.socket.lock() = Some(socket);
        if let Some(old) = self.receiver.lock().replace(task) {
            old.abort();
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(task) = self.receiver.lock().take() {
            task.abort();
        }
        self.socket.lock().take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.socket.lock().is_some()
    }

    async fn send(&self, data: &[u8]) -> Result<()> {
        let socket = self.socket()?;
        socket.send(data).await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("udp://{}:{}", self.params.address, self.params.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn params(port: u16) -> UdpParams {
        UdpParams {
            address: "127.0.0.1".to_string(),
            port,
        }
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = device.local_addr().unwrap().port();

        let connection = UdpConnection::new(params(port));
        let (tx, mut rx) = mpsc::unbounded_channel();
        connection.connect(tx).await.unwrap();
        assert!(connection.is_connected());

        connection.send(&[0x42, 0x01, 0xFF]).await.unwrap();
        let mut buf = [0u8; 16];
        let (n, from) = device.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0x42, 0x01, 0xFF]);

        device.send_to(&[0x25, 0x10, 0x00], from).await.unwrap();
        let frame = rx.recv().await.unwrap();
        assert_eq!(&frame[..], &[0x25, 0x10, 0x00]);

        connection.disconnect().await.unwrap();
        assert!(!connection.is_connected());
    }

    #[tokio::test]
    async fn test_send_before_connect() {
        let connection = UdpConnection::new(params(9));
        assert!(matches!(
            connection.send(&[1]).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        let connection = UdpConnection::new(UdpParams {
            address: "no-such-host.invalid".to_string(),
            port: 1337,
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            connection.connect(tx).await,
            Err(Error::HostResolution(_))
        ));
        assert!(!connection.is_connected());
    }
}
