//! OSC receive server
//!
//! Listens for OSC packets and routes their messages to the haptics router.
//! Bundles time-tagged in the future are held back until their time comes.

use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use super::error::{OscError, OscResult};
use super::packet::{parse_packet, OscPacket};
use crate::axis::AxisCommander;
use crate::haptics::HapticsRouter;

/// Largest datagram accepted
const RECEIVE_BUFFER_SIZE: usize = 8192;

pub struct OscServer {
    socket: UdpSocket,
    handler: PacketHandler,
}

/// Routes parsed packets; cloned into delayed bundle tasks
#[derive(Clone)]
struct PacketHandler {
    router: Arc<HapticsRouter>,
    commander: AxisCommander,
}

impl OscServer {
    /// Bind the receive socket
    pub async fn bind(
        addr: SocketAddr,
        router: HapticsRouter,
        commander: AxisCommander,
    ) -> OscResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| OscError::Bind { addr, source })?;

        tracing::info!(%addr, "OSC server listening");

        Ok(Self {
            socket,
            handler: PacketHandler {
                router: Arc::new(router),
                commander,
            },
        })
    }

    pub fn local_addr(&self) -> OscResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok((len, from)) => match parse_packet(&buf[..len]) {
                        Ok(packet) => self.handler.handle(packet, &cancel),
                        Err(e) => {
                            tracing::debug!(%from, error = %e, "Dropped malformed OSC packet");
                        }
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "OSC receive failed");
                    }
                }
            }
        }

        tracing::info!("OSC server stopped");
    }
}

impl PacketHandler {
    fn handle(&self, packet: OscPacket, cancel: &CancellationToken) {
        match packet {
            OscPacket::Message(message) => {
                self.router.handle_message(&message, &self.commander);
            }
            OscPacket::Bundle(bundle) => match bundle.time.delay_from(Utc::now()) {
                Some(delay) => {
                    tracing::trace!(?delay, "Delaying OSC bundle");
                    let handler = self.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = tokio::time::sleep(delay) => {
                                for packet in bundle.content {
                                    handler.handle(packet, &cancel);
                                }
                            }
                        }
                    });
                }
                None => {
                    for packet in bundle.content {
                        self.handle(packet, cancel);
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HapticsConfig;
    use crate::osc::packet::{OscArg, OscBundle, OscMessage, OscTime};
    use std::time::Duration;

    const TOUCH_HEAD: &str = "/avatar/parameters/VRCOSC/AXHaptics/TouchedHead";

    async fn start_server(
        rig: &UdpSocket,
    ) -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<()>) {
        let commander = AxisCommander::standalone(rig.local_addr().unwrap()).unwrap();
        let server = OscServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            HapticsRouter::new(HapticsConfig::default()),
            commander,
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(server.run(cancel.clone()));
        (addr, cancel, task)
    }

    async fn recv_command(rig: &UdpSocket, wait: Duration) -> Option<Vec<u8>> {
        let mut buf = [0u8; 16];
        let len = tokio::time::timeout(wait, rig.recv(&mut buf)).await.ok()?.unwrap();
        Some(buf[..len].to_vec())
    }

    fn touch(value: bool) -> OscMessage {
        OscMessage::new(TOUCH_HEAD, vec![OscArg::Bool(value)])
    }

    #[tokio::test]
    async fn test_message_triggers_vibration() {
        let rig = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (addr, cancel, task) = start_server(&rig).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        // Garbage first, then a false trigger, then a real one
        client.send_to(b"\xff\xff", addr).await.unwrap();
        client.send_to(&touch(false).encode(), addr).await.unwrap();
        client.send_to(&touch(true).encode(), addr).await.unwrap();

        let command = recv_command(&rig, Duration::from_secs(2)).await.unwrap();
        // Head is node 14
        assert_eq!(&command[5..7], &[0x80, 14]);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("server did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_immediate_bundle_is_delivered() {
        let rig = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (addr, cancel, _task) = start_server(&rig).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let bundle = OscBundle {
            time: OscTime::IMMEDIATELY,
            content: vec![OscPacket::Message(touch(true))],
        };
        client.send_to(&bundle.encode(), addr).await.unwrap();

        assert!(recv_command(&rig, Duration::from_secs(2)).await.is_some());
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_future_bundle_is_delayed() {
        let rig = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (addr, cancel, _task) = start_server(&rig).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let bundle = OscBundle {
            time: OscTime::from(Utc::now() + chrono::Duration::milliseconds(500)),
            content: vec![OscPacket::Message(touch(true))],
        };
        client.send_to(&bundle.encode(), addr).await.unwrap();

        assert!(recv_command(&rig, Duration::from_millis(150)).await.is_none());
        assert!(recv_command(&rig, Duration::from_secs(2)).await.is_some());
        cancel.cancel();
    }
}
