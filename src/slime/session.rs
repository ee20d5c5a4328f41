//! Per-tracker sink session
//!
//! Each tracker is presented to the SlimeVR server as its own device with a
//! dedicated UDP socket and sequence counter. A background loop answers the
//! server's heartbeats and pings.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::{SlimeError, SlimeResult};
use super::packet::{decode_rx, Handshake, RxPacket, TxPacket};
use crate::axis::TrackerSlot;

/// Outbound serialization buffer capacity
const TX_BUFFER_SIZE: usize = 128;

/// Inbound buffer size
const RX_BUFFER_SIZE: usize = 256;

/// Session with the SlimeVR server for one tracker
pub struct SlimeSession {
    endpoint: SocketAddr,
    shared: Arc<Shared>,
    receiver: Option<ReceiveLoop>,
}

struct ReceiveLoop {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// State shared with the receive loop
struct Shared {
    /// One send in flight at a time
    tx: Mutex<TxState>,
    connected: AtomicBool,
}

struct TxState {
    socket: Option<Arc<UdpSocket>>,
    buf: Vec<u8>,
    sequence: u64,
}

impl Shared {
    async fn send(&self, packet: &TxPacket) -> SlimeResult<()> {
        let mut tx = self.tx.lock().await;
        let TxState {
            socket,
            buf,
            sequence,
        } = &mut *tx;

        let Some(socket) = socket else {
            return Err(SlimeError::NotRunning);
        };

        packet.encode(*sequence, buf);
        *sequence = sequence.wrapping_add(1);
        socket.send(&buf[..]).await?;
        Ok(())
    }
}

impl SlimeSession {
    /// Create a stopped session targeting `endpoint`
    pub fn new(endpoint: SocketAddr) -> Self {
        Self {
            endpoint,
            shared: Arc::new(Shared {
                tx: Mutex::new(TxState {
                    socket: None,
                    buf: Vec::with_capacity(TX_BUFFER_SIZE),
                    sequence: 0,
                }),
                connected: AtomicBool::new(false),
            }),
            receiver: None,
        }
    }

    /// Open the socket, reset the sequence counter and spawn the receive loop
    ///
    /// Does nothing if the session is already running.
    pub async fn start(&mut self) -> SlimeResult<()> {
        if self.receiver.is_some() {
            return Ok(());
        }

        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
        socket.connect(self.endpoint).await?;
        let socket = Arc::new(socket);

        {
            let mut tx = self.shared.tx.lock().await;
            tx.socket = Some(Arc::clone(&socket));
            tx.sequence = 0;
        }
        self.shared.connected.store(false, Ordering::Relaxed);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(receive_loop(
            socket,
            Arc::clone(&self.shared),
            cancel.clone(),
        ));
        self.receiver = Some(ReceiveLoop { cancel, task });

        tracing::debug!(endpoint = %self.endpoint, "Sink session started");
        Ok(())
    }

    /// Stop the receive loop and close the socket
    ///
    /// Does nothing if the session is not running.
    pub async fn stop(&mut self) {
        let Some(receiver) = self.receiver.take() else {
            return;
        };

        receiver.cancel.cancel();
        if let Err(e) = receiver.task.await {
            tracing::warn!(error = %e, "Sink receive loop ended abnormally");
        }

        {
            let mut tx = self.shared.tx.lock().await;
            tx.socket = None;
            tx.sequence = 0;
            tx.buf.clear();
        }
        self.shared.connected.store(false, Ordering::Relaxed);

        tracing::debug!(endpoint = %self.endpoint, "Sink session stopped");
    }

    pub fn is_running(&self) -> bool {
        self.receiver.is_some()
    }

    /// Whether the server has sent anything since the session started
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Relaxed)
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Serialize and send one frame, consuming the next sequence number
    pub async fn send(&self, packet: &TxPacket) -> SlimeResult<()> {
        self.shared.send(packet).await
    }

    /// Announce this tracker: handshake followed by sensor info
    ///
    /// The handshake's identifier is offset by the tracker id so every slot
    /// appears as a distinct device.
    pub async fn register(&self, slot: TrackerSlot, handshake: &Handshake) -> SlimeResult<()> {
        let handshake = Handshake {
            mac_address: handshake.mac_address.offset(slot.tracker_id()),
            ..handshake.clone()
        };

        tracing::info!(
            tracker_id = slot.tracker_id(),
            mac = %handshake.mac_address,
            "Registering tracker with sink"
        );

        self.send(&TxPacket::Handshake(handshake)).await?;
        self.send(&TxPacket::sensor_ok(0)).await
    }
}

impl Drop for SlimeSession {
    fn drop(&mut self) {
        if let Some(receiver) = &self.receiver {
            receiver.cancel.cancel();
        }
    }
}

/// Receive frames from the server until cancelled
async fn receive_loop(socket: Arc<UdpSocket>, shared: Arc<Shared>, cancel: CancellationToken) {
    let mut buf = [0u8; RX_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = socket.recv(&mut buf) => match result {
                Ok(len) => handle_frame(&buf[..len], &shared).await,
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                    tracing::trace!("Sink not listening");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Sink receive failed");
                }
            }
        }
    }

    tracing::trace!("Sink receive loop stopped");
}

async fn handle_frame(frame: &[u8], shared: &Shared) {
    let packet = match decode_rx(frame) {
        Ok((_, packet)) => packet,
        Err(e) => {
            tracing::debug!(error = %e, "Dropped malformed sink frame");
            return;
        }
    };

    if !shared.connected.swap(true, Ordering::Relaxed) {
        tracing::info!("Sink connected");
    }

    let reply = match packet {
        RxPacket::Heartbeat => Some(TxPacket::Heartbeat),
        RxPacket::Ping { ping_id } => Some(TxPacket::PingPong { ping_id }),
        other => {
            tracing::trace!(?other, "Ignoring sink frame");
            None
        }
    };

    if let Some(reply) = reply {
        match shared.send(&reply).await {
            Ok(()) | Err(SlimeError::NotRunning) => {}
            Err(e) => tracing::debug!(error = %e, "Failed to answer sink"),
        }
    }
}
