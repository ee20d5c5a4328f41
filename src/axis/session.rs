//! Rig session
//!
//! Owns the two multicast receive loops (telemetry and message channels) and
//! the unicast command socket. Every accepted telemetry datagram is decoded in
//! place into the shared [`AxisOutputData`] and announced to subscribers
//! through a `watch` channel.

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr};
use std::net::UdpSocket as StdUdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::commands::{AxisCommand, Rgb};
use super::decoder;
use super::error::{AxisError, AxisResult};
use super::types::AxisOutputData;
use crate::config::AxisConfig;

/// Receive buffer size, comfortably above the largest telemetry datagram
const RECEIVE_BUFFER_SIZE: usize = 1024;

/// Session with the rig hub
pub struct AxisSession {
    config: AxisConfig,
    /// Decoded rig state, written only by the telemetry loop
    state: Arc<watch::Sender<AxisOutputData>>,
    link: Arc<CommandLink>,
    tx_started: Arc<AtomicBool>,
    running: Option<RunningLoops>,
}

struct RunningLoops {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl AxisSession {
    /// Create a stopped session
    pub fn new(config: AxisConfig) -> Self {
        let timeout = Duration::from_secs(config.activity_timeout_secs);
        let (state, _) = watch::channel(AxisOutputData::with_activity_timeout(timeout));

        Self {
            link: Arc::new(CommandLink::new(config.command_endpoint)),
            config,
            state: Arc::new(state),
            tx_started: Arc::new(AtomicBool::new(false)),
            running: None,
        }
    }

    /// Open sockets, spawn the receive loops and ask the rig to stream
    ///
    /// Does nothing if the session is already running.
    pub async fn start(&mut self) -> AxisResult<()> {
        if self.running.is_some() {
            return Ok(());
        }

        let telemetry = bind_multicast(
            self.config.telemetry_group,
            self.config.telemetry_port,
            self.config.interface,
        )?;
        let message = bind_multicast(
            self.config.message_group,
            self.config.message_port,
            self.config.interface,
        )?;
        self.link.attach(bind_command_socket()?);

        let cancel = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(telemetry_loop(
                telemetry,
                Arc::clone(&self.state),
                Arc::clone(&self.tx_started),
                cancel.clone(),
            )),
            tokio::spawn(message_loop(message, cancel.clone())),
        ];
        self.running = Some(RunningLoops { cancel, tasks });

        tracing::info!(
            telemetry = %format!("{}:{}", self.config.telemetry_group, self.config.telemetry_port),
            message = %format!("{}:{}", self.config.message_group, self.config.message_port),
            command = %self.config.command_endpoint,
            "Rig session started"
        );

        self.commander().start_streaming();
        Ok(())
    }

    /// Stop streaming, wait for the receive loops to exit and close the sockets
    ///
    /// Does nothing if the session is not running.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        self.commander().stop_streaming();

        running.cancel.cancel();
        for task in running.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Rig receive loop ended abnormally");
            }
        }
        self.link.detach();

        tracing::info!("Rig session stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Whether any telemetry datagram has arrived since the session was created
    pub fn is_tx_started(&self) -> bool {
        self.tx_started.load(Ordering::Relaxed)
    }

    /// Subscribe to "new sample decoded" notifications
    ///
    /// The receiver observes one change per accepted telemetry datagram and
    /// borrows the shared decoded state.
    pub fn subscribe(&self) -> watch::Receiver<AxisOutputData> {
        self.state.subscribe()
    }

    /// Handle for sending commands over this session's command socket
    pub fn commander(&self) -> AxisCommander {
        AxisCommander {
            link: Arc::clone(&self.link),
        }
    }
}

impl Drop for AxisSession {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}

/// Create a UDP socket bound to `port` and joined to a multicast group
fn bind_multicast(group: Ipv4Addr, port: u16, interface: Ipv4Addr) -> AxisResult<UdpSocket> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket
        .bind(&addr.into())
        .map_err(|source| AxisError::Bind { addr, source })?;
    socket
        .join_multicast_v4(&group, &interface)
        .map_err(|source| AxisError::Multicast {
            group,
            interface,
            source,
        })?;
    socket.set_nonblocking(true)?;

    tracing::debug!(%group, port, %interface, "Joined multicast group");
    Ok(UdpSocket::from_std(socket.into())?)
}

/// Create the unicast client socket used for rig commands
///
/// Left in blocking mode: commands are sent synchronously from any thread,
/// outside the tokio reactor.
fn bind_command_socket() -> AxisResult<StdUdpSocket> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket
        .bind(&addr.into())
        .map_err(|source| AxisError::Bind { addr, source })?;

    Ok(socket.into())
}

/// Receive telemetry until cancelled, decoding each datagram in arrival order
pub(crate) async fn telemetry_loop(
    socket: UdpSocket,
    state: Arc<watch::Sender<AxisOutputData>>,
    tx_started: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut buf = [0u8; RECEIVE_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = socket.recv_from(&mut buf) => match result {
                Ok((0, _)) => continue,
                Ok((len, from)) => {
                    if !tx_started.swap(true, Ordering::Relaxed) {
                        tracing::info!(%from, "Rig telemetry started");
                    }

                    let now = Instant::now();
                    let accepted = state.send_if_modified(|data| {
                        decoder::decode_into(&buf[..len], data, now)
                    });
                    if !accepted {
                        tracing::trace!(len, "Dropped telemetry datagram with unexpected size");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Telemetry receive failed");
                }
            }
        }
    }

    tracing::debug!("Telemetry loop stopped");
}

/// Receive the rig's message channel until cancelled
///
/// The channel carries no messages the bridge acts on yet; datagrams are
/// only traced.
async fn message_loop(socket: UdpSocket, cancel: CancellationToken) {
    let mut buf = [0u8; RECEIVE_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = socket.recv_from(&mut buf) => match result {
                Ok((0, _)) => continue,
                Ok((len, from)) => {
                    tracing::trace!(len, %from, "Rig message received");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Message receive failed");
                }
            }
        }
    }

    tracing::debug!("Message loop stopped");
}

/// Unicast command channel shared between the session and its commanders
struct CommandLink {
    endpoint: SocketAddr,
    socket: RwLock<Option<Arc<StdUdpSocket>>>,
}

impl CommandLink {
    fn new(endpoint: SocketAddr) -> Self {
        Self {
            endpoint,
            socket: RwLock::new(None),
        }
    }

    fn attach(&self, socket: StdUdpSocket) {
        let mut guard = self.socket.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(Arc::new(socket));
    }

    fn detach(&self) {
        let mut guard = self.socket.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    /// Fire-and-forget send
    ///
    /// A send while no socket is open is dropped silently; other failures are
    /// logged and swallowed.
    fn send(&self, data: &[u8]) {
        let socket = {
            let guard = self.socket.read().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };

        let Some(socket) = socket else {
            tracing::trace!(len = data.len(), "Command dropped, rig session not running");
            return;
        };

        if let Err(e) = socket.send_to(data, self.endpoint) {
            tracing::warn!(endpoint = %self.endpoint, error = %e, "Failed to send rig command");
        }
    }
}

/// Cloneable handle for sending commands to the rig
#[derive(Clone)]
pub struct AxisCommander {
    link: Arc<CommandLink>,
}

impl AxisCommander {
    /// Create a commander with its own command socket, independent of any session
    pub fn standalone(endpoint: SocketAddr) -> AxisResult<Self> {
        let link = CommandLink::new(endpoint);
        link.attach(bind_command_socket()?);
        Ok(Self {
            link: Arc::new(link),
        })
    }

    /// Send a single command datagram
    pub fn send(&self, command: AxisCommand) {
        tracing::trace!(?command, "Sending rig command");
        self.link.send(&command.encode());
    }

    pub fn start_streaming(&self) {
        self.send(AxisCommand::StartStreaming);
        self.send(AxisCommand::SetStreamingMode);
    }

    pub fn stop_streaming(&self) {
        self.send(AxisCommand::StopStreaming);
    }

    pub fn reboot(&self) {
        self.send(AxisCommand::Reboot);
    }

    pub fn zero_all(&self) {
        self.send(AxisCommand::ZeroAll);
    }

    pub fn single_pose_calibration(&self) {
        self.send(AxisCommand::SinglePoseCalibration);
    }

    pub fn set_node_vibration(&self, node: u8, intensity: f32, duration_secs: f32) {
        self.send(AxisCommand::SetNodeVibration {
            node,
            intensity,
            duration_secs,
        });
    }

    pub fn set_node_led(&self, node: u8, color: Rgb, brightness: f32) {
        self.send(AxisCommand::SetNodeLed {
            node,
            color,
            brightness,
        });
    }
}
