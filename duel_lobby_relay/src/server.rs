// UDP socket and main loop for the relay.
//
// Architecture: one thread, one socket, no channels.
//
// - `start_relay` binds the socket on the caller's thread (so bind errors
//   surface immediately and port 0 resolves to a real port), then spawns the
//   relay thread.
// - The relay thread owns the `Dispatcher` outright. Each `recv_from` hands
//   one datagram to `Dispatcher::handle_datagram`, which runs to completion
//   and writes its replies through a `UdpOutbox` on the same socket before
//   the next datagram is read. That ordering is the whole concurrency model:
//   no two records ever observe a half-applied update.
// - The socket has a short read timeout so the loop can notice the
//   `keep_running` flag (cleared by `RelayHandle::stop`) without a wakeup
//   datagram.
//
// Receive errors other than timeouts are logged and the loop carries on. On
// some platforms an ICMP port-unreachable from an earlier send shows up as a
// `ConnectionReset` on the next receive; that is a client going away, not a
// relay failure.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use duel_lobby_protocol::MAX_DATAGRAM_SIZE;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::outbox::UdpOutbox;
use crate::room::{DEFAULT_MAX_CODE_ATTEMPTS, RoomRegistry};
use crate::room_code::CodeGenerator;

/// How long a blocked receive waits before re-checking the stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handle returned by `start_relay` to control the running server.
pub struct RelayHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RelayHandle {
    /// Signal the relay to stop and wait for it to shut down.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            if handle.join().is_err() {
                warn!("relay thread panicked");
            }
        }
    }
}

/// Configuration for starting a relay server.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub host: String,
    /// 0 lets the OS pick a free port.
    pub port: u16,
    /// Random draws before room creation falls back to scanning for a free
    /// code.
    pub max_code_attempts: u32,
    /// Fixed seed for room codes. `None` seeds from the environment.
    pub seed: Option<u64>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            max_code_attempts: DEFAULT_MAX_CODE_ATTEMPTS,
            seed: None,
        }
    }
}

/// Start the relay server on a background thread. Returns a handle for
/// stopping it and the actual bound address (useful when port 0 is used
/// to let the OS pick a free port).
pub fn start_relay(config: RelayConfig) -> io::Result<(RelayHandle, SocketAddr)> {
    let socket = UdpSocket::bind((config.host.as_str(), config.port))?;
    socket.set_read_timeout(Some(POLL_INTERVAL))?;
    let addr = socket.local_addr()?;

    let codes = match config.seed {
        Some(seed) => CodeGenerator::new(seed),
        None => CodeGenerator::from_entropy(),
    };
    let dispatcher = Dispatcher::new(RoomRegistry::new(codes, config.max_code_attempts));

    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = keep_running.clone();
    let thread = thread::Builder::new()
        .name("duel-relay".into())
        .spawn(move || run_relay(socket, dispatcher, keep_running_clone))?;

    info!(%addr, "relay started");
    Ok((
        RelayHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Main relay loop. Runs until `keep_running` is set to false.
fn run_relay(socket: UdpSocket, mut dispatcher: Dispatcher, keep_running: Arc<AtomicBool>) {
    // One byte over the limit so an oversized datagram is caught by the
    // codec's size check instead of being silently truncated to fit.
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE + 1];

    while keep_running.load(Ordering::SeqCst) {
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue;
            }
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                debug!(error = %e, "peer unreachable");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "receive failed");
                continue;
            }
        };

        let mut out = UdpOutbox::new(&socket);
        dispatcher.handle_datagram(from, &buf[..len], &mut out);
    }

    info!(
        sessions = dispatcher.sessions().len(),
        rooms = dispatcher.rooms().len(),
        "relay stopped"
    );
}
