// Outbound side of the relay.
//
// Handlers never touch the socket directly; they hand each record and its
// destination to an `Outbox`. The server plugs in `UdpOutbox`, unit tests use
// a plain `Vec<Delivery>` and inspect what would have been sent.
//
// Sending is best-effort, as the transport is. `UdpOutbox` logs encode and
// send failures and carries on; one unreachable client must not stall the
// rest of a broadcast.

use std::net::{SocketAddr, UdpSocket};

use duel_lobby_protocol::{ServerMessage, encode_server};
use tracing::warn;

pub trait Outbox {
    fn send(&mut self, to: SocketAddr, message: ServerMessage);
}

/// One record addressed to one client.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub to: SocketAddr,
    pub message: ServerMessage,
}

impl Outbox for Vec<Delivery> {
    fn send(&mut self, to: SocketAddr, message: ServerMessage) {
        self.push(Delivery { to, message });
    }
}

/// Sends each record as one datagram on the relay's socket.
pub struct UdpOutbox<'a> {
    socket: &'a UdpSocket,
}

impl<'a> UdpOutbox<'a> {
    pub fn new(socket: &'a UdpSocket) -> Self {
        Self { socket }
    }
}

impl Outbox for UdpOutbox<'_> {
    fn send(&mut self, to: SocketAddr, message: ServerMessage) {
        let datagram = match encode_server(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%to, kind = message.kind(), error = %e, "failed to encode record");
                return;
            }
        };
        if let Err(e) = self.socket.send_to(&datagram, to) {
            warn!(%to, kind = message.kind(), error = %e, "send failed");
        }
    }
}
