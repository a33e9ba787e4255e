// UDP client for talking to the relay.
//
// A thin blocking wrapper around one `UdpSocket` that speaks the datagram
// protocol: `connect()` sends the first record (which registers the session)
// and waits for the `Connected` ack, the `send_*` helpers encode one record
// each, and `recv()` blocks up to the reply timeout for the next inbound
// record. There is no reader thread; callers that only poll occasionally can
// use `drain()`.
//
// The socket is `connect`ed to the relay, so datagrams from anyone else are
// discarded by the OS.
//
// This is what the integration tests drive, and it doubles as a reference
// for game-side implementations of the protocol.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use duel_lobby_protocol::{
    Character, ClientId, ClientMessage, CodecError, MAX_DATAGRAM_SIZE, Role, RoomCode,
    ServerMessage, decode_server, encode_client,
};

/// How long `drain` waits for stragglers once the socket goes quiet.
const DRAIN_WAIT: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("no reply from relay within {0:?}")]
    Timeout(Duration),
    #[error("unexpected record from relay: {0:?}")]
    Unexpected(ServerMessage),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// UDP client for relay communication.
pub struct RelayClient {
    socket: UdpSocket,
    id: ClientId,
    reply_timeout: Duration,
    buf: Vec<u8>,
}

impl RelayClient {
    /// Bind a local socket, register `id` under `username`, and wait for the
    /// relay's ack.
    pub fn connect(
        relay: SocketAddr,
        id: impl Into<ClientId>,
        username: &str,
        reply_timeout: Duration,
    ) -> Result<Self> {
        let local: IpAddr = match relay {
            SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
            SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
        };
        let socket = UdpSocket::bind((local, 0))?;
        socket.connect(relay)?;

        let mut client = Self {
            socket,
            id: id.into(),
            reply_timeout,
            buf: vec![0u8; MAX_DATAGRAM_SIZE],
        };

        // Any record type registers an unknown id; a rename carries the name
        // in the field the relay reads anyway.
        let hello = ClientMessage::Rename {
            username: username.to_owned(),
        };
        let bytes = encode_client(&client.id, Some(username), &hello)?;
        client.socket.send(&bytes)?;

        match client.recv()? {
            ServerMessage::Connected => Ok(client),
            other => Err(ClientError::Unexpected(other)),
        }
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// The local address the relay sees this client at.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Encode and send one record.
    pub fn send(&self, message: &ClientMessage) -> Result<()> {
        let bytes = encode_client(&self.id, None, message)?;
        self.socket.send(&bytes)?;
        Ok(())
    }

    /// Send raw bytes as one datagram, bypassing the codec.
    pub fn send_raw(&self, datagram: &[u8]) -> Result<()> {
        self.socket.send(datagram)?;
        Ok(())
    }

    /// Open a room and return its code.
    pub fn create_room(&mut self) -> Result<RoomCode> {
        self.send(&ClientMessage::CreateRoom)?;
        match self.recv()? {
            ServerMessage::RoomCreated { room } => Ok(room),
            other => Err(ClientError::Unexpected(other)),
        }
    }

    /// Join a room and return the role the relay assigned.
    pub fn join_room(&mut self, room: RoomCode) -> Result<Role> {
        self.send(&ClientMessage::JoinRoom { room })?;
        match self.recv()? {
            ServerMessage::RoomJoined { role, .. } => Ok(role),
            other => Err(ClientError::Unexpected(other)),
        }
    }

    pub fn send_exit_room(&self, room: RoomCode) -> Result<()> {
        self.send(&ClientMessage::ExitRoom { room })
    }

    pub fn send_chat(&self, room: RoomCode, text: &str) -> Result<()> {
        self.send(&ClientMessage::Chat {
            room,
            text: text.to_owned(),
        })
    }

    pub fn send_input(&self, room: RoomCode, key: u32, pressed: bool) -> Result<()> {
        self.send(&ClientMessage::Input { room, key, pressed })
    }

    pub fn send_join_game(&self, room: RoomCode) -> Result<()> {
        self.send(&ClientMessage::JoinGame { room })
    }

    pub fn send_leave_game(&self, room: RoomCode) -> Result<()> {
        self.send(&ClientMessage::LeaveGame { room })
    }

    pub fn send_select_character(&self, room: RoomCode, character: Option<Character>) -> Result<()> {
        self.send(&ClientMessage::SelectCharacter { room, character })
    }

    pub fn send_rename(&self, username: &str) -> Result<()> {
        self.send(&ClientMessage::Rename {
            username: username.to_owned(),
        })
    }

    pub fn send_refresh_roster(&self, room: RoomCode) -> Result<()> {
        self.send(&ClientMessage::RefreshRoster { room })
    }

    pub fn send_start_match(&self, room: RoomCode) -> Result<()> {
        self.send(&ClientMessage::StartMatch { room })
    }

    pub fn send_disconnect(&self) -> Result<()> {
        self.send(&ClientMessage::Disconnect)
    }

    /// Block for the next record, up to the reply timeout.
    pub fn recv(&mut self) -> Result<ServerMessage> {
        self.recv_within(self.reply_timeout)?
            .ok_or(ClientError::Timeout(self.reply_timeout))
    }

    /// Everything that arrives before the socket goes quiet.
    pub fn drain(&mut self) -> Result<Vec<ServerMessage>> {
        let mut received = Vec::new();
        while let Some(message) = self.recv_within(DRAIN_WAIT)? {
            received.push(message);
        }
        Ok(received)
    }

    /// The next record, or `None` if nothing arrives within `wait`.
    fn recv_within(&mut self, wait: Duration) -> Result<Option<ServerMessage>> {
        self.socket.set_read_timeout(Some(wait))?;
        match self.socket.recv(&mut self.buf) {
            Ok(len) => Ok(Some(decode_server(&self.buf[..len])?)),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
