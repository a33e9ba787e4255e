// Error taxonomy for lobby operations.
//
// None of these ever reach a client: the dispatcher logs them at `debug` and
// drops the inbound record. A missing reply is the client's only signal.

use duel_lobby_protocol::{ClientId, RoomCode};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("no session for client {0}")]
    UnknownSession(ClientId),
    #[error("no active room {0}")]
    UnknownRoom(RoomCode),
    #[error("client {client} is not in room {room}")]
    NotInRoom { room: RoomCode, client: ClientId },
    #[error("client {client} is not a player in room {room}")]
    NotAPlayer { room: RoomCode, client: ClientId },
    #[error("client {client} is not a spectator in room {room}")]
    NotASpectator { room: RoomCode, client: ClientId },
    #[error("room {0} already has two players")]
    RoomFull(RoomCode),
    #[error("room {0} has no opponent to relay input to")]
    OpponentMissing(RoomCode),
    #[error("no free room codes left")]
    RoomSpaceExhausted,
}

pub type Result<T> = std::result::Result<T, RelayError>;
