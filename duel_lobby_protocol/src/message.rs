// Protocol records for client-relay communication.
//
// Two enums define the full protocol vocabulary:
// - `ClientMessage`: a validated inbound record, one variant per `type` code.
// - `ServerMessage`: an outbound record, one variant per `type` code.
//
// On the wire every record is a flat JSON object with an integer `type` field
// next to the kind-specific fields (see `codec.rs`). The client id travels in
// every inbound record but is split off into the codec's `Envelope` before a
// `ClientMessage` is built, since the relay only uses it for lookup.
//
// `ServerMessage` serializes by hand rather than via derive because the wire
// format predates this crate: the type tag is an integer, roster entries are
// all strings, and an empty roster is the literal `[0, 1, 2]`.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::types::{Character, RoomCode, Role};

/// Inbound `type` codes.
pub mod client_kind {
    pub const INPUT: u64 = 0;
    pub const CHAT: u64 = 1;
    pub const CREATE_ROOM: u64 = 2;
    pub const JOIN_ROOM: u64 = 3;
    pub const EXIT_ROOM: u64 = 4;
    pub const JOIN_GAME: u64 = 5;
    pub const LEAVE_GAME: u64 = 6;
    pub const RENAME: u64 = 7;
    pub const DISCONNECT: u64 = 8;
    pub const SELECT_CHARACTER: u64 = 9;
    pub const REFRESH_ROSTER: u64 = 10;
    pub const START_MATCH: u64 = 11;
}

/// Outbound `type` codes.
pub mod server_kind {
    pub const REMOTE_INPUT: u64 = 0;
    pub const LOCAL_INPUT: u64 = 1;
    pub const CHAT: u64 = 2;
    pub const ROOM_CREATED: u64 = 3;
    pub const ROOM_JOINED: u64 = 4;
    pub const ROOM_EXITED: u64 = 5;
    pub const ROSTER_CHANGED: u64 = 6;
    pub const RENAMED: u64 = 7;
    pub const DISCONNECTED: u64 = 8;
    pub const CONNECTED: u64 = 9;
    pub const MATCH_STARTED: u64 = 10;
}

/// Records sent by a client to the relay, after validation.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientMessage {
    /// A key went down or up during a match.
    Input {
        room: RoomCode,
        key: u32,
        pressed: bool,
    },
    /// Room chat line.
    Chat { room: RoomCode, text: String },
    /// Open a new room with the sender as player 0.
    CreateRoom,
    JoinRoom { room: RoomCode },
    ExitRoom { room: RoomCode },
    /// Spectator asks for a free player slot.
    JoinGame { room: RoomCode },
    /// Player gives up their slot and becomes a spectator.
    LeaveGame { room: RoomCode },
    Rename { username: String },
    /// Client is leaving gracefully.
    Disconnect,
    /// Pick a fighter, or clear the pick with `None`.
    SelectCharacter {
        room: RoomCode,
        character: Option<Character>,
    },
    /// Ask the relay to re-send the roster to everyone in the room.
    RefreshRoster { room: RoomCode },
    /// Someone in the room pressed "fight".
    StartMatch { room: RoomCode },
}

impl ClientMessage {
    /// Wire `type` code of this record.
    pub fn kind(&self) -> u64 {
        use client_kind::*;
        match self {
            ClientMessage::Input { .. } => INPUT,
            ClientMessage::Chat { .. } => CHAT,
            ClientMessage::CreateRoom => CREATE_ROOM,
            ClientMessage::JoinRoom { .. } => JOIN_ROOM,
            ClientMessage::ExitRoom { .. } => EXIT_ROOM,
            ClientMessage::JoinGame { .. } => JOIN_GAME,
            ClientMessage::LeaveGame { .. } => LEAVE_GAME,
            ClientMessage::Rename { .. } => RENAME,
            ClientMessage::Disconnect => DISCONNECT,
            ClientMessage::SelectCharacter { .. } => SELECT_CHARACTER,
            ClientMessage::RefreshRoster { .. } => REFRESH_ROSTER,
            ClientMessage::StartMatch { .. } => START_MATCH,
        }
    }
}

/// Records sent by the relay to a client.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerMessage {
    /// The opponent's (or, for spectators, either player's) input.
    RemoteInput {
        key: u32,
        pressed: bool,
        player: usize,
    },
    /// Echo of the receiver's own input.
    LocalInput { key: u32, pressed: bool },
    /// Chat line, already prefixed with the sender's name.
    Chat { message: String },
    RoomCreated { room: RoomCode },
    RoomJoined { room: RoomCode, role: Role },
    RoomExited,
    RosterChanged { roster: Roster },
    Renamed,
    Disconnected,
    Connected,
    MatchStarted,
}

impl ServerMessage {
    /// Wire `type` code of this record.
    pub fn kind(&self) -> u64 {
        use server_kind::*;
        match self {
            ServerMessage::RemoteInput { .. } => REMOTE_INPUT,
            ServerMessage::LocalInput { .. } => LOCAL_INPUT,
            ServerMessage::Chat { .. } => CHAT,
            ServerMessage::RoomCreated { .. } => ROOM_CREATED,
            ServerMessage::RoomJoined { .. } => ROOM_JOINED,
            ServerMessage::RoomExited => ROOM_EXITED,
            ServerMessage::RosterChanged { .. } => ROSTER_CHANGED,
            ServerMessage::Renamed => RENAMED,
            ServerMessage::Disconnected => DISCONNECTED,
            ServerMessage::Connected => CONNECTED,
            ServerMessage::MatchStarted => MATCH_STARTED,
        }
    }
}

impl Serialize for ServerMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match self {
            ServerMessage::RemoteInput {
                key,
                pressed,
                player,
            } => {
                map.serialize_entry("key", key)?;
                map.serialize_entry("press", pressed)?;
                map.serialize_entry("player", player)?;
            }
            ServerMessage::LocalInput { key, pressed } => {
                map.serialize_entry("key", key)?;
                map.serialize_entry("press", pressed)?;
            }
            ServerMessage::Chat { message } => {
                map.serialize_entry("message", message)?;
            }
            ServerMessage::RoomCreated { room } => {
                map.serialize_entry("room", room)?;
            }
            ServerMessage::RoomJoined { room, role } => {
                map.serialize_entry("room", room)?;
                map.serialize_entry("player", &role.wire_index())?;
            }
            ServerMessage::RosterChanged { roster } => {
                map.serialize_entry("roleChange", roster)?;
            }
            ServerMessage::RoomExited
            | ServerMessage::Renamed
            | ServerMessage::Disconnected
            | ServerMessage::Connected
            | ServerMessage::MatchStarted => {}
        }
        map.serialize_entry("type", &self.kind())?;
        map.end()
    }
}

/// The player list sent with every roster change.
#[derive(Clone, Debug, PartialEq)]
pub enum Roster {
    /// Current players in slot order.
    Players(Vec<RosterEntry>),
    /// No players are seated. Clients expect a non-empty list, so this goes
    /// out as the fixed placeholder `[0, 1, 2]`.
    Vacant,
}

impl Roster {
    /// The literal sent for `Roster::Vacant`.
    pub const VACANT_PLACEHOLDER: [u8; 3] = [0, 1, 2];

    /// Build a roster from the seated players, substituting the placeholder
    /// when nobody is seated.
    pub fn from_players(players: Vec<RosterEntry>) -> Self {
        if players.is_empty() {
            Roster::Vacant
        } else {
            Roster::Players(players)
        }
    }

    pub fn players(&self) -> &[RosterEntry] {
        match self {
            Roster::Players(players) => players,
            Roster::Vacant => &[],
        }
    }
}

impl Serialize for Roster {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Roster::Players(players) => {
                let mut seq = serializer.serialize_seq(Some(players.len()))?;
                for entry in players {
                    seq.serialize_element(entry)?;
                }
                seq.end()
            }
            Roster::Vacant => Self::VACANT_PLACEHOLDER.serialize(serializer),
        }
    }
}

/// Public view of one seated player.
#[derive(Clone, Debug, PartialEq)]
pub struct RosterEntry {
    pub username: String,
    pub character: Option<Character>,
    /// UDP source port; clients use it to tell the two players apart.
    pub port: u16,
}

/// All three roster fields go out as strings, with an unset character spelled
/// `"null"`.
impl Serialize for RosterEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let character = match self.character {
            Some(c) => c.to_string(),
            None => "null".to_owned(),
        };
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("username", &self.username)?;
        map.serialize_entry("character", &character)?;
        map.serialize_entry("port", &self.port.to_string())?;
        map.end()
    }
}
