// JSON datagram codec.
//
// One record per UDP datagram, no framing: the datagram boundary is the
// message boundary. Decoding is two-staged because the relay must look at the
// client id before it knows whether the declared `type` even matters (an
// unknown id is always treated as a connect, whatever the kind):
//
// 1. `decode_envelope` checks the payload is a JSON object with an `id`, and
//    keeps everything else raw. A connect needs nothing more: a bad `type` or
//    a non-string `username` still registers the client.
// 2. `Envelope::into_message` checks `type` is a non-negative integer,
//    validates the raw fields against the schema for that kind, and produces
//    a typed `ClientMessage`. Unknown kinds yield `Ok(None)` so the caller
//    can ignore them without logging noise.
//
// The reverse direction (`encode_server` / `decode_server`, `encode_client`)
// exists so the relay's own test client can speak the protocol without
// hand-writing JSON.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::message::{ClientMessage, Roster, RosterEntry, ServerMessage, client_kind, server_kind};
use crate::types::{Character, ClientId, Role, RoomCode, deserialize_character_choice};

/// Largest payload that fits in a single IPv4 UDP datagram.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Why a datagram could not be turned into a record.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("datagram too large: {len} bytes")]
    TooLarge { len: usize },
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("invalid fields for record type {kind}: {source}")]
    Schema {
        kind: u64,
        #[source]
        source: serde_json::Error,
    },
}

/// An inbound record whose id is known but whose `type` and body have not
/// been validated yet.
#[derive(Clone, Debug)]
pub struct Envelope {
    pub id: ClientId,
    kind: Option<Value>,
    fields: Map<String, Value>,
}

impl Envelope {
    /// The declared record type.
    pub fn kind(&self) -> Result<u64, CodecError> {
        parse_kind(self.kind.as_ref())
    }

    /// The `username` field, as sent with a connect. Absent or `null` means an
    /// empty name; any other non-string value is used in its JSON text form.
    pub fn username(&self) -> String {
        match self.fields.get("username") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(name)) => name.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Validate the body against the schema for its `type`.
    pub fn into_message(self) -> Result<Option<ClientMessage>, CodecError> {
        let kind = self.kind()?;
        let body = Value::Object(self.fields);
        let schema = |source| CodecError::Schema { kind, source };

        let message = match kind {
            client_kind::INPUT => {
                let f: InputFields = serde_json::from_value(body).map_err(schema)?;
                ClientMessage::Input {
                    room: f.room,
                    key: f.key,
                    pressed: f.press,
                }
            }
            client_kind::CHAT => {
                let f: ChatFields = serde_json::from_value(body).map_err(schema)?;
                ClientMessage::Chat {
                    room: f.room,
                    text: f.message,
                }
            }
            client_kind::CREATE_ROOM => ClientMessage::CreateRoom,
            client_kind::JOIN_ROOM => ClientMessage::JoinRoom {
                room: room_only(body).map_err(schema)?,
            },
            client_kind::EXIT_ROOM => ClientMessage::ExitRoom {
                room: room_only(body).map_err(schema)?,
            },
            client_kind::JOIN_GAME => ClientMessage::JoinGame {
                room: room_only(body).map_err(schema)?,
            },
            client_kind::LEAVE_GAME => ClientMessage::LeaveGame {
                room: room_only(body).map_err(schema)?,
            },
            client_kind::RENAME => {
                let f: RenameFields = serde_json::from_value(body).map_err(schema)?;
                ClientMessage::Rename {
                    username: f.username,
                }
            }
            client_kind::DISCONNECT => ClientMessage::Disconnect,
            client_kind::SELECT_CHARACTER => {
                let f: CharacterFields = serde_json::from_value(body).map_err(schema)?;
                ClientMessage::SelectCharacter {
                    room: f.room,
                    character: f.character,
                }
            }
            client_kind::REFRESH_ROSTER => ClientMessage::RefreshRoster {
                room: room_only(body).map_err(schema)?,
            },
            client_kind::START_MATCH => ClientMessage::StartMatch {
                room: room_only(body).map_err(schema)?,
            },
            _ => return Ok(None),
        };
        Ok(Some(message))
    }
}

#[derive(Deserialize)]
struct InputFields {
    room: RoomCode,
    key: u32,
    press: bool,
}

#[derive(Deserialize)]
struct ChatFields {
    room: RoomCode,
    message: String,
}

#[derive(Deserialize)]
struct RoomFields {
    room: RoomCode,
}

#[derive(Deserialize)]
struct RenameFields {
    username: String,
}

#[derive(Deserialize)]
struct CharacterFields {
    room: RoomCode,
    #[serde(deserialize_with = "deserialize_character_choice")]
    character: Option<Character>,
}

fn room_only(body: Value) -> Result<RoomCode, serde_json::Error> {
    serde_json::from_value::<RoomFields>(body).map(|f| f.room)
}

/// Parse a datagram into an `Envelope`.
pub fn decode_envelope(datagram: &[u8]) -> Result<Envelope, CodecError> {
    let mut fields = parse_object(datagram)?;

    let id = fields.remove("id").ok_or(CodecError::MissingField("id"))?;
    let id: ClientId = serde_json::from_value(id).map_err(|e| CodecError::InvalidField {
        field: "id",
        reason: e.to_string(),
    })?;

    let kind = fields.remove("type");
    Ok(Envelope { id, kind, fields })
}

/// Serialize a relay record into one datagram.
pub fn encode_server(message: &ServerMessage) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(message)?)
}

/// Parse a relay record. Used by clients; the relay never reads these.
pub fn decode_server(datagram: &[u8]) -> Result<ServerMessage, CodecError> {
    let mut fields = parse_object(datagram)?;
    let kind = take_kind(&mut fields)?;
    let body = Value::Object(fields);
    let schema = |source| CodecError::Schema { kind, source };

    #[derive(Deserialize)]
    struct InputBody {
        key: u32,
        press: bool,
        player: Option<usize>,
    }

    #[derive(Deserialize)]
    struct JoinedBody {
        room: RoomCode,
        player: i32,
    }

    #[derive(Deserialize)]
    struct RosterBody {
        #[serde(rename = "roleChange")]
        role_change: Vec<Value>,
    }

    Ok(match kind {
        server_kind::REMOTE_INPUT => {
            let b: InputBody = serde_json::from_value(body).map_err(schema)?;
            ServerMessage::RemoteInput {
                key: b.key,
                pressed: b.press,
                player: b.player.ok_or(CodecError::MissingField("player"))?,
            }
        }
        server_kind::LOCAL_INPUT => {
            let b: InputBody = serde_json::from_value(body).map_err(schema)?;
            ServerMessage::LocalInput {
                key: b.key,
                pressed: b.press,
            }
        }
        server_kind::CHAT => {
            let b: ChatBody = serde_json::from_value(body).map_err(schema)?;
            ServerMessage::Chat { message: b.message }
        }
        server_kind::ROOM_CREATED => ServerMessage::RoomCreated {
            room: room_only(body).map_err(schema)?,
        },
        server_kind::ROOM_JOINED => {
            let b: JoinedBody = serde_json::from_value(body).map_err(schema)?;
            let role = match usize::try_from(b.player) {
                Ok(index) => Role::Player(index),
                Err(_) => Role::Spectator,
            };
            ServerMessage::RoomJoined { room: b.room, role }
        }
        server_kind::ROOM_EXITED => ServerMessage::RoomExited,
        server_kind::ROSTER_CHANGED => {
            let b: RosterBody = serde_json::from_value(body).map_err(schema)?;
            ServerMessage::RosterChanged {
                roster: decode_roster(b.role_change)?,
            }
        }
        server_kind::RENAMED => ServerMessage::Renamed,
        server_kind::DISCONNECTED => ServerMessage::Disconnected,
        server_kind::CONNECTED => ServerMessage::Connected,
        server_kind::MATCH_STARTED => ServerMessage::MatchStarted,
        other => {
            return Err(CodecError::InvalidField {
                field: "type",
                reason: format!("unknown server record type {other}"),
            });
        }
    })
}

#[derive(Deserialize)]
struct ChatBody {
    message: String,
}

/// Serialize a client record. Every record carries the sender's id; the
/// first one a relay sees from an id also carries the `username`.
pub fn encode_client(
    id: &ClientId,
    username: Option<&str>,
    message: &ClientMessage,
) -> Result<Vec<u8>, CodecError> {
    let mut fields = Map::new();
    fields.insert("id".into(), Value::String(id.0.clone()));
    if let Some(name) = username {
        fields.insert("username".into(), Value::String(name.to_owned()));
    }

    match message {
        ClientMessage::Input { room, key, pressed } => {
            fields.insert("room".into(), room.0.into());
            fields.insert("key".into(), (*key).into());
            fields.insert("press".into(), (*pressed).into());
        }
        ClientMessage::Chat { room, text } => {
            fields.insert("room".into(), room.0.into());
            fields.insert("message".into(), text.clone().into());
        }
        ClientMessage::Rename { username } => {
            fields.insert("username".into(), username.clone().into());
        }
        ClientMessage::SelectCharacter { room, character } => {
            fields.insert("room".into(), room.0.into());
            let value = match character {
                Some(c) => c.0.into(),
                None => Value::Bool(false),
            };
            fields.insert("character".into(), value);
        }
        ClientMessage::JoinRoom { room }
        | ClientMessage::ExitRoom { room }
        | ClientMessage::JoinGame { room }
        | ClientMessage::LeaveGame { room }
        | ClientMessage::RefreshRoster { room }
        | ClientMessage::StartMatch { room } => {
            fields.insert("room".into(), room.0.into());
        }
        ClientMessage::CreateRoom | ClientMessage::Disconnect => {}
    }
    fields.insert("type".into(), message.kind().into());

    Ok(serde_json::to_vec(&Value::Object(fields))?)
}

fn parse_object(datagram: &[u8]) -> Result<Map<String, Value>, CodecError> {
    if datagram.len() > MAX_DATAGRAM_SIZE {
        return Err(CodecError::TooLarge {
            len: datagram.len(),
        });
    }
    match serde_json::from_slice(datagram)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(CodecError::NotAnObject),
    }
}

fn take_kind(fields: &mut Map<String, Value>) -> Result<u64, CodecError> {
    parse_kind(fields.remove("type").as_ref())
}

fn parse_kind(kind: Option<&Value>) -> Result<u64, CodecError> {
    let kind = kind.ok_or(CodecError::MissingField("type"))?;
    kind.as_u64().ok_or_else(|| CodecError::InvalidField {
        field: "type",
        reason: format!("expected a non-negative integer, got {kind}"),
    })
}

fn decode_roster(items: Vec<Value>) -> Result<Roster, CodecError> {
    if items.iter().all(Value::is_number) {
        return Ok(Roster::Vacant);
    }

    #[derive(Deserialize)]
    struct EntryBody {
        username: String,
        character: String,
        port: String,
    }

    let invalid = |reason: String| CodecError::InvalidField {
        field: "roleChange",
        reason,
    };

    let mut players = Vec::with_capacity(items.len());
    for item in items {
        let body: EntryBody = serde_json::from_value(item).map_err(|e| invalid(e.to_string()))?;
        let character = match body.character.as_str() {
            "null" => None,
            digits => Some(Character(
                digits
                    .parse()
                    .map_err(|_| invalid(format!("bad character {digits:?}")))?,
            )),
        };
        let port = body
            .port
            .parse()
            .map_err(|_| invalid(format!("bad port {:?}", body.port)))?;
        players.push(RosterEntry {
            username: body.username,
            character,
            port,
        });
    }
    Ok(Roster::Players(players))
}
