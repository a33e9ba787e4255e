// Core identifier and value types for the lobby protocol.
//
// These are lightweight newtypes shared by `message.rs` (wire records) and the
// relay's registries (`duel_lobby_relay::session`, `duel_lobby_relay::room`).
// Deployed game clients speak loosely typed JSON, so the deserializers
// here accept the handful of shapes those clients actually send (numbers or
// numeric strings for room codes, `false` for "no character") and reject
// everything else. Outbound serialization always uses one canonical shape.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of player slots in a room. Everyone beyond this is a spectator.
pub const PLAYER_SLOTS: usize = 2;

/// Opaque client identifier chosen by the peer.
///
/// Stable for the lifetime of a connection. The relay never validates it for
/// uniqueness; a second connect with the same id replaces the first.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl Serialize for ClientId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ClientId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Signed(n) => Self(n.to_string()),
            Raw::Unsigned(n) => Self(n.to_string()),
        })
    }
}

/// Six-digit room code. `RoomCode::NONE` (0) is the "not in a room" sentinel
/// clients send before they have joined anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomCode(pub u32);

impl RoomCode {
    pub const NONE: RoomCode = RoomCode(0);
    /// Smallest valid code (inclusive).
    pub const MIN: u32 = 100_000;
    /// Largest valid code (inclusive).
    pub const MAX: u32 = 999_999;

    /// True if this is a six-digit code a room could be registered under.
    pub fn is_valid(self) -> bool {
        (Self::MIN..=Self::MAX).contains(&self.0)
    }

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

impl Serialize for RoomCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> Deserialize<'de> for RoomCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self(n)),
            Raw::Text(s) => s
                .trim()
                .parse()
                .map(Self)
                .map_err(|_| serde::de::Error::custom(format!("invalid room code {s:?}"))),
        }
    }
}

/// Selected fighter, as an index into the client's character table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Character(pub u32);

impl fmt::Display for Character {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deserialize a character selection: a non-negative integer or numeric string
/// selects, `false` or `null` clears.
pub fn deserialize_character_choice<'de, D>(deserializer: D) -> Result<Option<Character>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Flag(bool),
        Text(String),
        Nothing(()),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(Some(Character(n))),
        Raw::Flag(false) | Raw::Nothing(()) => Ok(None),
        Raw::Flag(true) => Err(serde::de::Error::custom(
            "character must be a number or false",
        )),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map(|n| Some(Character(n)))
            .map_err(|_| serde::de::Error::custom(format!("invalid character {s:?}"))),
    }
}

/// Where a session sits inside its room.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Player slot 0 or 1.
    Player(usize),
    Spectator,
}

impl Role {
    /// Wire form of the role: the player index, or -1 for spectators.
    pub fn wire_index(self) -> i32 {
        match self {
            Role::Player(index) => i32::try_from(index).unwrap_or(i32::MAX),
            Role::Spectator => -1,
        }
    }

    pub fn is_player(self) -> bool {
        matches!(self, Role::Player(_))
    }
}
