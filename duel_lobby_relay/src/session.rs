// Session registry: who is connected, where to reach them, what they picked.
//
// A `Session` is created by the first datagram from an unseen client id and
// lives until that id sends a disconnect. There is no liveness tracking, so a
// peer that vanishes without saying goodbye stays registered forever.
//
// Each session also records the room it currently occupies (`room`). Rooms
// only store client ids, so this reverse index is what lets a disconnect,
// or a create/join from a client seated elsewhere, find the membership it
// has to clean up without scanning every room. Keeping the two sides in step is the dispatcher's job; see
// `dispatch.rs`.

use std::net::SocketAddr;

use duel_lobby_protocol::{Character, ClientId, RoomCode};
use rustc_hash::FxHashMap;

use crate::error::{RelayError, Result};

/// Connection metadata for one client id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// Datagram source at connect time. All broadcasts go here.
    pub addr: SocketAddr,
    pub username: String,
    pub character: Option<Character>,
    /// Room this session occupies, if any.
    pub room: Option<RoomCode>,
}

impl Session {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: FxHashMap<ClientId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id`, replacing any existing session under the same id.
    /// Returns the replaced session, if any.
    pub fn connect(&mut self, id: ClientId, addr: SocketAddr, username: String) -> Option<Session> {
        self.sessions.insert(
            id,
            Session {
                addr,
                username,
                character: None,
                room: None,
            },
        )
    }

    pub fn rename(&mut self, id: &ClientId, username: String) -> Result<()> {
        self.get_mut(id)?.username = username;
        Ok(())
    }

    pub fn set_character(&mut self, id: &ClientId, character: Option<Character>) -> Result<()> {
        self.get_mut(id)?.character = character;
        Ok(())
    }

    /// Record which room `id` now occupies (`None` after leaving).
    pub fn set_room(&mut self, id: &ClientId, room: Option<RoomCode>) -> Result<()> {
        self.get_mut(id)?.room = room;
        Ok(())
    }

    /// Drop the session. Room membership must already have been released.
    pub fn remove(&mut self, id: &ClientId) -> Result<Session> {
        self.sessions
            .remove(id)
            .ok_or_else(|| RelayError::UnknownSession(id.clone()))
    }

    pub fn get(&self, id: &ClientId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Like `get`, but an absent id is an `UnknownSession` error.
    pub fn require(&self, id: &ClientId) -> Result<&Session> {
        self.get(id)
            .ok_or_else(|| RelayError::UnknownSession(id.clone()))
    }

    fn get_mut(&mut self, id: &ClientId) -> Result<&mut Session> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| RelayError::UnknownSession(id.clone()))
    }

    pub fn contains(&self, id: &ClientId) -> bool {
        self.sessions.contains_key(id)
    }

    /// The room `id` occupies, if it is connected and seated anywhere.
    pub fn room_of(&self, id: &ClientId) -> Option<RoomCode> {
        self.get(id).and_then(|s| s.room)
    }

    /// Broadcast address for `id`.
    pub fn addr_of(&self, id: &ClientId) -> Option<SocketAddr> {
        self.get(id).map(|s| s.addr)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn connect_starts_without_character_or_room() {
        let mut reg = SessionRegistry::new();
        let replaced = reg.connect("u1".into(), addr(4000), "Ryu".into());
        assert!(replaced.is_none());

        let s = reg.get(&"u1".into()).unwrap();
        assert_eq!(s.username, "Ryu");
        assert_eq!(s.port(), 4000);
        assert_eq!(s.character, None);
        assert_eq!(s.room, None);
    }

    #[test]
    fn reconnect_replaces_and_returns_old_session() {
        let mut reg = SessionRegistry::new();
        reg.connect("u1".into(), addr(4000), "Ryu".into());
        reg.set_room(&"u1".into(), Some(RoomCode(123_456))).unwrap();
        reg.set_character(&"u1".into(), Some(Character(2))).unwrap();

        let old = reg
            .connect("u1".into(), addr(4001), "Ryu2".into())
            .unwrap();
        assert_eq!(old.room, Some(RoomCode(123_456)));
        assert_eq!(old.port(), 4000);

        let s = reg.get(&"u1".into()).unwrap();
        assert_eq!(s.port(), 4001);
        assert_eq!(s.character, None);
        assert_eq!(s.room, None);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn rename_unknown_session_fails() {
        let mut reg = SessionRegistry::new();
        assert_eq!(
            reg.rename(&"ghost".into(), "Boo".into()),
            Err(RelayError::UnknownSession("ghost".into()))
        );
    }

    #[test]
    fn rename_and_character_update_in_place() {
        let mut reg = SessionRegistry::new();
        reg.connect("u1".into(), addr(4000), "Ryu".into());
        reg.rename(&"u1".into(), "Ken".into()).unwrap();
        reg.set_character(&"u1".into(), Some(Character(5))).unwrap();
        let s = reg.get(&"u1".into()).unwrap();
        assert_eq!(s.username, "Ken");
        assert_eq!(s.character, Some(Character(5)));

        reg.set_character(&"u1".into(), None).unwrap();
        assert_eq!(reg.get(&"u1".into()).unwrap().character, None);
    }

    #[test]
    fn remove_forgets_session() {
        let mut reg = SessionRegistry::new();
        reg.connect("u1".into(), addr(4000), "Ryu".into());
        assert!(reg.remove(&"u1".into()).is_ok());
        assert!(!reg.contains(&"u1".into()));
        assert!(reg.is_empty());
        assert!(matches!(
            reg.remove(&"u1".into()),
            Err(RelayError::UnknownSession(_))
        ));
    }
}
