// Per-datagram entry point.
//
// `Dispatcher` owns both registries and is driven by the server loop, one
// datagram at a time, to completion. Nothing here blocks or suspends, so the
// loop gets linearizable room/session updates without any locking.
//
// Flow for one datagram:
// 1. Decode the envelope (an object with an `id`). Anything less is logged
//    and dropped.
// 2. Unknown id: register a session and ack with `Connected`, whatever the
//    declared type was, even a missing or non-numeric one. Game clients rely
//    on this to connect. A non-string `username` is kept in its JSON text
//    form.
// 3. Known id: validate the body for its type and route it. Unknown types are
//    ignored.
// 4. Handler errors (`RelayError`) are logged at debug and dropped; the
//    client never hears about them.
//
// Direct acks (created, joined, exited, renamed, disconnected, connected) go
// to the datagram's source address. Room broadcasts go to each occupant's
// stored session address.
//
// Room membership lives in two places, the room's lists and the session's
// `room` field; every path that changes one changes the other here.

use std::net::SocketAddr;

use duel_lobby_protocol::{
    ClientId, ClientMessage, Role, RoomCode, ServerMessage, decode_envelope,
};
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};
use crate::outbox::Outbox;
use crate::relay;
use crate::roles;
use crate::room::{ExitOutcome, RoomRegistry};
use crate::session::SessionRegistry;

pub struct Dispatcher {
    sessions: SessionRegistry,
    rooms: RoomRegistry,
}

impl Dispatcher {
    pub fn new(rooms: RoomRegistry) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            rooms,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Handle one inbound datagram from `from`. Never fails: anything that
    /// cannot be handled is logged and dropped.
    pub fn handle_datagram(&mut self, from: SocketAddr, datagram: &[u8], out: &mut dyn Outbox) {
        let envelope = match decode_envelope(datagram) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(%from, error = %e, "dropping malformed datagram");
                return;
            }
        };

        if !self.sessions.contains(&envelope.id) {
            let username = envelope.username();
            self.connect(envelope.id, from, username, out);
            return;
        }

        let id = envelope.id.clone();
        let kind = envelope.kind().ok();
        let message = match envelope.into_message() {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!(client = %id, ?kind, "ignoring unknown record type");
                return;
            }
            Err(e) => {
                warn!(%from, client = %id, error = %e, "dropping invalid record");
                return;
            }
        };

        if let Err(e) = self.handle_message(&id, from, message, out) {
            debug!(client = %id, ?kind, error = %e, "record dropped");
        }
    }

    /// Route a validated record from a connected client.
    pub fn handle_message(
        &mut self,
        id: &ClientId,
        from: SocketAddr,
        message: ClientMessage,
        out: &mut dyn Outbox,
    ) -> Result<()> {
        // Every path below assumes the session exists.
        self.sessions.require(id)?;

        match message {
            ClientMessage::Input { room, key, pressed } => {
                relay::input(&self.rooms, &self.sessions, room, id, key, pressed, out)
            }
            ClientMessage::Chat { room, text } => {
                relay::chat(&self.rooms, &self.sessions, room, id, &text, out)
            }
            ClientMessage::CreateRoom => {
                let code = self.create_room(id, out)?;
                out.send(from, ServerMessage::RoomCreated { room: code });
                Ok(())
            }
            ClientMessage::JoinRoom { room } => {
                let role = self.join_room(room, id, out)?;
                out.send(from, ServerMessage::RoomJoined { room, role });
                Ok(())
            }
            ClientMessage::ExitRoom { room } => {
                self.exit_room(room, id, out)?;
                out.send(from, ServerMessage::RoomExited);
                Ok(())
            }
            ClientMessage::JoinGame { room } => {
                roles::promote_to_player(&mut self.rooms, &self.sessions, room, id, out)
                    .map(|_| ())
            }
            ClientMessage::LeaveGame { room } => {
                roles::demote_to_spectator(&mut self.rooms, &self.sessions, room, id, out)
            }
            ClientMessage::Rename { username } => {
                self.sessions.rename(id, username)?;
                out.send(from, ServerMessage::Renamed);
                Ok(())
            }
            ClientMessage::Disconnect => {
                self.disconnect(id, out)?;
                out.send(from, ServerMessage::Disconnected);
                Ok(())
            }
            ClientMessage::SelectCharacter { room, character } => roles::select_character(
                &self.rooms,
                &mut self.sessions,
                room,
                id,
                character,
                out,
            ),
            ClientMessage::RefreshRoster { room } => {
                relay::broadcast_roster(&self.rooms, &self.sessions, room, out)
            }
            ClientMessage::StartMatch { room } => {
                relay::announce_match_start(&self.rooms, &self.sessions, room, out)
            }
        }
    }

    /// Register a session for an id the relay has not seen, then ack.
    fn connect(&mut self, id: ClientId, from: SocketAddr, username: String, out: &mut dyn Outbox) {
        info!(client = %id, %from, %username, "client connected");
        self.sessions.connect(id, from, username);
        out.send(from, ServerMessage::Connected);
    }

    /// Open a room owned by `id`, leaving any room it is already in.
    fn create_room(&mut self, id: &ClientId, out: &mut dyn Outbox) -> Result<RoomCode> {
        self.release_room(id, out);
        let code = self.rooms.create(id.clone())?;
        self.sessions.set_room(id, Some(code))?;
        info!(client = %id, room = %code, "room created");
        Ok(code)
    }

    /// Put `id` into room `code`. Moving from another room exits that room
    /// first; asking for the room it is already in just reports its role.
    fn join_room(
        &mut self,
        code: RoomCode,
        id: &ClientId,
        out: &mut dyn Outbox,
    ) -> Result<Role> {
        if !self.rooms.contains(code) {
            return Err(RelayError::UnknownRoom(code));
        }
        if self.sessions.room_of(id).is_some_and(|current| current != code) {
            self.release_room(id, out);
        }
        let role = self.rooms.join(code, id.clone())?;
        self.sessions.set_room(id, Some(code))?;
        debug!(client = %id, room = %code, ?role, "joined room");
        Ok(role)
    }

    /// Take `id` out of room `code`. A departing player triggers a roster
    /// update for whoever is left.
    fn exit_room(&mut self, code: RoomCode, id: &ClientId, out: &mut dyn Outbox) -> Result<()> {
        let outcome = self.rooms.exit(code, id)?;
        if self.sessions.room_of(id) == Some(code) {
            self.sessions.set_room(id, None)?;
        }
        match outcome {
            ExitOutcome::Destroyed => info!(room = %code, "room closed"),
            ExitOutcome::LeftAsPlayer => {
                relay::broadcast_roster(&self.rooms, &self.sessions, code, out)?;
            }
            ExitOutcome::LeftAsSpectator => {}
        }
        Ok(())
    }

    /// Leave whatever room `id` currently occupies, if any.
    fn release_room(&mut self, id: &ClientId, out: &mut dyn Outbox) {
        if let Some(code) = self.sessions.room_of(id) {
            if let Err(e) = self.exit_room(code, id, out) {
                debug!(client = %id, room = %code, error = %e, "stale room membership");
                self.sessions.set_room(id, None).ok();
            }
        }
    }

    /// Leave the current room, then forget the session.
    fn disconnect(&mut self, id: &ClientId, out: &mut dyn Outbox) -> Result<()> {
        self.release_room(id, out);
        self.sessions.remove(id)?;
        info!(client = %id, "client disconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use duel_lobby_protocol::{Character, Roster, RosterEntry, encode_client};

    use super::*;
    use crate::outbox::Delivery;
    use crate::room::DEFAULT_MAX_CODE_ATTEMPTS;
    use crate::room_code::CodeGenerator;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(RoomRegistry::new(
            CodeGenerator::new(2024),
            DEFAULT_MAX_CODE_ATTEMPTS,
        ))
    }

    /// Drives a dispatcher the way the server loop does and keeps what it
    /// sent. Client `uN` always sends from port 6000 + N.
    struct Harness {
        dispatcher: Dispatcher,
        out: Vec<Delivery>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                dispatcher: dispatcher(),
                out: Vec::new(),
            }
        }

        fn port(id: &str) -> u16 {
            6000 + id.trim_start_matches('u').parse::<u16>().unwrap()
        }

        fn raw(&mut self, id: &str, datagram: &[u8]) -> Vec<Delivery> {
            self.dispatcher
                .handle_datagram(addr(Self::port(id)), datagram, &mut self.out);
            std::mem::take(&mut self.out)
        }

        fn send(&mut self, id: &str, message: ClientMessage) -> Vec<Delivery> {
            let bytes = encode_client(&ClientId::from(id), None, &message).unwrap();
            self.raw(id, &bytes)
        }

        fn connect(&mut self, id: &str) {
            let bytes = encode_client(&ClientId::from(id), Some(id), &ClientMessage::CreateRoom)
                .unwrap();
            let sent = self.raw(id, &bytes);
            assert_eq!(
                sent,
                vec![Delivery {
                    to: addr(Self::port(id)),
                    message: ServerMessage::Connected,
                }]
            );
        }

        fn create(&mut self, id: &str) -> RoomCode {
            let sent = self.send(id, ClientMessage::CreateRoom);
            match sent.as_slice() {
                [Delivery {
                    message: ServerMessage::RoomCreated { room },
                    ..
                }] => *room,
                other => panic!("expected RoomCreated, got {other:?}"),
            }
        }

        fn join(&mut self, id: &str, room: RoomCode) -> Role {
            let sent = self.send(id, ClientMessage::JoinRoom { room });
            match sent.as_slice() {
                [Delivery {
                    message: ServerMessage::RoomJoined { role, .. },
                    ..
                }] => *role,
                other => panic!("expected RoomJoined, got {other:?}"),
            }
        }
    }

    /// A valid code that is not `code`.
    fn unused_code(code: RoomCode) -> RoomCode {
        if code.0 == RoomCode::MIN {
            RoomCode(RoomCode::MAX)
        } else {
            RoomCode(RoomCode::MIN)
        }
    }

    fn ports(sent: &[Delivery]) -> Vec<u16> {
        sent.iter().map(|d| d.to.port()).collect()
    }

    #[test]
    fn unknown_id_connects_regardless_of_type() {
        let mut h = Harness::new();
        h.connect("u1");
        let s = h.dispatcher.sessions().get(&"u1".into()).unwrap();
        assert_eq!(s.username, "u1");
        assert_eq!(s.port(), 6001);
        // The create-room record was consumed as a connect.
        assert!(h.dispatcher.rooms().is_empty());
    }

    #[test]
    fn connect_without_username_gets_empty_name() {
        let mut h = Harness::new();
        let sent = h.raw("u1", br#"{"id":"u1","type":3,"room":0}"#);
        assert_eq!(sent.len(), 1);
        assert_eq!(
            h.dispatcher.sessions().get(&"u1".into()).unwrap().username,
            ""
        );
    }

    #[test]
    fn connect_tolerates_odd_type_and_username() {
        let mut h = Harness::new();
        let sent = h.raw("u1", br#"{"id":"u1","type":"2"}"#);
        assert_eq!(ports(&sent), vec![6001]);
        assert_eq!(sent[0].message, ServerMessage::Connected);

        let sent = h.raw("u2", br#"{"id":"u2","type":2,"username":7}"#);
        assert_eq!(sent[0].message, ServerMessage::Connected);
        assert_eq!(h.dispatcher.sessions().get(&"u2".into()).unwrap().username, "7");

        let sent = h.raw("u3", br#"{"id":"u3"}"#);
        assert_eq!(sent[0].message, ServerMessage::Connected);
        assert_eq!(h.dispatcher.sessions().len(), 3);

        // Once connected, a bad type is an invalid record and is dropped.
        assert!(h.raw("u1", br#"{"id":"u1","type":"2"}"#).is_empty());
        assert!(h.dispatcher.rooms().is_empty());
    }

    #[test]
    fn malformed_datagrams_are_dropped() {
        let mut h = Harness::new();
        assert!(h.raw("u1", b"not json at all").is_empty());
        assert!(h.raw("u1", br#"{"type":2}"#).is_empty());
        assert!(h.dispatcher.sessions().is_empty());

        h.connect("u1");
        let code = h.create("u1");
        // Input missing `press`.
        let sent = h.raw(
            "u1",
            format!(r#"{{"id":"u1","type":0,"room":{},"key":1}}"#, code.0).as_bytes(),
        );
        assert!(sent.is_empty());
        // Unknown type from a connected client.
        assert!(h.raw("u1", br#"{"id":"u1","type":99}"#).is_empty());
    }

    #[test]
    fn full_lobby_scenario() {
        let mut h = Harness::new();
        for id in ["u1", "u2", "u3"] {
            h.connect(id);
        }

        let c1 = h.create("u1");
        assert!(c1.is_valid());
        assert_eq!(h.join("u2", c1), Role::Player(1));
        assert_eq!(h.join("u3", c1), Role::Spectator);

        let sent = h.send(
            "u2",
            ClientMessage::Chat {
                room: c1,
                text: "hi".into(),
            },
        );
        assert_eq!(ports(&sent), vec![6001, 6002, 6003]);
        assert!(sent.iter().all(|d| d.message
            == ServerMessage::Chat {
                message: "u2: hi".into()
            }));

        // u1 leaves: u2 and u3 get a roster listing only u2, u1 gets the ack.
        let sent = h.send("u1", ClientMessage::ExitRoom { room: c1 });
        let expected_roster = ServerMessage::RosterChanged {
            roster: Roster::Players(vec![RosterEntry {
                username: "u2".into(),
                character: None,
                port: 6002,
            }]),
        };
        assert_eq!(
            sent,
            vec![
                Delivery {
                    to: addr(6002),
                    message: expected_roster.clone(),
                },
                Delivery {
                    to: addr(6003),
                    message: expected_roster,
                },
                Delivery {
                    to: addr(6001),
                    message: ServerMessage::RoomExited,
                },
            ]
        );
        assert_eq!(h.dispatcher.sessions().room_of(&"u1".into()), None);

        // u2 leaves as a player: u3 is told the room has no players.
        let sent = h.send("u2", ClientMessage::ExitRoom { room: c1 });
        assert_eq!(
            sent[0],
            Delivery {
                to: addr(6003),
                message: ServerMessage::RosterChanged {
                    roster: Roster::Vacant
                },
            }
        );

        let sent = h.send("u3", ClientMessage::ExitRoom { room: c1 });
        assert_eq!(ports(&sent), vec![6003]);
        assert!(!h.dispatcher.rooms().contains(c1));

        // The code is gone for good.
        h.connect("u4");
        assert!(h.send("u4", ClientMessage::JoinRoom { room: c1 }).is_empty());
    }

    #[test]
    fn exit_with_sentinel_room_is_silent() {
        let mut h = Harness::new();
        h.connect("u1");
        assert!(
            h.send(
                "u1",
                ClientMessage::ExitRoom {
                    room: RoomCode::NONE
                }
            )
            .is_empty()
        );
    }

    #[test]
    fn disconnect_of_sole_occupant_closes_room() {
        let mut h = Harness::new();
        h.connect("u1");
        let code = h.create("u1");
        let sent = h.send("u1", ClientMessage::Disconnect);
        assert_eq!(
            sent,
            vec![Delivery {
                to: addr(6001),
                message: ServerMessage::Disconnected,
            }]
        );
        assert!(!h.dispatcher.rooms().contains(code));
        assert!(!h.dispatcher.sessions().contains(&"u1".into()));
    }

    #[test]
    fn disconnect_of_player_updates_roster() {
        let mut h = Harness::new();
        h.connect("u1");
        h.connect("u2");
        let code = h.create("u1");
        h.join("u2", code);

        let sent = h.send("u2", ClientMessage::Disconnect);
        assert_eq!(ports(&sent), vec![6001, 6002]);
        assert!(matches!(
            sent[0].message,
            ServerMessage::RosterChanged { .. }
        ));
        assert_eq!(sent[1].message, ServerMessage::Disconnected);
        let room = h.dispatcher.rooms().get(code).unwrap();
        assert_eq!(room.players(), &[ClientId::from("u1")]);
    }

    #[test]
    fn known_id_is_never_reconnected() {
        let mut h = Harness::new();
        h.connect("u1");
        let code = h.create("u1");

        // A record carrying a username from a live id is routed by its type,
        // not treated as a fresh connect, so the membership survives.
        let bytes = encode_client(
            &"u1".into(),
            Some("again"),
            &ClientMessage::RefreshRoster { room: code },
        )
        .unwrap();
        let sent = h.raw("u1", &bytes);
        assert!(matches!(
            sent.as_slice(),
            [Delivery {
                message: ServerMessage::RosterChanged { .. },
                ..
            }]
        ));
        let s = h.dispatcher.sessions().get(&"u1".into()).unwrap();
        assert_eq!(s.username, "u1");
        assert_eq!(s.room, Some(code));
    }

    #[test]
    fn switching_rooms_leaves_the_old_one() {
        let mut h = Harness::new();
        h.connect("u1");
        h.connect("u2");
        let a = h.create("u1");
        let b = h.create("u2");

        assert_eq!(h.join("u1", b), Role::Player(1));
        assert!(!h.dispatcher.rooms().contains(a));
        assert_eq!(h.dispatcher.sessions().room_of(&"u1".into()), Some(b));

        // Creating while seated also leaves first: u2 hears that u1 left,
        // then u1 gets the new code.
        let sent = h.send("u1", ClientMessage::CreateRoom);
        assert_eq!(ports(&sent), vec![6002, 6001]);
        let ServerMessage::RoomCreated { room: c } = &sent[1].message else {
            panic!("expected RoomCreated, got {:?}", sent[1].message);
        };
        assert_ne!(b, *c);
        let room_b = h.dispatcher.rooms().get(b).unwrap();
        assert_eq!(room_b.players(), &[ClientId::from("u2")]);
    }

    #[test]
    fn join_unknown_room_keeps_current_room() {
        let mut h = Harness::new();
        h.connect("u1");
        let code = h.create("u1");
        let elsewhere = unused_code(code);
        assert!(h.send("u1", ClientMessage::JoinRoom { room: elsewhere }).is_empty());
        assert_eq!(h.dispatcher.sessions().room_of(&"u1".into()), Some(code));
    }

    #[test]
    fn input_routes_through_dispatcher() {
        let mut h = Harness::new();
        for id in ["u1", "u2", "u3"] {
            h.connect(id);
        }
        let code = h.create("u1");

        // Alone in the room: no opponent, nothing sent.
        let lonely = h.send(
            "u1",
            ClientMessage::Input {
                room: code,
                key: 5,
                pressed: true,
            },
        );
        assert!(lonely.is_empty());

        h.join("u2", code);
        h.join("u3", code);
        let sent = h.send(
            "u1",
            ClientMessage::Input {
                room: code,
                key: 5,
                pressed: true,
            },
        );
        assert_eq!(ports(&sent), vec![6001, 6002, 6003]);
        assert_eq!(
            sent[0].message,
            ServerMessage::LocalInput {
                key: 5,
                pressed: true
            }
        );
        for d in &sent[1..] {
            assert_eq!(
                d.message,
                ServerMessage::RemoteInput {
                    key: 5,
                    pressed: true,
                    player: 0
                }
            );
        }
    }

    #[test]
    fn rename_and_character_show_up_in_roster() {
        let mut h = Harness::new();
        h.connect("u1");
        let code = h.create("u1");

        let sent = h.send(
            "u1",
            ClientMessage::Rename {
                username: "Blanka".into(),
            },
        );
        assert_eq!(sent[0].message, ServerMessage::Renamed);

        let sent = h.send(
            "u1",
            ClientMessage::SelectCharacter {
                room: code,
                character: Some(Character(8)),
            },
        );
        assert_eq!(
            sent,
            vec![Delivery {
                to: addr(6001),
                message: ServerMessage::RosterChanged {
                    roster: Roster::Players(vec![RosterEntry {
                        username: "Blanka".into(),
                        character: Some(Character(8)),
                        port: 6001,
                    }]),
                },
            }]
        );
    }

    #[test]
    fn join_and_leave_game_round_trip() {
        let mut h = Harness::new();
        for id in ["u1", "u2", "u3"] {
            h.connect(id);
        }
        let code = h.create("u1");
        h.join("u2", code);
        h.join("u3", code);

        // Full: promotion is silently refused.
        assert!(h.send("u3", ClientMessage::JoinGame { room: code }).is_empty());

        let sent = h.send("u1", ClientMessage::LeaveGame { room: code });
        assert_eq!(sent.len(), 3);
        let sent = h.send("u3", ClientMessage::JoinGame { room: code });
        assert_eq!(sent.len(), 3);

        let room = h.dispatcher.rooms().get(code).unwrap();
        assert_eq!(room.players(), &[ClientId::from("u2"), ClientId::from("u3")]);
        assert_eq!(room.role_of(&"u1".into()), Some(Role::Spectator));
    }

    #[test]
    fn refresh_and_match_start_broadcast() {
        let mut h = Harness::new();
        h.connect("u1");
        h.connect("u2");
        let code = h.create("u1");
        h.join("u2", code);

        let sent = h.send("u2", ClientMessage::RefreshRoster { room: code });
        assert_eq!(ports(&sent), vec![6001, 6002]);

        let sent = h.send("u1", ClientMessage::StartMatch { room: code });
        assert_eq!(ports(&sent), vec![6001, 6002]);
        assert!(sent.iter().all(|d| d.message == ServerMessage::MatchStarted));

        let elsewhere = unused_code(code);
        assert!(h.send("u1", ClientMessage::StartMatch { room: elsewhere }).is_empty());
    }

    #[test]
    fn handle_message_rejects_unknown_session() {
        let mut d = dispatcher();
        let mut out: Vec<Delivery> = Vec::new();
        assert_eq!(
            d.handle_message(&"ghost".into(), addr(1), ClientMessage::Disconnect, &mut out),
            Err(RelayError::UnknownSession("ghost".into()))
        );
        assert!(out.is_empty());
    }
}
