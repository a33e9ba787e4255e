// Forwarding: chat, gameplay input, roster updates, match start.
//
// These functions read room membership and session metadata and push records
// into an `Outbox`; none of them mutate lobby state. Every room-wide send
// goes to players in slot order first, then spectators, which keeps the
// delivery order reproducible for tests.

use duel_lobby_protocol::{ClientId, Role, RoomCode, Roster, RosterEntry, ServerMessage};
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::outbox::Outbox;
use crate::room::{Room, RoomRegistry};
use crate::session::SessionRegistry;

/// Send `message` to every occupant of `room`.
fn send_to_room(
    room: &Room,
    sessions: &SessionRegistry,
    message: &ServerMessage,
    out: &mut dyn Outbox,
) {
    for id in room.occupants() {
        match sessions.addr_of(id) {
            Some(addr) => out.send(addr, message.clone()),
            None => debug!(client = %id, "room member has no session, skipping"),
        }
    }
}

/// Relay a chat line as `"<username>: <text>"` to everyone in the room,
/// sender included.
pub fn chat(
    rooms: &RoomRegistry,
    sessions: &SessionRegistry,
    code: RoomCode,
    sender: &ClientId,
    text: &str,
    out: &mut dyn Outbox,
) -> Result<()> {
    let session = sessions.require(sender)?;
    let room = rooms.require(code)?;
    let message = ServerMessage::Chat {
        message: format!("{}: {}", session.username, text),
    };
    send_to_room(room, sessions, &message, out);
    Ok(())
}

/// Relay one input event from a seated player.
///
/// The sender gets a local echo without a player index; the opponent and all
/// spectators get the event tagged with the sender's slot. Requires both
/// slots to be filled.
pub fn input(
    rooms: &RoomRegistry,
    sessions: &SessionRegistry,
    code: RoomCode,
    sender: &ClientId,
    key: u32,
    pressed: bool,
    out: &mut dyn Outbox,
) -> Result<()> {
    let room = rooms.require(code)?;
    let Some(Role::Player(index)) = room.role_of(sender) else {
        return Err(RelayError::NotAPlayer {
            room: code,
            client: sender.clone(),
        });
    };
    let opponent = room
        .opponent_of(index)
        .ok_or(RelayError::OpponentMissing(code))?;

    let sender_addr = sessions.require(sender)?.addr;
    let opponent_addr = sessions.require(opponent)?.addr;

    out.send(sender_addr, ServerMessage::LocalInput { key, pressed });
    let remote = ServerMessage::RemoteInput {
        key,
        pressed,
        player: index,
    };
    out.send(opponent_addr, remote.clone());
    for spectator in room.spectators() {
        if let Some(addr) = sessions.addr_of(spectator) {
            out.send(addr, remote.clone());
        }
    }
    Ok(())
}

/// The current player list for `room`, in slot order.
pub fn roster_of(room: &Room, sessions: &SessionRegistry) -> Roster {
    let players = room
        .players()
        .iter()
        .filter_map(|id| sessions.get(id))
        .map(|s| RosterEntry {
            username: s.username.clone(),
            character: s.character,
            port: s.port(),
        })
        .collect();
    Roster::from_players(players)
}

/// Send the current roster to every occupant. With no players seated the
/// roster goes out as the `[0, 1, 2]` placeholder.
pub fn broadcast_roster(
    rooms: &RoomRegistry,
    sessions: &SessionRegistry,
    code: RoomCode,
    out: &mut dyn Outbox,
) -> Result<()> {
    let room = rooms.require(code)?;
    let message = ServerMessage::RosterChanged {
        roster: roster_of(room, sessions),
    };
    send_to_room(room, sessions, &message, out);
    Ok(())
}

/// Tell everyone in the room the match has begun.
pub fn announce_match_start(
    rooms: &RoomRegistry,
    sessions: &SessionRegistry,
    code: RoomCode,
    out: &mut dyn Outbox,
) -> Result<()> {
    let room = rooms.require(code)?;
    send_to_room(room, sessions, &ServerMessage::MatchStarted, out);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use duel_lobby_protocol::Character;

    use super::*;
    use crate::outbox::Delivery;
    use crate::room::DEFAULT_MAX_CODE_ATTEMPTS;
    use crate::room_code::CodeGenerator;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    /// The first id creates the room and the rest join in order. The id at
    /// position N listens on port 4000 + N and is named `nameN`.
    fn setup(ids: &[&str]) -> (RoomRegistry, SessionRegistry, RoomCode) {
        let mut sessions = SessionRegistry::new();
        let mut rooms = RoomRegistry::new(CodeGenerator::new(5), DEFAULT_MAX_CODE_ATTEMPTS);
        for (n, id) in ids.iter().enumerate() {
            let n = u16::try_from(n).unwrap();
            sessions.connect((*id).into(), addr(4000 + n), format!("name{n}"));
        }
        let code = rooms.create(ids[0].into()).unwrap();
        for id in &ids[1..] {
            rooms.join(code, (*id).into()).unwrap();
        }
        (rooms, sessions, code)
    }

    fn recipients(out: &[Delivery]) -> Vec<u16> {
        out.iter().map(|d| d.to.port()).collect()
    }

    #[test]
    fn chat_reaches_everyone_including_sender() {
        let (rooms, sessions, code) = setup(&["u1", "u2", "u3"]);
        let mut out: Vec<Delivery> = Vec::new();
        chat(&rooms, &sessions, code, &"u2".into(), "hi", &mut out).unwrap();

        assert_eq!(recipients(&out), vec![4000, 4001, 4002]);
        for d in &out {
            assert_eq!(
                d.message,
                ServerMessage::Chat {
                    message: "name1: hi".into()
                }
            );
        }
    }

    #[test]
    fn chat_from_unknown_session_or_room_sends_nothing() {
        let (rooms, sessions, code) = setup(&["u1"]);
        let mut out: Vec<Delivery> = Vec::new();
        assert!(chat(&rooms, &sessions, code, &"ghost".into(), "boo", &mut out).is_err());
        assert!(chat(&rooms, &sessions, RoomCode(111_111), &"u1".into(), "x", &mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn input_echoes_locally_and_tags_remote() {
        let (rooms, sessions, code) = setup(&["u1", "u2", "u3", "u4"]);
        let mut out: Vec<Delivery> = Vec::new();
        input(&rooms, &sessions, code, &"u1".into(), 5, true, &mut out).unwrap();

        assert_eq!(
            out,
            vec![
                Delivery {
                    to: addr(4000),
                    message: ServerMessage::LocalInput {
                        key: 5,
                        pressed: true
                    },
                },
                Delivery {
                    to: addr(4001),
                    message: ServerMessage::RemoteInput {
                        key: 5,
                        pressed: true,
                        player: 0
                    },
                },
                Delivery {
                    to: addr(4002),
                    message: ServerMessage::RemoteInput {
                        key: 5,
                        pressed: true,
                        player: 0
                    },
                },
                Delivery {
                    to: addr(4003),
                    message: ServerMessage::RemoteInput {
                        key: 5,
                        pressed: true,
                        player: 0
                    },
                },
            ]
        );
    }

    #[test]
    fn input_from_player_one_is_tagged_one() {
        let (rooms, sessions, code) = setup(&["u1", "u2"]);
        let mut out: Vec<Delivery> = Vec::new();
        input(&rooms, &sessions, code, &"u2".into(), 9, false, &mut out).unwrap();
        assert_eq!(out[1].to, addr(4000));
        assert_eq!(
            out[1].message,
            ServerMessage::RemoteInput {
                key: 9,
                pressed: false,
                player: 1
            }
        );
    }

    #[test]
    fn input_from_spectator_is_rejected() {
        let (rooms, sessions, code) = setup(&["u1", "u2", "u3"]);
        let mut out: Vec<Delivery> = Vec::new();
        let err = input(&rooms, &sessions, code, &"u3".into(), 1, true, &mut out).unwrap_err();
        assert!(matches!(err, RelayError::NotAPlayer { .. }));
        assert!(out.is_empty());
    }

    #[test]
    fn input_without_opponent_is_rejected() {
        let (rooms, sessions, code) = setup(&["u1"]);
        let mut out: Vec<Delivery> = Vec::new();
        assert_eq!(
            input(&rooms, &sessions, code, &"u1".into(), 1, true, &mut out),
            Err(RelayError::OpponentMissing(code))
        );
        assert!(out.is_empty());
    }

    #[test]
    fn roster_lists_players_only() {
        let (rooms, mut sessions, code) = setup(&["u1", "u2", "u3"]);
        sessions.set_character(&"u2".into(), Some(Character(4))).unwrap();
        let mut out: Vec<Delivery> = Vec::new();
        broadcast_roster(&rooms, &sessions, code, &mut out).unwrap();

        assert_eq!(recipients(&out), vec![4000, 4001, 4002]);
        let ServerMessage::RosterChanged { roster } = &out[0].message else {
            panic!("expected roster, got {:?}", out[0].message);
        };
        assert_eq!(
            roster.players(),
            &[
                RosterEntry {
                    username: "name0".into(),
                    character: None,
                    port: 4000,
                },
                RosterEntry {
                    username: "name1".into(),
                    character: Some(Character(4)),
                    port: 4001,
                },
            ]
        );
    }

    #[test]
    fn roster_without_players_is_vacant() {
        let (mut rooms, sessions, code) = setup(&["u1", "u2"]);
        rooms.demote(code, &"u1".into()).unwrap();
        rooms.demote(code, &"u2".into()).unwrap();
        let mut out: Vec<Delivery> = Vec::new();
        broadcast_roster(&rooms, &sessions, code, &mut out).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|d| d.message
            == ServerMessage::RosterChanged {
                roster: Roster::Vacant
            }));
    }

    #[test]
    fn match_start_reaches_everyone() {
        let (rooms, sessions, code) = setup(&["u1", "u2", "u3"]);
        let mut out: Vec<Delivery> = Vec::new();
        announce_match_start(&rooms, &sessions, code, &mut out).unwrap();
        assert_eq!(recipients(&out), vec![4000, 4001, 4002]);
        assert!(out.iter().all(|d| d.message == ServerMessage::MatchStarted));
    }
}
