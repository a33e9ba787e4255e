// Role changes inside a room: spectator to player and back, and character
// selection. Each successful change is followed by a roster broadcast so
// every occupant sees the new line-up.

use duel_lobby_protocol::{Character, ClientId, Role, RoomCode};

use crate::error::{RelayError, Result};
use crate::outbox::Outbox;
use crate::relay::broadcast_roster;
use crate::room::RoomRegistry;
use crate::session::SessionRegistry;

/// Seat a spectator in the free player slot. Fails with `NotASpectator` or
/// `RoomFull` without touching the room.
pub fn promote_to_player(
    rooms: &mut RoomRegistry,
    sessions: &SessionRegistry,
    code: RoomCode,
    id: &ClientId,
    out: &mut dyn Outbox,
) -> Result<usize> {
    let index = rooms.promote(code, id)?;
    broadcast_roster(rooms, sessions, code, out)?;
    Ok(index)
}

/// Give up a player slot and watch instead.
pub fn demote_to_spectator(
    rooms: &mut RoomRegistry,
    sessions: &SessionRegistry,
    code: RoomCode,
    id: &ClientId,
    out: &mut dyn Outbox,
) -> Result<()> {
    rooms.demote(code, id)?;
    broadcast_roster(rooms, sessions, code, out)
}

/// Pick or clear a character. Only seated players may choose; the roster is
/// re-sent even when the choice did not change.
pub fn select_character(
    rooms: &RoomRegistry,
    sessions: &mut SessionRegistry,
    code: RoomCode,
    id: &ClientId,
    character: Option<Character>,
    out: &mut dyn Outbox,
) -> Result<()> {
    let room = rooms.require(code)?;
    if !matches!(room.role_of(id), Some(Role::Player(_))) {
        return Err(RelayError::NotAPlayer {
            room: code,
            client: id.clone(),
        });
    }
    sessions.set_character(id, character)?;
    broadcast_roster(rooms, sessions, code, out)
}
