// Room registry: active rooms keyed by six-digit code.
//
// A room holds at most `PLAYER_SLOTS` (two) players in slot order plus any
// number of spectators. Rooms store client ids only; usernames, addresses and
// characters are looked up in the `SessionRegistry` when a broadcast is built.
//
// Invariants maintained here:
// - a client id appears at most once per room, in players or spectators;
// - `players.len() <= PLAYER_SLOTS`;
// - a room with no occupants does not exist (the last `exit` destroys it).
//
// The one-room-per-session invariant spans both registries and is enforced
// by the dispatcher, which exits the old room before create/join.

use std::collections::{BTreeMap, BTreeSet};

use duel_lobby_protocol::{ClientId, PLAYER_SLOTS, Role, RoomCode};

use crate::error::{RelayError, Result};
use crate::room_code::{CODE_SPACE, CodeGenerator};

/// Random draws attempted before `create` falls back to a linear scan.
pub const DEFAULT_MAX_CODE_ATTEMPTS: u32 = 64;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Room {
    players: Vec<ClientId>,
    spectators: BTreeSet<ClientId>,
}

impl Room {
    fn with_owner(owner: ClientId) -> Self {
        Self {
            players: vec![owner],
            spectators: BTreeSet::new(),
        }
    }

    /// Players in slot order.
    pub fn players(&self) -> &[ClientId] {
        &self.players
    }

    pub fn spectators(&self) -> impl Iterator<Item = &ClientId> {
        self.spectators.iter()
    }

    /// Every occupant: players in slot order, then spectators.
    pub fn occupants(&self) -> impl Iterator<Item = &ClientId> {
        self.players.iter().chain(self.spectators.iter())
    }

    pub fn occupant_count(&self) -> usize {
        self.players.len() + self.spectators.len()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= PLAYER_SLOTS
    }

    pub fn role_of(&self, id: &ClientId) -> Option<Role> {
        if let Some(index) = self.players.iter().position(|p| p == id) {
            Some(Role::Player(index))
        } else if self.spectators.contains(id) {
            Some(Role::Spectator)
        } else {
            None
        }
    }

    /// The player in the other slot from `index`, if seated.
    pub fn opponent_of(&self, index: usize) -> Option<&ClientId> {
        self.players.get(1 - index.min(1))
    }

    /// Seat `id` as a player if a slot is free, otherwise as a spectator.
    fn admit(&mut self, id: ClientId) -> Role {
        if self.is_full() {
            self.spectators.insert(id);
            Role::Spectator
        } else {
            self.players.push(id);
            Role::Player(self.players.len() - 1)
        }
    }

    /// Remove `id` from whichever list holds it. Later players shift down a
    /// slot, so player 1 becomes player 0 when player 0 leaves.
    fn remove(&mut self, id: &ClientId) -> Option<Role> {
        if let Some(index) = self.players.iter().position(|p| p == id) {
            self.players.remove(index);
            Some(Role::Player(index))
        } else if self.spectators.remove(id) {
            Some(Role::Spectator)
        } else {
            None
        }
    }
}

/// Result of a successful `RoomRegistry::exit`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The leaver was the last occupant; the room is gone.
    Destroyed,
    /// A player left. The remaining occupants need a roster update.
    LeftAsPlayer,
    LeftAsSpectator,
}

#[derive(Debug)]
pub struct RoomRegistry {
    rooms: BTreeMap<RoomCode, Room>,
    codes: CodeGenerator,
    max_code_attempts: u32,
}

impl RoomRegistry {
    pub fn new(codes: CodeGenerator, max_code_attempts: u32) -> Self {
        Self {
            rooms: BTreeMap::new(),
            codes,
            max_code_attempts,
        }
    }

    /// Open a room with `owner` in player slot 0 and return its code.
    ///
    /// Draws random codes until one is free. After `max_code_attempts`
    /// collisions it walks the code space from a random start instead, so a
    /// nearly full registry still terminates; `RoomSpaceExhausted` means every
    /// code is taken.
    pub fn create(&mut self, owner: ClientId) -> Result<RoomCode> {
        let code = self.free_code()?;
        self.rooms.insert(code, Room::with_owner(owner));
        Ok(code)
    }

    fn free_code(&mut self) -> Result<RoomCode> {
        for _ in 0..self.max_code_attempts {
            let code = self.codes.next_code();
            if !self.rooms.contains_key(&code) {
                return Ok(code);
            }
        }

        if self.rooms.len() >= CODE_SPACE as usize {
            return Err(RelayError::RoomSpaceExhausted);
        }
        let start = self.codes.below(CODE_SPACE);
        (0..CODE_SPACE)
            .map(|offset| RoomCode(RoomCode::MIN + (start + offset) % CODE_SPACE))
            .find(|code| !self.rooms.contains_key(code))
            .ok_or(RelayError::RoomSpaceExhausted)
    }

    /// Add `id` to the room: as the next player if fewer than two are seated,
    /// otherwise as a spectator. Joining a room already occupied by `id`
    /// returns its current role unchanged.
    pub fn join(&mut self, code: RoomCode, id: ClientId) -> Result<Role> {
        let room = self.require_mut(code)?;
        if let Some(role) = room.role_of(&id) {
            return Ok(role);
        }
        Ok(room.admit(id))
    }

    /// Take `id` out of the room, destroying the room if `id` was its only
    /// occupant. The "no room" sentinel reports `UnknownRoom` like any other
    /// inactive code.
    pub fn exit(&mut self, code: RoomCode, id: &ClientId) -> Result<ExitOutcome> {
        let room = self.require_mut(code)?;
        if room.occupant_count() == 1 && room.role_of(id).is_some() {
            self.rooms.remove(&code);
            return Ok(ExitOutcome::Destroyed);
        }
        match room.remove(id) {
            Some(Role::Player(_)) => Ok(ExitOutcome::LeftAsPlayer),
            Some(Role::Spectator) => Ok(ExitOutcome::LeftAsSpectator),
            None => Err(RelayError::NotInRoom {
                room: code,
                client: id.clone(),
            }),
        }
    }

    /// Move a spectator into the next free player slot.
    pub fn promote(&mut self, code: RoomCode, id: &ClientId) -> Result<usize> {
        let room = self.require_mut(code)?;
        if !room.spectators.contains(id) {
            return Err(RelayError::NotASpectator {
                room: code,
                client: id.clone(),
            });
        }
        if room.is_full() {
            return Err(RelayError::RoomFull(code));
        }
        room.spectators.remove(id);
        room.players.push(id.clone());
        Ok(room.players.len() - 1)
    }

    /// Move a player to the spectators. The other player, if any, takes slot 0.
    pub fn demote(&mut self, code: RoomCode, id: &ClientId) -> Result<()> {
        let room = self.require_mut(code)?;
        let Some(index) = room.players.iter().position(|p| p == id) else {
            return Err(RelayError::NotAPlayer {
                room: code,
                client: id.clone(),
            });
        };
        let id = room.players.remove(index);
        room.spectators.insert(id);
        Ok(())
    }

    pub fn get(&self, code: RoomCode) -> Option<&Room> {
        self.rooms.get(&code)
    }

    /// Like `get`, but an inactive code is an `UnknownRoom` error.
    pub fn require(&self, code: RoomCode) -> Result<&Room> {
        self.rooms.get(&code).ok_or(RelayError::UnknownRoom(code))
    }

    fn require_mut(&mut self, code: RoomCode) -> Result<&mut Room> {
        self.rooms
            .get_mut(&code)
            .ok_or(RelayError::UnknownRoom(code))
    }

    pub fn contains(&self, code: RoomCode) -> bool {
        self.rooms.contains_key(&code)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn codes(&self) -> impl Iterator<Item = RoomCode> + '_ {
        self.rooms.keys().copied()
    }
}
