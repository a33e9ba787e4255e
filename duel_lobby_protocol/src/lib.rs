// duel_lobby_protocol — wire protocol for the Duel Lobby relay.
//
// This crate defines the record types and the datagram codec used by the
// relay (`duel_lobby_relay`) and by game clients to talk over UDP. It is
// shared between both sides and knows nothing about rooms or sessions.
//
// Module overview:
// - `types.rs`:    Identifier and value types: `ClientId`, `RoomCode`,
//                  `Character`, `Role`.
// - `message.rs`:  Inbound `ClientMessage` and outbound `ServerMessage`
//                  enums, plus the `Roster` payload and the `type` codes.
// - `codec.rs`:    One JSON object per datagram. Two-stage inbound decode
//                  (`Envelope`, then schema validation per kind) and the
//                  encoders for both directions.
//
// Design decisions:
// - **JSON on the wire.** Existing game clients already speak it; the field
//   names (`press`, `roleChange`, ...) are kept verbatim for compatibility.
// - **Validate before dispatch.** Every inbound record is checked against the
//   schema for its kind before the relay sees it, so handlers never coerce.

pub mod codec;
pub mod message;
pub mod types;

pub use codec::{
    CodecError, Envelope, MAX_DATAGRAM_SIZE, decode_envelope, decode_server, encode_client,
    encode_server,
};
pub use message::{ClientMessage, Roster, RosterEntry, ServerMessage};
pub use types::{Character, ClientId, PLAYER_SLOTS, Role, RoomCode};
