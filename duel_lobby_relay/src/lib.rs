// duel_lobby_relay — rendezvous and relay coordinator for Duel Lobby.
//
// Game clients find each other through six-digit room codes and then exchange
// chat, roster updates, and per-frame input through the relay, which forwards
// datagrams between room occupants. The relay never simulates anything; it
// only tracks who is connected, which room they are in, and whether they hold
// one of the two player slots or are watching.
//
// Module overview:
// - `session.rs`:   `SessionRegistry`, one record per client id (address,
//                   username, character, current room).
// - `room.rs`:      `RoomRegistry`, rooms keyed by code with two player slots
//                   and a spectator set. Creation, join, exit, promote and
//                   demote live here.
// - `room_code.rs`: seeded generator for the random six-digit codes.
// - `relay.rs`:     forwarding of chat, input, roster and match-start records
//                   to room occupants.
// - `roles.rs`:     spectator/player swaps and character selection, each
//                   followed by a roster broadcast.
// - `dispatch.rs`:  `Dispatcher`, the per-datagram entry point that owns both
//                   registries and routes each decoded record.
// - `outbox.rs`:    the `Outbox` seam handlers write replies into; UDP in the
//                   server, a `Vec` in tests.
// - `server.rs`:    UDP socket and the single-threaded receive loop.
// - `client.rs`:    blocking UDP client used by the integration tests.
// - `error.rs`:     `RelayError`.
//
// Dependencies: `duel_lobby_protocol` (record types and the datagram codec).
//
// The relay can run as a standalone binary (`main.rs`) or be embedded in a
// game process via the library API (`start_relay`).

pub mod client;
pub mod dispatch;
pub mod error;
pub mod outbox;
pub mod relay;
pub mod roles;
pub mod room;
pub mod room_code;
pub mod server;
pub mod session;

pub use client::{ClientError, RelayClient};
pub use dispatch::Dispatcher;
pub use error::RelayError;
pub use server::{RelayConfig, RelayHandle, start_relay};
