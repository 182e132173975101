//! In-process relay: rooms of peers exchanging game messages

pub mod room;

pub use room::{Membership, RelayError, Room, RoomRegistry};
