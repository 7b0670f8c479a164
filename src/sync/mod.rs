//! Client-side synchronization of one room: a bulk fetch reconciled against
//! the room's change feeds, plus the typing lease.

mod room;
mod state;
mod typing;

pub use room::RoomSync;
pub use state::RoomState;
pub use typing::{DEFAULT_TYPING_LEASE, TypingLease};
