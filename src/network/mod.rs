//! Network Layer
//!
//! WebSocket transport and the coordinator that serializes all state changes.
//! Everything side-effectful lives here; the `game/` layer stays pure.

pub mod coordinator;
pub mod protocol;
pub mod server;

pub use coordinator::Coordinator;
pub use protocol::{
    ClientMessage, ServerMessage, JoinRequest, ActionRequest,
    PairedInfo, UpdateInfo, TerminalNotice, Rejection, RejectCode,
};
pub use server::{SessionServer, ServerConfig, ServerError};
