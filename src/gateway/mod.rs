pub mod auth;
pub mod fanout;
pub mod liveness;
pub mod protocol;
pub mod registry;
pub mod routes;
mod server;
pub mod websocket;

pub use auth::{AuthError, Claims, CredentialStore, UserProfile};
pub use fanout::Broadcaster;
pub use liveness::{LivenessSupervisor, SweepReport};
pub use protocol::OutboundFrame;
pub use registry::{Outbound, Session, SessionInfo, SessionRegistry, SessionRole};
pub use server::*;
