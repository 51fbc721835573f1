//! Typed request/response messaging between the popup, the coordinator and page agents.

pub mod channel;
pub mod protocol;

pub use channel::{Listener, MessageBus, MessageHandler, DEFAULT_CHANNEL_SIZE};
pub use protocol::{
    Endpoint, FailureKind, FailureReport, Request, Response, SessionId, SessionSnapshot, TabId,
};
