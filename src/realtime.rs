//! Realtime voice sessions over a persistent transport
//!
//! Implements the Elm Architecture pattern: [`transition`] is pure, the
//! [`RealtimeSessionController`] executes the effects it returns.

mod controller;
mod effect;
pub mod event;
mod state;
mod transition;
pub mod transport;

#[cfg(test)]
mod testing;

pub use controller::{RealtimeSessionController, SessionHandle};
pub use effect::Effect;
pub use event::{ClientEvent, ServerEvent, SessionEvent};
pub use state::{SessionContext, SessionState};
pub use transition::{transition, TransitionError, TransitionResult};
pub use transport::{
    AudioTrack, ChannelEvent, ChannelEvents, DataChannel, HttpSignaling, HttpTokenSource,
    PeerTransport, Signaling, TokenSource, TransportFactory,
};
