//! Effects produced by session transitions

use super::event::ClientEvent;
use serde_json::Value;

/// Effects executed by the controller after a transition, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Fetch a credential, create the transport, capture audio, open the data channel, negotiate
    Connect,

    /// Fire-and-forget send over the data channel
    Send(ClientEvent),

    /// Hand a completed transcript to the registered handler
    Transcript(String),

    /// Dispatch a provider-requested call and send back its result
    InvokeFunction {
        call_id: String,
        name: String,
        arguments: Value,
    },

    /// Stop audio tracks, close the data channel, close the transport
    ReleaseResources,
}
