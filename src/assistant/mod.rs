//! Assistant conversation
//!
//! The duplex stream client, its wire frames, and the push-to-talk
//! controller that drives sessions from the physical trigger.

mod client;
mod controller;
pub mod proto;

pub use client::{
    ConversationClient, ConversationTransport, ResponseStream, SessionEvent, StreamHandle,
};
pub use controller::{PttState, PushToTalkController};
