//! Protocol engine adapters.
//!
//! The real chat protocol is out of scope for chatlink; these engines stand
//! in for it behind [`crate::ProtocolEngine`]:
//!
//! - `scripted`  – every connect hands the test a channel to push raw
//!   events through, and every socket call is recorded.
//! - `simulator` – an offline engine for local runs of the HTTP service:
//!   it rotates QR challenges, completes pairing through a pairing code and
//!   asks for a restart afterwards, the way the network does.

pub mod scripted;
pub mod simulator;

pub use scripted::{ScriptedConnection, ScriptedEngine, ScriptedSocket, SocketCall};
pub use simulator::SimulatedEngine;
