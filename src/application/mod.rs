//! Application layer: token handling and the tap session protocol.
//!
//! `TapEngine` is the entry point. It wires the `SessionIssuer` and the
//! `CaptureAuthorizer` to one shared session store, so that every capture
//! race is settled by the store's compare-and-transition.

pub mod authorizer;
pub mod engine;
pub mod issuer;
pub mod token_codec;
