//! Domain types and the ports the application layer depends on.

pub mod claims;
pub mod money;
pub mod ports;
pub mod session;
pub mod terminal;
pub mod wallet;
