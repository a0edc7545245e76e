//! BBS - Core content types and message definitions
//!
//! Defines the hierarchical, content-addressed board dataset
//! (boards, threads, posts and per-user vote activity) together with
//! the key/hash primitives and the `[OK]` / `[ERROR]` RPC envelope.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod messages;
pub mod types;

pub use constants::*;
pub use error::*;
pub use messages::*;
pub use types::*;
