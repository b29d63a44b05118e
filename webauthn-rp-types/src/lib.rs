//! # WebAuthn RP Types
//!
//! Rust type definitions for the data a WebAuthn Relying Party exchanges with
//! browsers and authenticators: credential payloads, ceremony options, client
//! data and the packed authenticator-data structure.
//!
//! These types are purely representational; the verification logic lives in
//! the `webauthn-rp` crate.

mod utils;

pub mod authenticator;
pub mod cbor;
pub mod webauthn;

// Re-exports
pub use utils::{
    bytes::{Bytes, NotBase64Encoded},
    crypto, encoding,
};
