//! Types defined by the [WebAuthn] specification for the Relying Party's JSON
//! surface: ceremony options going out, credential payloads coming back.
//!
//! [WebAuthn]: https://w3c.github.io/webauthn/

mod assertion;
mod attestation;
mod client_data;
mod common;

pub use assertion::*;
pub use attestation::*;
pub use client_data::*;
pub use common::*;
