//! The packed authenticator-data structure and its components.
//!
//! <https://w3c.github.io/webauthn/#sctn-authenticator-data>

mod aaguid;
mod data;
mod flags;

pub use aaguid::Aaguid;
pub use data::{
    AttestedCredentialData, AuthDataError, AuthenticatorData, MAX_CREDENTIAL_ID_LENGTH,
};
pub use flags::Flags;
