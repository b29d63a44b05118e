//! Common types used in both attestation (registration) and assertion
//! (authentication).
use serde::{Deserialize, Serialize};

use crate::{
    utils::serde::{ignore_unknown, ignore_unknown_opt_vec},
    Bytes,
};

/// This enumeration defines the valid credential types. It is an extension
/// point; values can be added to it in the future, as more credential types
/// are defined.
///
/// <https://w3c.github.io/webauthn/#enumdef-publickeycredentialtype>
#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PublicKeyCredentialType {
    /// Currently the only type defined: the public counterpart of an
    /// asymmetric key pair.
    PublicKey,
    /// The default, so unknown values are ignored during deserialization
    /// rather than failing the whole payload.
    #[default]
    Unknown,
}

impl PublicKeyCredentialType {
    /// Whether this is the `public-key` credential type.
    pub fn is_public_key(&self) -> bool {
        matches!(self, Self::PublicKey)
    }
}

/// Identifies a specific public key credential, used in
/// `excludeCredentials` to avoid duplicate registrations and in
/// `allowCredentials` to scope an authentication ceremony.
///
/// It is recommended to ignore any credential whose type is
/// [`PublicKeyCredentialType::Unknown`].
///
/// <https://w3c.github.io/webauthn/#dictdef-publickeycredentialdescriptor>
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicKeyCredentialDescriptor {
    /// The type of the public key credential the caller is referring to.
    #[serde(rename = "type", deserialize_with = "ignore_unknown")]
    pub ty: PublicKeyCredentialType,

    /// The credential ID of the public key credential the caller is referring to.
    pub id: Bytes,

    /// An OPTIONAL hint as to how the client might communicate with the
    /// managing authenticator. Unknown values are ignored.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "ignore_unknown_opt_vec"
    )]
    pub transports: Option<Vec<AuthenticatorTransport>>,
}

impl PublicKeyCredentialDescriptor {
    /// Whether [`Self::ty`] is a known credential type. Useful for filtering
    /// descriptor lists before acting on them.
    pub fn is_known(&self) -> bool {
        match self.ty {
            PublicKeyCredentialType::PublicKey => true,
            PublicKeyCredentialType::Unknown => false,
        }
    }
}

/// A Relying Party may require [user verification] for some of its operations
/// but not for others, and may use this type to express its needs.
///
/// <https://w3c.github.io/webauthn/#enumdef-userverificationrequirement>
///
/// [user verification]: https://w3c.github.io/webauthn/#user-verification
#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    /// The ceremony fails if the response does not have the UV flag set.
    Required,

    /// User verification is preferred if possible, but its absence does not
    /// fail the ceremony.
    #[default]
    Preferred,

    /// User verification should not be employed, e.g. to minimize disruption
    /// to the user interaction flow.
    Discouraged,
}

/// Hints as to how clients might communicate with a particular authenticator.
///
/// <https://w3c.github.io/webauthn/#enum-transport>
#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticatorTransport {
    /// Contactable over removable USB.
    Usb,

    /// Contactable over Near Field Communication (NFC).
    Nfc,

    /// Contactable over Bluetooth Low Energy.
    Ble,

    /// Contactable using a combination of (often separate) data-transport and
    /// proximity mechanisms, e.g. authentication on a desktop computer using
    /// a smartphone.
    #[serde(alias = "cable")]
    Hybrid,

    /// A client device-specific transport, i.e. a platform authenticator.
    Internal,

    /// Unrecognized transport hints are preserved as unknown and ignored.
    #[serde(other)]
    #[default]
    Unknown,
}

/// Authenticator attachment modalities: whether the authenticator is part of
/// the client device or roams between devices.
///
/// <https://w3c.github.io/webauthn/#enumdef-authenticatorattachment>
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorAttachment {
    /// Attached using a client device-specific transport and usually not
    /// removable from the client device.
    Platform,

    /// Removable from, and able to "roam" between, client devices.
    CrossPlatform,
}

/// The Relying Party's preference for how much attestation information it
/// wants conveyed during registration.
///
/// <https://w3c.github.io/webauthn/#enumdef-attestationconveyancepreference>
#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyancePreference {
    /// The Relying Party is not interested in attestation.
    #[default]
    None,

    /// The Relying Party prefers a verifiable attestation statement but
    /// allows the client to decide how to obtain it.
    Indirect,

    /// The Relying Party wants the attestation statement as generated by the
    /// authenticator.
    Direct,

    /// The Relying Party wants an attestation statement that may include
    /// uniquely identifying information, for controlled deployments.
    Enterprise,
}

/// The key type and signature algorithm pair a Relying Party supports,
/// ordered from most to least preferred in
/// [`pubKeyCredParams`](super::PublicKeyCredentialCreationOptions::pub_key_cred_params).
///
/// <https://w3c.github.io/webauthn/#dictdef-publickeycredentialparameters>
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PublicKeyCredentialParameters {
    /// The type of credential to be created.
    #[serde(rename = "type", deserialize_with = "ignore_unknown")]
    pub ty: PublicKeyCredentialType,

    /// The COSE algorithm identifier of the signature algorithm to be used
    /// with the new credential, e.g. `-7` for ES256.
    pub alg: i64,
}

/// Capabilities and settings an authenticator must or should satisfy to
/// participate in a creation ceremony.
///
/// <https://w3c.github.io/webauthn/#dictdef-authenticatorselectioncriteria>
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelectionCriteria {
    /// If present, eligible authenticators are filtered to this attachment
    /// modality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<AuthenticatorAttachment>,

    /// Whether the credential should be a client-side discoverable
    /// (resident) credential.
    #[serde(default)]
    pub require_resident_key: bool,

    /// The Relying Party's user verification requirements for the ceremony.
    #[serde(default, deserialize_with = "ignore_unknown")]
    pub user_verification: UserVerificationRequirement,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_credential_type_does_not_fail_descriptor() {
        let desc: PublicKeyCredentialDescriptor = serde_json::from_str(
            r#"{"type": "password", "id": "AAECAw", "transports": ["usb", "carrier-pigeon"]}"#,
        )
        .expect("failed to deserialize");
        assert!(!desc.is_known());
        assert_eq!(
            desc.transports.as_deref(),
            Some([AuthenticatorTransport::Usb, AuthenticatorTransport::Unknown].as_slice())
        );
    }

    #[test]
    fn parameters_round_trip() {
        let params = PublicKeyCredentialParameters {
            ty: PublicKeyCredentialType::PublicKey,
            alg: -7,
        };
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"{"type":"public-key","alg":-7}"#);
        assert_eq!(
            serde_json::from_str::<PublicKeyCredentialParameters>(&json).unwrap(),
            params
        );
    }
}
