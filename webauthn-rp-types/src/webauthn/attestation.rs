//! Types specific to public key credential creation (registration).
use serde::{Deserialize, Serialize};

use crate::{
    utils::serde::{ignore_unknown, ignore_unknown_opt_vec, maybe_stringified},
    webauthn::{
        AttestationConveyancePreference, AuthenticatorSelectionCriteria, AuthenticatorTransport,
        PublicKeyCredentialDescriptor, PublicKeyCredentialParameters, PublicKeyCredentialType,
    },
    Bytes,
};

/// The credential payload a client returns from a successful creation
/// ceremony, as received by the Relying Party.
pub type RegistrationPublicKeyCredential = PublicKeyCredential<AuthenticatorAttestationResponse>;

/// A public key credential as returned by `navigator.credentials.create` or
/// `.get`, generic over the authenticator response type.
///
/// <https://w3c.github.io/webauthn/#iface-pkcredential>
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredential<R> {
    /// The base64url encoding of [`Self::raw_id`].
    pub id: String,

    /// The credential ID.
    pub raw_id: Bytes,

    /// The credential's type; unknown values deserialize to
    /// [`PublicKeyCredentialType::Unknown`] and should be rejected by policy,
    /// not by the parser.
    #[serde(rename = "type", default, deserialize_with = "ignore_unknown")]
    pub ty: PublicKeyCredentialType,

    /// The authenticator's response to the client's request.
    pub response: R,
}

/// The authenticator's response to a Relying Party's credential creation
/// request.
///
/// <https://w3c.github.io/webauthn/#iface-authenticatorattestationresponse>
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAttestationResponse {
    /// The JSON serialization of the client data passed to the authenticator
    /// by the client in order to generate this credential. The exact encoding
    /// must be preserved since a hash over it is what the authenticator signed.
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Bytes,

    /// The CBOR encoded attestation object: attestation statement format,
    /// statement, and authenticator data.
    ///
    /// <https://w3c.github.io/webauthn/#attestation-object>
    pub attestation_object: Bytes,

    /// The transports the authenticator is believed to support, for the
    /// Relying Party to store alongside the credential.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "ignore_unknown_opt_vec"
    )]
    pub transports: Option<Vec<AuthenticatorTransport>>,
}

/// The options a Relying Party sends to `navigator.credentials.create` when
/// requesting a new webauthn credential.
///
/// <https://w3c.github.io/webauthn/#dictdef-credentialcreationoptions-extension>
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialCreationOptions {
    /// The key defining that this is a request for a webauthn credential.
    pub public_key: PublicKeyCredentialCreationOptions,
}

/// The request for creating a new public key credential.
///
/// <https://w3c.github.io/webauthn/#dictdef-publickeycredentialcreationoptions>
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialCreationOptions {
    /// A name and an identifier for the Relying Party responsible for the
    /// request.
    pub rp: PublicKeyCredentialRpEntity,

    /// Names and an identifier for the user account performing the
    /// registration.
    pub user: PublicKeyCredentialUserEntity,

    /// The challenge the authenticator signs, along with other data, when
    /// producing an attestation object for the new credential.
    pub challenge: Bytes,

    /// The key types and signature algorithms the Relying Party supports,
    /// ordered from most preferred to least preferred.
    pub pub_key_cred_params: Vec<PublicKeyCredentialParameters>,

    /// A time, in milliseconds, that the Relying Party is willing to wait for
    /// the call to complete. This is treated as a hint.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "maybe_stringified"
    )]
    pub timeout: Option<u32>,

    /// Existing credentials mapped to this user account, to ensure a new
    /// credential is not created on an authenticator that already holds one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_credentials: Option<Vec<PublicKeyCredentialDescriptor>>,

    /// Capabilities and settings the authenticator must or should satisfy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_selection: Option<AuthenticatorSelectionCriteria>,

    /// The Relying Party's preference for attestation conveyance. Unknown
    /// values act as the default.
    #[serde(default, deserialize_with = "ignore_unknown")]
    pub attestation: AttestationConveyancePreference,
}

/// Additional Relying Party attributes for creating a new credential.
///
/// <https://w3c.github.io/webauthn/#dictdef-publickeycredentialrpentity>
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PublicKeyCredentialRpEntity {
    /// A unique identifier for the Relying Party entity, which sets the
    /// [RP ID]. If omitted, its value will be the requesting origin's
    /// effective domain.
    ///
    /// [RP ID]: https://w3c.github.io/webauthn/#rp-id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// A human-palatable identifier for the Relying Party, intended only for
    /// display.
    pub name: String,

    /// A URL which resolves to an image associated with the Relying Party.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Additional user account attributes for creating a new credential.
///
/// <https://w3c.github.io/webauthn/#dictdef-publickeycredentialuserentity>
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialUserEntity {
    /// The user handle of the user account. A user handle is an opaque byte
    /// sequence with a maximum size of 64 bytes, and is not meant to be
    /// displayed to the user.
    pub id: Bytes,

    /// A human-palatable identifier for the account, such as a username or
    /// email address, chosen by the user during registration.
    pub name: String,

    /// A human-palatable name for the account, e.g. "Alex Mueller", chosen by
    /// the user during registration.
    pub display_name: String,

    /// A URL which resolves to an image associated with the account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::UserVerificationRequirement;

    #[test]
    fn creation_options_round_trip() {
        let json = r#"{
            "publicKey": {
                "rp": {"id": "webauthn.org", "name": "WebAuthn"},
                "user": {"id": "AQIDBA", "name": "jane", "displayName": "Jane Doe"},
                "challenge": "tBfYBPIbdibSyCT19w5DjRXmLbw8qzXk6bE4IhNEzW4",
                "pubKeyCredParams": [{"type": "public-key", "alg": -7}],
                "timeout": "60000",
                "authenticatorSelection": {
                    "requireResidentKey": false,
                    "userVerification": "required"
                },
                "attestation": "direct"
            }
        }"#;

        let options: CredentialCreationOptions =
            serde_json::from_str(json).expect("failed to parse creation options");
        let options = options.public_key;
        assert_eq!(options.rp.id.as_deref(), Some("webauthn.org"));
        assert_eq!(options.user.display_name, "Jane Doe");
        assert_eq!(options.timeout, Some(60_000));
        assert_eq!(options.pub_key_cred_params[0].alg, -7);
        assert_eq!(
            options
                .authenticator_selection
                .as_ref()
                .map(|s| s.user_verification),
            Some(UserVerificationRequirement::Required)
        );
        assert_eq!(
            options.attestation,
            AttestationConveyancePreference::Direct
        );

        let reserialized = serde_json::to_value(CredentialCreationOptions {
            public_key: options,
        })
        .unwrap();
        assert_eq!(
            reserialized["publicKey"]["challenge"],
            "tBfYBPIbdibSyCT19w5DjRXmLbw8qzXk6bE4IhNEzW4"
        );
        assert_eq!(reserialized["publicKey"]["user"]["id"], "AQIDBA");
    }

    #[test]
    fn unknown_attestation_preference_defaults_to_none() {
        let options: PublicKeyCredentialCreationOptions = serde_json::from_str(
            r#"{
                "rp": {"name": "WebAuthn"},
                "user": {"id": "AQIDBA", "name": "jane", "displayName": "Jane"},
                "challenge": "AQIDBA",
                "pubKeyCredParams": [],
                "attestation": "whatever-else"
            }"#,
        )
        .expect("failed to parse");
        assert_eq!(options.attestation, AttestationConveyancePreference::None);
    }
}
