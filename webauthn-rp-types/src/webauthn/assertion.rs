//! Types specific to authentication with an existing credential.
use serde::{Deserialize, Serialize};

use crate::{
    utils::serde::{ignore_unknown, maybe_stringified},
    webauthn::{PublicKeyCredential, PublicKeyCredentialDescriptor, UserVerificationRequirement},
    Bytes,
};

/// The credential payload a client returns from a successful authentication
/// ceremony, as received by the Relying Party.
pub type AuthenticationPublicKeyCredential = PublicKeyCredential<AuthenticatorAssertionResponse>;

/// The authenticator's response to a Relying Party's request for an assertion
/// by an existing credential.
///
/// <https://w3c.github.io/webauthn/#iface-authenticatorassertionresponse>
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAssertionResponse {
    /// The JSON serialization of the client data passed to the authenticator.
    /// The exact encoding must be preserved since a hash over it is part of
    /// the signed message.
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Bytes,

    /// The authenticator data returned by the authenticator.
    pub authenticator_data: Bytes,

    /// The raw signature returned from the authenticator over
    /// `authenticatorData || SHA-256(clientDataJSON)`.
    pub signature: Bytes,

    /// The user handle the credential was registered with, if the
    /// authenticator stored one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<Bytes>,
}

/// The options a Relying Party sends to `navigator.credentials.get` when
/// requesting an assertion.
///
/// <https://w3c.github.io/webauthn/#dictdef-credentialrequestoptions-extension>
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequestOptions {
    /// The key defining that this is a request for a webauthn assertion.
    pub public_key: PublicKeyCredentialRequestOptions,
}

/// The request for an assertion by an existing credential.
///
/// <https://w3c.github.io/webauthn/#dictdef-publickeycredentialrequestoptions>
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialRequestOptions {
    /// The challenge the selected authenticator signs, along with other data,
    /// when producing the assertion.
    pub challenge: Bytes,

    /// A time, in milliseconds, that the Relying Party is willing to wait for
    /// the call to complete. This is treated as a hint.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "maybe_stringified"
    )]
    pub timeout: Option<u32>,

    /// The RP ID claimed by the Relying Party. If omitted, its value will be
    /// the requesting origin's effective domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rp_id: Option<String>,

    /// A list of credentials acceptable to the caller, in descending order of
    /// preference. An empty list requests a discoverable credential.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_credentials: Vec<PublicKeyCredentialDescriptor>,

    /// The Relying Party's user verification requirements for the ceremony.
    #[serde(default, deserialize_with = "ignore_unknown")]
    pub user_verification: UserVerificationRequirement,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_options_defaults() {
        let options: PublicKeyCredentialRequestOptions =
            serde_json::from_str(r#"{"challenge": "AQIDBA"}"#).expect("failed to parse");
        assert!(options.allow_credentials.is_empty());
        assert_eq!(
            options.user_verification,
            UserVerificationRequirement::Preferred
        );
        assert_eq!(options.rp_id, None);
    }

    #[test]
    fn request_options_round_trip() {
        let json = r#"{
            "challenge": "AQIDBAUGBwgJCgsMDQ4PEA",
            "timeout": 60000,
            "rpId": "acme.com",
            "allowCredentials": [
                {"type": "public-key", "id": "BAUG", "transports": ["usb"]},
                {"type": "public-key", "id": "BwgJ", "transports": ["internal"]}
            ],
            "userVerification": "required"
        }"#;
        let options: PublicKeyCredentialRequestOptions =
            serde_json::from_str(json).expect("failed to parse");
        assert_eq!(options.rp_id.as_deref(), Some("acme.com"));
        assert_eq!(options.allow_credentials.len(), 2);
        assert_eq!(
            options.user_verification,
            UserVerificationRequirement::Required
        );

        let reserialized = serde_json::to_value(&options).unwrap();
        assert_eq!(reserialized["challenge"], "AQIDBAUGBwgJCgsMDQ4PEA");
        assert_eq!(reserialized["allowCredentials"][0]["id"], "BAUG");
        assert_eq!(reserialized["allowCredentials"][1]["transports"][0], "internal");
    }

    #[test]
    fn assertion_response_parses_all_fields() {
        let response: AuthenticatorAssertionResponse = serde_json::from_str(
            r#"{
                "clientDataJSON": "eyJ0eXBlIjoid2ViYXV0aG4uZ2V0In0",
                "authenticatorData": "AAAA",
                "signature": "MEUCIQ",
                "userHandle": "AQIDBA=="
            }"#,
        )
        .expect("failed to parse");
        assert_eq!(response.user_handle, Some(vec![1, 2, 3, 4].into()));
    }
}
