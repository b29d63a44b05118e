use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The client data represents the contextual bindings of both the WebAuthn
/// Relying Party and the client: ceremony type, challenge and origin. Its
/// hash is part of every signature an authenticator produces.
///
/// > Note: The `CollectedClientData` may be extended in the future. Therefore
/// > it's critical when parsing to be tolerant of unknown keys and of any
/// > reordering of the keys.
///
/// <https://w3c.github.io/webauthn/#dictdef-collectedclientdata>
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CollectedClientData {
    /// [`ClientDataType::Create`] when creating new credentials,
    /// [`ClientDataType::Get`] when getting an assertion. The purpose of this
    /// member is to prevent certain types of signature confusion attacks,
    /// where an attacker substitutes one legitimate signature for another.
    #[serde(rename = "type")]
    pub ty: ClientDataType,

    /// The base64url encoding of the challenge provided by the Relying Party.
    pub challenge: String,

    /// The fully qualified origin of the requester, as provided to the
    /// authenticator by the client, in the syntax defined by [RFC6454].
    ///
    /// [RFC6454]: https://www.rfc-editor.org/rfc/rfc6454
    pub origin: String,

    /// The inverse of the `sameOriginWithAncestors` argument value passed
    /// into the client's internal create/get method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_origin: Option<bool>,

    /// The state of the Token Binding protocol used when communicating with
    /// the Relying Party, if the client supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_binding: Option<TokenBinding>,

    /// Unknown members are preserved in order so the struct survives future
    /// extensions of the client data.
    #[serde(flatten)]
    pub unknown_keys: IndexMap<String, serde_json::Value>,
}

/// Used to limit the values of [`CollectedClientData::ty`]; serializes to
/// static strings.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum ClientDataType {
    /// Serializes to `"webauthn.create"`
    #[serde(rename = "webauthn.create")]
    Create,

    /// Serializes to `"webauthn.get"`
    #[serde(rename = "webauthn.get")]
    Get,
}

/// The Token Binding state the client reported in its client data.
///
/// <https://w3c.github.io/webauthn/#dictdef-tokenbinding>
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenBinding {
    /// Whether token binding was used for this request.
    pub status: TokenBindingStatus,

    /// The base64url encoding of the Token Binding ID, present iff
    /// [`Self::status`] is [`TokenBindingStatus::Present`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Status values for [`TokenBinding`].
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TokenBindingStatus {
    /// Token binding was used; the ID is in [`TokenBinding::id`].
    Present,

    /// The client supports token binding but it was not negotiated.
    Supported,

    /// The client does not support token binding. Not emitted by current
    /// clients but present in older payloads.
    NotSupported,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_unknown_members_and_token_binding() {
        let json = r#"{
            "challenge": "uVX88IgRa0SSrMIRT_q7cRcdfgfRBxCgn_pkpUAnXJK2zOb307wd1OLXQ0AuNaMtBR3amk6HYzp-_VxJTPpwGw",
            "origin": "https://webauthn.org",
            "tokenBinding": {"status": "not-supported"},
            "hashAlgorithm": "SHA-256",
            "type": "webauthn.create"
        }"#;
        let client_data: CollectedClientData =
            serde_json::from_str(json).expect("failed to parse client data");
        assert_eq!(client_data.ty, ClientDataType::Create);
        assert_eq!(client_data.origin, "https://webauthn.org");
        assert_eq!(
            client_data.token_binding,
            Some(TokenBinding {
                status: TokenBindingStatus::NotSupported,
                id: None
            })
        );
        assert!(client_data.unknown_keys.contains_key("hashAlgorithm"));
    }

    #[test]
    fn rejects_unexpected_type_values() {
        serde_json::from_str::<CollectedClientData>(
            r#"{"type": "webauthn.attest", "challenge": "AAAA", "origin": "https://a.example"}"#,
        )
        .expect_err("unknown ceremony type should fail");
    }
}
