//! # WebAuthn RP
//!
//! Verification core for a WebAuthn Relying Party: parsing and
//! cryptographically validating the attestation statements authenticators
//! produce during registration and the assertion signatures they produce
//! during authentication.
//!
//! The crate is purely computational. It keeps no network, storage or HTTP
//! state: challenges, trust anchors, stored credentials and even the clock
//! are injected by the caller, and every exported operation is a synchronous
//! function of its inputs. Wire types live in [`webauthn_rp_types`],
//! re-exported as [`types`].
//!
//! ```no_run
//! use webauthn_rp::{RelyingParty, TrustAnchors};
//! use webauthn_rp::types::webauthn::RegistrationPublicKeyCredential;
//!
//! # fn demo(credential: RegistrationPublicKeyCredential, challenge: &[u8]) {
//! let rp = RelyingParty::new(
//!     "example.com",
//!     vec!["https://example.com".parse().unwrap()],
//! );
//! match rp.verify_registration(&credential, challenge, &TrustAnchors::new()) {
//!     Ok(registered) => { /* persist registered.credential_id etc. */ }
//!     Err(err) => { /* reject the ceremony */ }
//! }
//! # }
//! ```

use std::fmt;
use std::time::SystemTime;

use subtle::ConstantTimeEq;
use url::Url;
use webauthn_rp_types::webauthn::{ClientDataType, CollectedClientData, UserVerificationRequirement};
use webauthn_rp_types::{crypto::sha256, encoding};

pub mod attestation;
pub mod cose;
pub mod crypto;
pub mod error;
pub mod x509;

mod authentication;
mod registration;

pub use authentication::{Authentication, StoredCredential};
pub use error::Error;
pub use registration::RegisteredCredential;
pub use webauthn_rp_types as types;
pub use x509::TrustAnchors;

/// How the signature counter rule of the authentication ceremony is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CounterPolicy {
    /// Whenever either counter is non-zero, the new value must be strictly
    /// greater than the stored one.
    #[default]
    Strict,
    /// Only regressions between two non-zero counters are rejected. For
    /// compatibility with deployments that never enforced counters; prefer
    /// [`CounterPolicy::Strict`].
    Lenient,
}

/// Caller-injected verification policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Whether the UV flag is required. [`UserVerificationRequirement::Preferred`]
    /// and `Discouraged` both accept an unverified user.
    pub user_verification: UserVerificationRequirement,
    /// The signature counter rule.
    pub counter: CounterPolicy,
    /// Accept credentials whose authenticator conveyed no attestation.
    pub allow_none_attestation: bool,
    /// Accept credentials that attested with their own key.
    pub allow_self_attestation: bool,
    /// Accept ECDAA attestation results. The core does not verify ECDAA
    /// signatures, so accepting means trusting the caller's ECDAA verifier.
    pub allow_ecdaa: bool,
    /// Ceiling for an encoded attestation object, bounding the work a single
    /// registration call can cause.
    pub max_attestation_object_size: usize,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            user_verification: UserVerificationRequirement::Preferred,
            counter: CounterPolicy::Strict,
            allow_none_attestation: true,
            allow_self_attestation: true,
            allow_ecdaa: false,
            max_attestation_object_size: attestation::MAX_ATTESTATION_OBJECT_SIZE,
        }
    }
}

type Clock = Box<dyn Fn() -> SystemTime + Send + Sync>;

/// A configured Relying Party: the RP ID credentials are scoped to, the
/// origins ceremonies may come from, the verification policy, and the clock.
///
/// The struct is immutable after construction and safe to share across
/// threads; both ceremonies borrow it shared.
pub struct RelyingParty {
    id: String,
    origins: Vec<Url>,
    policy: Policy,
    clock: Clock,
}

impl fmt::Debug for RelyingParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelyingParty")
            .field("id", &self.id)
            .field("origins", &self.origins)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RelyingParty {
    /// Create a Relying Party with the default [`Policy`] and the system
    /// clock.
    pub fn new(id: impl Into<String>, origins: Vec<Url>) -> Self {
        Self {
            id: id.into(),
            origins,
            policy: Policy::default(),
            clock: Box::new(SystemTime::now),
        }
    }

    /// Replace the verification policy.
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the clock. Verification consults the clock for certificate
    /// validity windows and SafetyNet freshness; injecting one keeps the
    /// ceremonies deterministic under test.
    pub fn with_clock(mut self, clock: impl Fn() -> SystemTime + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// The RP ID this Relying Party verifies against.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn now(&self) -> SystemTime {
        (self.clock)()
    }

    pub(crate) fn policy(&self) -> &Policy {
        &self.policy
    }

    pub(crate) fn rp_id_hash(&self) -> [u8; 32] {
        sha256(self.id.as_bytes())
    }

    /// Parse and check the client data of either ceremony: JSON shape,
    /// ceremony type, challenge equality and origin membership.
    pub(crate) fn check_client_data(
        &self,
        client_data_json: &[u8],
        expected_type: ClientDataType,
        expected_challenge: &[u8],
    ) -> Result<(CollectedClientData, [u8; 32]), Error> {
        let client_data: CollectedClientData = serde_json::from_slice(client_data_json)
            .map_err(|e| Error::MalformedJson(e.to_string()))?;

        if client_data.ty != expected_type {
            return Err(Error::ClientDataTypeMismatch);
        }

        let challenge =
            encoding::try_from_any_base64(&client_data.challenge).ok_or(Error::MalformedBase64)?;
        if !constant_time_eq(&challenge, expected_challenge) {
            return Err(Error::ChallengeMismatch);
        }

        let origin = Url::parse(&client_data.origin).map_err(|_| Error::OriginMismatch {
            origin: client_data.origin.clone(),
        })?;
        if !self.origins.iter().any(|allowed| allowed.origin() == origin.origin()) {
            return Err(Error::OriginMismatch {
                origin: client_data.origin.clone(),
            });
        }

        let hash = sha256(client_data_json);
        Ok((client_data, hash))
    }
}

/// Length-then-constant-time equality, for challenge material.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rp() -> RelyingParty {
        RelyingParty::new(
            "webauthn.org",
            vec![Url::parse("https://webauthn.org").unwrap()],
        )
    }

    fn client_data(ty: &str, challenge: &str, origin: &str) -> Vec<u8> {
        format!(r#"{{"type":{ty:?},"challenge":{challenge:?},"origin":{origin:?}}}"#).into_bytes()
    }

    #[test]
    fn accepts_matching_client_data() {
        let (_, hash) = rp()
            .check_client_data(
                &client_data("webauthn.create", "AQIDBA", "https://webauthn.org"),
                ClientDataType::Create,
                &[1, 2, 3, 4],
            )
            .expect("client data should check out");
        assert_ne!(hash, [0; 32]);
    }

    #[test]
    fn rejects_wrong_ceremony_type() {
        assert_eq!(
            rp().check_client_data(
                &client_data("webauthn.get", "AQIDBA", "https://webauthn.org"),
                ClientDataType::Create,
                &[1, 2, 3, 4],
            ),
            Err(Error::ClientDataTypeMismatch)
        );
    }

    #[test]
    fn rejects_challenge_mismatch() {
        assert_eq!(
            rp().check_client_data(
                &client_data("webauthn.create", "AQIDBA", "https://webauthn.org"),
                ClientDataType::Create,
                &[9, 9, 9, 9],
            ),
            Err(Error::ChallengeMismatch)
        );
    }

    #[test]
    fn rejects_foreign_origin() {
        assert!(matches!(
            rp().check_client_data(
                &client_data("webauthn.create", "AQIDBA", "https://evil.example"),
                ClientDataType::Create,
                &[1, 2, 3, 4],
            ),
            Err(Error::OriginMismatch { .. })
        ));
    }

    #[test]
    fn origin_comparison_ignores_default_port_and_path() {
        rp().check_client_data(
            &client_data("webauthn.create", "AQIDBA", "https://webauthn.org:443/"),
            ClientDataType::Create,
            &[1, 2, 3, 4],
        )
        .expect("default port should match");
    }
}
