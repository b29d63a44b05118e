//! The authentication ceremony: WebAuthn §7.2, the parts a pure core can do.

use webauthn_rp_types::authenticator::AuthenticatorData;
use webauthn_rp_types::webauthn::{
    AuthenticationPublicKeyCredential, ClientDataType, UserVerificationRequirement,
};

use crate::{
    cose::CredentialPublicKey,
    crypto::VerifyingKey,
    error::Error,
    CounterPolicy, RelyingParty,
};

/// The caller-owned state of a registered credential, as persisted from a
/// [`RegisteredCredential`](crate::RegisteredCredential).
///
/// The caller looks this up by the credential ID the client reported; the
/// core validates the assertion against it and hands back the new counter for
/// the caller to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    /// The credential's ID.
    pub credential_id: Vec<u8>,
    /// The credential public key, raw COSE bytes.
    pub public_key: Vec<u8>,
    /// The signature counter after the last successful ceremony.
    pub sign_count: u32,
}

/// The verified outcome of an authentication ceremony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authentication {
    /// The authenticator's new signature counter. Persist this over the
    /// stored value.
    pub sign_count: u32,
    /// Whether the user was verified during the ceremony.
    pub user_verified: bool,
    /// The user handle the authenticator reported, if any.
    pub user_handle: Option<Vec<u8>>,
}

impl RelyingParty {
    /// Verify an assertion response against a stored credential.
    ///
    /// Checks the client data (ceremony type, challenge, origin), parses the
    /// authenticator data, checks the RP ID hash and presence/verification
    /// flags, verifies the assertion signature with the stored credential
    /// key, and applies the signature counter rule. On success the caller
    /// persists [`Authentication::sign_count`].
    pub fn verify_authentication(
        &self,
        credential: &AuthenticationPublicKeyCredential,
        expected_challenge: &[u8],
        stored: &StoredCredential,
    ) -> Result<Authentication, Error> {
        let response = &credential.response;
        if !credential.ty.is_public_key() {
            return Err(Error::MalformedJson(
                "credential type is not public-key".into(),
            ));
        }
        if credential.raw_id.as_ref() != stored.credential_id.as_slice() {
            return Err(Error::MalformedJson(
                "credential ID does not match the stored credential".into(),
            ));
        }

        let (_client_data, client_data_hash) = self.check_client_data(
            &response.client_data_json,
            ClientDataType::Get,
            expected_challenge,
        )?;

        let auth_data_bytes: &[u8] = &response.authenticator_data;
        let auth_data = AuthenticatorData::parse(auth_data_bytes)?;

        if auth_data.rp_id_hash() != &self.rp_id_hash() {
            return Err(Error::RpIdMismatch);
        }
        if !auth_data.user_present() {
            return Err(Error::UserPresenceMissing);
        }
        if self.policy().user_verification == UserVerificationRequirement::Required
            && !auth_data.user_verified()
        {
            return Err(Error::UserVerificationMissing);
        }

        let key = CredentialPublicKey::from_slice(&stored.public_key)?;
        let mut message = Vec::with_capacity(auth_data_bytes.len() + 32);
        message.extend_from_slice(auth_data_bytes);
        message.extend_from_slice(&client_data_hash);
        VerifyingKey::from_credential(&key)?.verify(key.alg, &message, &response.signature)?;

        check_counter(self.policy().counter, stored.sign_count, auth_data.counter)?;

        Ok(Authentication {
            sign_count: auth_data.counter,
            user_verified: auth_data.user_verified(),
            user_handle: response.user_handle.clone().map(Into::into),
        })
    }
}

/// The signature counter rule. A counter pair where both sides are zero means
/// the authenticator does not implement counters; anything else must move
/// strictly forward under [`CounterPolicy::Strict`].
fn check_counter(policy: CounterPolicy, stored: u32, received: u32) -> Result<(), Error> {
    let regressed = match policy {
        CounterPolicy::Strict => (received != 0 || stored != 0) && received <= stored,
        CounterPolicy::Lenient => received != 0 && stored != 0 && received < stored,
    };
    if regressed {
        return Err(Error::CounterRegressed { stored, received });
    }
    Ok(())
}
