//! The registration ceremony: WebAuthn §7.1, the parts a pure core can do.

use webauthn_rp_types::authenticator::Aaguid;
use webauthn_rp_types::webauthn::{
    AuthenticatorTransport, ClientDataType, RegistrationPublicKeyCredential,
    UserVerificationRequirement,
};

use crate::{
    attestation::{
        AttestationObject, AttestationType, TrustPath, VerifiedAttestation, VerifyContext,
    },
    cose::CredentialPublicKey,
    crypto::CoseAlgorithm,
    error::Error,
    x509::{validate_chain, TrustAnchors},
    RelyingParty,
};

/// The verified outcome of a registration ceremony, for the caller to
/// persist. The signature counter and the credential key feed the next
/// authentication; the attestation fields feed the caller's trust decision.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredCredential {
    /// The new credential's ID.
    pub credential_id: Vec<u8>,
    /// The credential public key, as the raw COSE bytes the authenticator
    /// emitted. Feed back in via [`StoredCredential`](crate::StoredCredential).
    pub public_key: Vec<u8>,
    /// The algorithm the credential signs with.
    pub algorithm: CoseAlgorithm,
    /// The authenticator's starting signature counter.
    pub sign_count: u32,
    /// The authenticator model identifier.
    pub aaguid: Aaguid,
    /// How the authenticator vouched for the credential.
    pub attestation_type: AttestationType,
    /// The material backing the attestation claim.
    pub trust_path: TrustPath,
    /// Whether the user was verified during the ceremony.
    pub user_verified: bool,
    /// The transports the client believes the authenticator supports.
    pub transports: Option<Vec<AuthenticatorTransport>>,
}

impl RelyingParty {
    /// Verify a credential creation response.
    ///
    /// Checks the client data (ceremony type, challenge, origin), decodes the
    /// attestation object, checks the authenticator data gates (RP ID hash,
    /// user presence, user verification per policy, attested credential
    /// data), runs the format verifier, and applies the attestation policy,
    /// validating X.509 trust paths against `anchors` at the injected time.
    pub fn verify_registration(
        &self,
        credential: &RegistrationPublicKeyCredential,
        expected_challenge: &[u8],
        anchors: &TrustAnchors,
    ) -> Result<RegisteredCredential, Error> {
        let response = &credential.response;
        if !credential.ty.is_public_key() {
            return Err(Error::MalformedJson(
                "credential type is not public-key".into(),
            ));
        }

        let (_client_data, client_data_hash) = self.check_client_data(
            &response.client_data_json,
            ClientDataType::Create,
            expected_challenge,
        )?;

        if response.attestation_object.len() > self.policy().max_attestation_object_size {
            return Err(Error::MalformedAttestationObject(format!(
                "{} bytes exceeds the configured {} byte ceiling",
                response.attestation_object.len(),
                self.policy().max_attestation_object_size
            )));
        }
        let object = AttestationObject::parse(&response.attestation_object)?;
        let auth_data = &object.auth_data;

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

        let attested = auth_data
            .attested_credential_data
            .as_ref()
            .ok_or(Error::AttestedCredentialDataMissing)?;
        if credential.raw_id.as_ref() != attested.credential_id() {
            return Err(Error::MalformedAttestationObject(
                "credential ID does not match attested credential data".into(),
            ));
        }

        // Gate the algorithm before running any format verifier.
        let credential_key = CredentialPublicKey::from_slice(attested.key_bytes())?;

        let ctx = VerifyContext {
            auth_data,
            auth_data_bytes: &object.auth_data_bytes,
            client_data_hash,
            now: self.now(),
        };
        let verified = object.statement.verify(&ctx)?;
        self.apply_attestation_policy(&verified, anchors)?;

        Ok(RegisteredCredential {
            credential_id: attested.credential_id().to_vec(),
            public_key: attested.key_bytes().to_vec(),
            algorithm: credential_key.alg,
            sign_count: auth_data.counter,
            aaguid: attested.aaguid,
            attestation_type: verified.attestation_type,
            trust_path: verified.trust_path,
            user_verified: auth_data.user_verified(),
            transports: response.transports.clone(),
        })
    }

    fn apply_attestation_policy(
        &self,
        verified: &VerifiedAttestation,
        anchors: &TrustAnchors,
    ) -> Result<(), Error> {
        match verified.attestation_type {
            AttestationType::None => {
                if !self.policy().allow_none_attestation {
                    return Err(Error::AttestationPolicyRejected(
                        "none attestation is not accepted",
                    ));
                }
                Ok(())
            }
            AttestationType::Self_ => {
                if !self.policy().allow_self_attestation {
                    return Err(Error::AttestationPolicyRejected(
                        "self attestation is not accepted",
                    ));
                }
                Ok(())
            }
            AttestationType::Ecdaa => {
                if !self.policy().allow_ecdaa {
                    return Err(Error::AttestationPolicyRejected(
                        "ECDAA attestation is not accepted",
                    ));
                }
                Ok(())
            }
            AttestationType::Basic | AttestationType::AttCa => match &verified.trust_path {
                TrustPath::X509Chain(chain) => validate_chain(chain, anchors, self.now()),
                _ => Err(Error::AttestationUntrusted(
                    "attestation lacks a certificate trust path".into(),
                )),
            },
        }
    }
}
