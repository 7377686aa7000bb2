// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! CMS SignedData glue shared by the message codec and the dispatcher.
//!
//! This module provides the ContentInfo wrapping/unwrapping idiom, RSASSA
//! PKCS#1 v1.5 signing and verification dispatched over the supported digest
//! algorithms, and the degenerate SignedData carriers used to transport
//! certificate sets and CRLs.

use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::revocation::{RevocationInfoChoice, RevocationInfoChoices};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo, SignerInfos,
};
use der::asn1::{GeneralizedTime, ObjectIdentifier, OctetString, SetOfVec};
use der::{Any, Decode, Encode};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Digest;
use spki::AlgorithmIdentifierOwned;
use std::time::SystemTime;
use x509_cert::attr::Attribute;
use x509_cert::crl::CertificateList;
use x509_cert::Certificate;

use crate::asn1;
use crate::error::{Result, ScepError};

/// Digest algorithms supported for pkiMessage signatures.
///
/// These track the hash capability tokens the server advertises. SHA-256 is
/// the default for outgoing replies; SHA-1 remains accepted for legacy peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// SHA-1 (legacy interop).
    Sha1,
    /// SHA-256.
    #[default]
    Sha256,
    /// SHA-512.
    Sha512,
}

impl DigestAlgorithm {
    /// The digest OID carried in `digestAlgorithm` fields.
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            Self::Sha1 => asn1::SHA1,
            Self::Sha256 => asn1::SHA256,
            Self::Sha512 => asn1::SHA512,
        }
    }

    /// Reverse lookup from a `digestAlgorithm` OID.
    pub fn from_oid(oid: ObjectIdentifier) -> Option<Self> {
        match oid {
            asn1::SHA1 => Some(Self::Sha1),
            asn1::SHA256 => Some(Self::Sha256),
            asn1::SHA512 => Some(Self::Sha512),
            _ => None,
        }
    }

    /// One-shot digest of `data`.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => sha1::Sha1::digest(data).to_vec(),
            Self::Sha256 => sha2::Sha256::digest(data).to_vec(),
            Self::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }

    /// AlgorithmIdentifier naming this digest, parameters absent.
    pub fn algorithm_identifier(self) -> AlgorithmIdentifierOwned {
        AlgorithmIdentifierOwned {
            oid: self.oid(),
            parameters: None,
        }
    }
}

/// Sign `message` with RSASSA PKCS#1 v1.5 using the given digest.
pub(crate) fn sign_pkcs1v15(
    key: &RsaPrivateKey,
    digest: DigestAlgorithm,
    message: &[u8],
) -> Result<Vec<u8>> {
    let signature = match digest {
        DigestAlgorithm::Sha1 => rsa::pkcs1v15::SigningKey::<sha1::Sha1>::new(key.clone())
            .try_sign(message)
            .map_err(|e| ScepError::crypto(format!("signing failed: {}", e)))?
            .to_vec(),
        DigestAlgorithm::Sha256 => rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(key.clone())
            .try_sign(message)
            .map_err(|e| ScepError::crypto(format!("signing failed: {}", e)))?
            .to_vec(),
        DigestAlgorithm::Sha512 => rsa::pkcs1v15::SigningKey::<sha2::Sha512>::new(key.clone())
            .try_sign(message)
            .map_err(|e| ScepError::crypto(format!("signing failed: {}", e)))?
            .to_vec(),
    };
    Ok(signature)
}

/// Verify an RSASSA PKCS#1 v1.5 signature over `message`.
///
/// Failure is reported as a decoding error: the caller is rejecting an
/// unauthenticated pkiMessage, not a local fault.
pub(crate) fn verify_pkcs1v15(
    key: &RsaPublicKey,
    digest: DigestAlgorithm,
    message: &[u8],
    signature: &[u8],
) -> Result<()> {
    let signature = rsa::pkcs1v15::Signature::try_from(signature)
        .map_err(|e| ScepError::decoding(format!("malformed signature: {}", e)))?;
    let verified = match digest {
        DigestAlgorithm::Sha1 => rsa::pkcs1v15::VerifyingKey::<sha1::Sha1>::new(key.clone())
            .verify(message, &signature),
        DigestAlgorithm::Sha256 => rsa::pkcs1v15::VerifyingKey::<sha2::Sha256>::new(key.clone())
            .verify(message, &signature),
        DigestAlgorithm::Sha512 => rsa::pkcs1v15::VerifyingKey::<sha2::Sha512>::new(key.clone())
            .verify(message, &signature),
    };
    verified.map_err(|_| ScepError::decoding("pkiMessage verification failed."))
}

/// Extract the RSA public key from a certificate.
pub(crate) fn rsa_public_key(cert: &Certificate) -> Result<RsaPublicKey> {
    let spki_der = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(ScepError::Der)?;
    RsaPublicKey::from_public_key_der(&spki_der)
        .map_err(|e| ScepError::decoding(format!("not an RSA subject public key: {}", e)))
}

/// The IssuerAndSerialNumber identifying a certificate.
pub(crate) fn issuer_and_serial(cert: &Certificate) -> IssuerAndSerialNumber {
    IssuerAndSerialNumber {
        issuer: cert.tbs_certificate.issuer.clone(),
        serial_number: cert.tbs_certificate.serial_number.clone(),
    }
}

/// Build a single-valued CMS attribute.
pub(crate) fn attribute(oid: ObjectIdentifier, value: Any) -> Result<Attribute> {
    Ok(Attribute {
        oid,
        values: SetOfVec::try_from(vec![value])?,
    })
}

/// The `signingTime` attribute value for the current system time.
pub(crate) fn signing_time_now() -> Result<Any> {
    let time = GeneralizedTime::try_from(SystemTime::now())
        .map_err(|e| ScepError::crypto(format!("system clock out of range: {}", e)))?;
    Ok(Any::encode_from(&time)?)
}

/// Parse a DER ContentInfo wrapping a SignedData.
pub fn parse_signed_data(body: &[u8]) -> Result<SignedData> {
    let content_info = ContentInfo::from_der(body)
        .map_err(|e| ScepError::decoding(format!("failed to parse ContentInfo: {}", e)))?;

    if content_info.content_type != asn1::ID_SIGNED_DATA {
        return Err(ScepError::decoding(format!(
            "expected SignedData OID, got {}",
            content_info.content_type
        )));
    }

    let content = content_info
        .content
        .to_der()
        .map_err(|e| ScepError::decoding(format!("failed to encode content: {}", e)))?;

    SignedData::from_der(&content)
        .map_err(|e| ScepError::decoding(format!("failed to parse SignedData: {}", e)))
}

/// Wrap a SignedData in a ContentInfo and serialise to DER.
pub fn encode_signed_data(signed_data: &SignedData) -> Result<Vec<u8>> {
    let content_info = ContentInfo {
        content_type: asn1::ID_SIGNED_DATA,
        content: Any::encode_from(signed_data)?,
    };
    Ok(content_info.to_der()?)
}

/// Extract the X.509 certificates from a SignedData certificate set, in
/// iteration order. Non-X.509 entries are skipped.
pub fn certificates_from(signed_data: &SignedData) -> Vec<Certificate> {
    let cert_set = match &signed_data.certificates {
        Some(certs) => certs,
        None => return Vec::new(),
    };

    let mut certificates = Vec::new();
    for cert_choice in cert_set.0.iter() {
        match cert_choice {
            CertificateChoices::Certificate(cert) => certificates.push(cert.clone()),
            CertificateChoices::Other(_) => {
                tracing::warn!("skipping non-X.509 entry in certificate set");
            }
        }
    }
    certificates
}

fn certificate_set(certs: &[Certificate]) -> Result<CertificateSet> {
    let choices: Vec<CertificateChoices> = certs
        .iter()
        .cloned()
        .map(CertificateChoices::Certificate)
        .collect();
    Ok(CertificateSet(SetOfVec::try_from(choices)?))
}

fn absent_content() -> EncapsulatedContentInfo {
    EncapsulatedContentInfo {
        econtent_type: asn1::ID_DATA,
        econtent: None,
    }
}

/// Build a degenerate SignedData carrying a certificate set: no signer, no
/// content, certificates only.
pub fn degenerate_certificates(certs: &[Certificate]) -> Result<Vec<u8>> {
    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: Default::default(),
        encap_content_info: absent_content(),
        certificates: Some(certificate_set(certs)?),
        crls: None,
        signer_infos: SignerInfos(Default::default()),
    };
    encode_signed_data(&signed_data)
}

/// Build a degenerate SignedData carrying a CRL, or an empty CRL set when
/// the backend has none.
pub fn degenerate_crl(crl: Option<CertificateList>) -> Result<Vec<u8>> {
    let crls = match crl {
        Some(crl) => RevocationInfoChoices(SetOfVec::try_from(vec![RevocationInfoChoice::Crl(
            crl,
        )])?),
        None => RevocationInfoChoices(Default::default()),
    };
    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: Default::default(),
        encap_content_info: absent_content(),
        certificates: None,
        crls: Some(crls),
        signer_infos: SignerInfos(Default::default()),
    };
    encode_signed_data(&signed_data)
}

/// Build a SignedData carrying `certs` with a single signerInfo produced by
/// the server signing identity. Used for GetNextCACert, where the next-CA
/// chain must be authenticated by the current CA.
pub fn signed_certificates(
    certs: &[Certificate],
    signer_cert: &Certificate,
    signer_key: &RsaPrivateKey,
    digest: DigestAlgorithm,
) -> Result<Vec<u8>> {
    // Signed attributes cover the (absent, hence empty) content.
    let content_digest = digest.digest(&[]);

    let signed_attrs = SetOfVec::try_from(vec![
        attribute(asn1::CONTENT_TYPE, Any::encode_from(&asn1::ID_DATA)?)?,
        attribute(asn1::SIGNING_TIME, signing_time_now()?)?,
        attribute(
            asn1::MESSAGE_DIGEST,
            Any::encode_from(&OctetString::new(content_digest)?)?,
        )?,
    ])?;

    let signature = sign_pkcs1v15(signer_key, digest, &signed_attrs.to_der()?)?;

    let signer_info = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(issuer_and_serial(signer_cert)),
        digest_alg: digest.algorithm_identifier(),
        signed_attrs: Some(signed_attrs),
        signature_algorithm: AlgorithmIdentifierOwned {
            oid: asn1::RSA_ENCRYPTION,
            parameters: Some(Any::null()),
        },
        signature: OctetString::new(signature)?,
        unsigned_attrs: None,
    };

    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::try_from(vec![digest.algorithm_identifier()])?,
        encap_content_info: absent_content(),
        certificates: Some(certificate_set(certs)?),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info])?),
    };
    encode_signed_data(&signed_data)
}
