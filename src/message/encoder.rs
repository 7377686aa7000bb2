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

//! pkiMessage encoding.
//!
//! Serialises a typed [`PkiMessage`] into a signed (and, when the message
//! carries content, enveloped) CMS object. The server uses this to produce
//! `CertRep` replies; the same encoder produces request messages, which is
//! what the integration tests drive the dispatcher with.

use cms::content_info::CmsVersion;
use cms::signed_data::{
    EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo, SignerInfos,
};
use der::asn1::{OctetString, PrintableString, SetOfVec};
use der::{Any, Encode};
use rsa::RsaPrivateKey;
use spki::AlgorithmIdentifierOwned;
use tracing::debug;
use x509_cert::attr::Attribute;
use x509_cert::Certificate;

use crate::asn1;
use crate::envelope::PkcsPkiEnvelopeEncoder;
use crate::error::{Result, ScepError};
use crate::message::{CertRepOutcome, PkiMessage};
use crate::signed_data::{
    attribute, encode_signed_data, issuer_and_serial, sign_pkcs1v15, signing_time_now,
    DigestAlgorithm,
};
use crate::transaction::Nonce;

/// Encodes typed pkiMessages as signed-and-enveloped CMS objects.
pub struct PkiMessageEncoder {
    signer_key: RsaPrivateKey,
    certificates: Vec<Certificate>,
    envelope: PkcsPkiEnvelopeEncoder,
    digest: DigestAlgorithm,
}

impl PkiMessageEncoder {
    /// Create an encoder signing with `signer_key` / `signer_cert` and
    /// enveloping content with `envelope`.
    pub fn new(
        signer_key: RsaPrivateKey,
        signer_cert: Certificate,
        envelope: PkcsPkiEnvelopeEncoder,
    ) -> Self {
        Self {
            signer_key,
            certificates: vec![signer_cert],
            envelope,
            digest: DigestAlgorithm::default(),
        }
    }

    /// Replace the certificate set with a full signing chain. The first
    /// certificate must be the signer.
    pub fn with_chain(mut self, chain: Vec<Certificate>) -> Self {
        if !chain.is_empty() {
            self.certificates = chain;
        }
        self
    }

    /// Select the digest algorithm used for the signature.
    pub fn with_digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    /// Encode `message`, returning the DER of the outer ContentInfo.
    pub fn encode(&self, message: &PkiMessage) -> Result<Vec<u8>> {
        debug!(message_type = %message.message_type(), "encoding pkiMessage");

        let payload = self.payload(message)?;
        let content = match payload {
            Some(bytes) => Some(self.envelope.encode(&bytes)?),
            None => None,
        };

        let signed_attrs = self.signed_attributes(message, content.as_deref())?;
        let signature = sign_pkcs1v15(&self.signer_key, self.digest, &signed_attrs.to_der()?)?;

        let signer_cert = self
            .certificates
            .first()
            .ok_or_else(|| ScepError::encoding("encoder has no signer certificate"))?;

        let signer_info = SignerInfo {
            version: CmsVersion::V1,
            sid: SignerIdentifier::IssuerAndSerialNumber(issuer_and_serial(signer_cert)),
            digest_alg: self.digest.algorithm_identifier(),
            signed_attrs: Some(signed_attrs),
            signature_algorithm: AlgorithmIdentifierOwned {
                oid: asn1::RSA_ENCRYPTION,
                parameters: Some(Any::null()),
            },
            signature: OctetString::new(signature)?,
            unsigned_attrs: None,
        };

        let econtent = match content {
            Some(bytes) => Some(Any::encode_from(&OctetString::new(bytes)?)?),
            None => None,
        };

        let cert_choices: Vec<cms::cert::CertificateChoices> = self
            .certificates
            .iter()
            .cloned()
            .map(cms::cert::CertificateChoices::Certificate)
            .collect();

        let signed_data = SignedData {
            version: CmsVersion::V1,
            digest_algorithms: SetOfVec::try_from(vec![self.digest.algorithm_identifier()])?,
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: asn1::ID_DATA,
                econtent,
            },
            certificates: Some(cms::signed_data::CertificateSet(SetOfVec::try_from(
                cert_choices,
            )?)),
            crls: None,
            signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info])?),
        };

        encode_signed_data(&signed_data)
    }

    /// The plaintext payload of `message`, or `None` when the message
    /// carries no content (CertRep PENDING and FAILURE).
    fn payload(&self, message: &PkiMessage) -> Result<Option<Vec<u8>>> {
        let bytes = match message {
            PkiMessage::PkcsReq { csr, .. } | PkiMessage::RenewalReq { csr, .. } => {
                Some(csr.to_der()?)
            }
            PkiMessage::GetCert {
                issuer_and_serial, ..
            }
            | PkiMessage::GetCrl {
                issuer_and_serial, ..
            } => Some(issuer_and_serial.to_der()?),
            PkiMessage::GetCertInitial {
                issuer_and_subject, ..
            } => Some(issuer_and_subject.to_der()?),
            PkiMessage::CertRep(rep) => match &rep.outcome {
                CertRepOutcome::Success(message_data) => Some(message_data.clone()),
                CertRepOutcome::Pending | CertRepOutcome::Failure(_) => None,
            },
        };
        Ok(bytes)
    }

    /// Build the SCEP signed-attribute set for `message`.
    fn signed_attributes(
        &self,
        message: &PkiMessage,
        content: Option<&[u8]>,
    ) -> Result<SetOfVec<Attribute>> {
        let content_digest = self.digest.digest(content.unwrap_or(&[]));

        let mut attrs = vec![
            attribute(asn1::CONTENT_TYPE, Any::encode_from(&asn1::ID_DATA)?)?,
            attribute(asn1::SIGNING_TIME, signing_time_now()?)?,
            attribute(
                asn1::MESSAGE_DIGEST,
                Any::encode_from(&OctetString::new(content_digest)?)?,
            )?,
            attribute(
                asn1::MESSAGE_TYPE,
                printable(&message.message_type().value().to_string())?,
            )?,
            attribute(
                asn1::TRANS_ID,
                printable(transaction_id_str(message)?)?,
            )?,
        ];

        if let Some(nonce) = message.sender_nonce() {
            attrs.push(attribute(asn1::SENDER_NONCE, nonce_value(nonce)?)?);
        }

        if let PkiMessage::CertRep(rep) = message {
            if let Some(nonce) = &rep.recipient_nonce {
                attrs.push(attribute(asn1::RECIPIENT_NONCE, nonce_value(nonce)?)?);
            }
            attrs.push(attribute(
                asn1::PKI_STATUS,
                printable(&rep.status().value().to_string())?,
            )?);
            if let Some(fail_info) = rep.fail_info() {
                attrs.push(attribute(
                    asn1::FAIL_INFO,
                    printable(&fail_info.value().to_string())?,
                )?);
            }
        }

        Ok(SetOfVec::try_from(attrs)?)
    }
}

fn printable(value: &str) -> Result<Any> {
    let string = PrintableString::new(value)
        .map_err(|e| ScepError::encoding(format!("value not a PrintableString: {}", e)))?;
    Ok(Any::encode_from(&string)?)
}

fn transaction_id_str(message: &PkiMessage) -> Result<&str> {
    std::str::from_utf8(message.transaction_id().as_bytes())
        .map_err(|_| ScepError::encoding("transaction id is not printable"))
}

fn nonce_value(nonce: &Nonce) -> Result<Any> {
    Ok(Any::encode_from(&OctetString::new(nonce.as_bytes())?)?)
}
