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

//! pkiMessage decoding.
//!
//! Verifies the outer SignedData against the request signer certificate,
//! reads the SCEP signed attributes, decrypts the inner EnvelopedData, and
//! parses the payload into a typed [`PkiMessage`].

use cms::cert::IssuerAndSerialNumber;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use der::asn1::{ObjectIdentifier, OctetString, OctetStringRef, PrintableStringRef};
use der::{Any, Decode, Encode};
use std::time::SystemTime;
use tracing::{debug, warn};
use x509_cert::attr::Attribute;
use x509_cert::request::CertReq;
use x509_cert::time::Time;
use x509_cert::Certificate;

use crate::asn1::{self, IssuerAndSubject};
use crate::envelope::PkcsPkiEnvelopeDecoder;
use crate::error::{Result, ScepError};
use crate::message::{CertRep, CertRepOutcome, PkiMessage};
use crate::signed_data::{
    issuer_and_serial, parse_signed_data, rsa_public_key, verify_pkcs1v15, DigestAlgorithm,
};
use crate::transaction::{FailInfo, MessageType, Nonce, PkiStatus, TransactionId};

/// Decodes signed-and-enveloped CMS objects into typed pkiMessages.
pub struct PkiMessageDecoder {
    signer: Certificate,
    envelope: PkcsPkiEnvelopeDecoder,
    check_signing_time: bool,
}

impl PkiMessageDecoder {
    /// Create a decoder that verifies signatures against `signer` and
    /// decrypts content with `envelope`. Signing-time checking defaults on.
    pub fn new(signer: Certificate, envelope: PkcsPkiEnvelopeDecoder) -> Self {
        Self {
            signer,
            envelope,
            check_signing_time: true,
        }
    }

    /// Disable the signed-attribute signing-time check against the signer
    /// certificate validity window.
    pub fn without_signing_time_check(mut self) -> Self {
        self.check_signing_time = false;
        self
    }

    /// Decode the DER of a pkiMessage ContentInfo.
    pub fn decode(&self, body: &[u8]) -> Result<PkiMessage> {
        debug!("decoding pkiMessage");
        let signed_data = parse_signed_data(body)?;

        let signer_info = self.sole_signer_info(&signed_data)?;
        let digest = DigestAlgorithm::from_oid(signer_info.digest_alg.oid).ok_or_else(|| {
            ScepError::decoding(format!(
                "unsupported digest algorithm {}",
                signer_info.digest_alg.oid
            ))
        })?;
        let signed_attrs = signer_info
            .signed_attrs
            .as_ref()
            .ok_or_else(|| ScepError::decoding("pkiMessage has no signed attributes"))?;
        let attrs: Vec<&Attribute> = signed_attrs.iter().collect();

        if self.check_signing_time {
            self.verify_signing_time(&attrs)?;
        }

        let content = encapsulated_content(&signed_data)?;

        // The messageDigest attribute covers the encapsulated content (empty
        // for content-free replies); the signature covers the attribute set.
        let expected_digest = digest.digest(content.as_deref().unwrap_or(&[]));
        let message_digest = octets_attr(&attrs, asn1::MESSAGE_DIGEST)?
            .ok_or_else(|| ScepError::decoding("missing messageDigest attribute"))?;
        if message_digest != expected_digest {
            warn!("pkiMessage content digest mismatch");
            return Err(ScepError::decoding("pkiMessage verification failed."));
        }

        let public_key = rsa_public_key(&self.signer)?;
        verify_pkcs1v15(
            &public_key,
            digest,
            &signed_attrs.to_der()?,
            signer_info.signature.as_bytes(),
        )?;
        debug!("pkiMessage verified");

        let message_type_value = printable_u32_attr(&attrs, asn1::MESSAGE_TYPE)?
            .ok_or_else(|| ScepError::decoding("missing messageType attribute"))?;
        let message_type = MessageType::from_value(message_type_value)
            .ok_or_else(|| ScepError::decoding("unknown messageType"))?;
        let transaction_id = printable_attr(&attrs, asn1::TRANS_ID)?
            .map(|s| TransactionId::new(s.into_bytes()))
            .ok_or_else(|| ScepError::decoding("missing transactionID attribute"))?;
        // Some clients omit the sender nonce.
        let sender_nonce = nonce_attr(&attrs, asn1::SENDER_NONCE)?;

        debug!(%message_type, %transaction_id, "pkiMessage attributes read");

        if message_type == MessageType::CertRep {
            return self.decode_cert_rep(transaction_id, sender_nonce, &attrs, content);
        }

        let content =
            content.ok_or_else(|| ScepError::decoding("pkiMessage has no enveloped content"))?;
        let payload = self.envelope.decode(&content)?;

        let message = match message_type {
            MessageType::GetCert => PkiMessage::GetCert {
                transaction_id,
                sender_nonce,
                issuer_and_serial: IssuerAndSerialNumber::from_der(&payload)
                    .map_err(|e| ScepError::decoding(format!("malformed IssuerAndSerialNumber: {}", e)))?,
            },
            MessageType::GetCrl => PkiMessage::GetCrl {
                transaction_id,
                sender_nonce,
                issuer_and_serial: IssuerAndSerialNumber::from_der(&payload)
                    .map_err(|e| ScepError::decoding(format!("malformed IssuerAndSerialNumber: {}", e)))?,
            },
            MessageType::GetCertInitial => PkiMessage::GetCertInitial {
                transaction_id,
                sender_nonce,
                issuer_and_subject: IssuerAndSubject::from_der(&payload)
                    .map_err(|e| ScepError::decoding(format!("malformed IssuerAndSubject: {}", e)))?,
            },
            MessageType::PkcsReq | MessageType::RenewalReq => {
                let csr = CertReq::from_der(&payload).map_err(|e| {
                    ScepError::decoding(format!("malformed CertificationRequest: {}", e))
                })?;
                if message_type == MessageType::PkcsReq {
                    PkiMessage::PkcsReq {
                        transaction_id,
                        sender_nonce,
                        csr: Box::new(csr),
                    }
                } else {
                    PkiMessage::RenewalReq {
                        transaction_id,
                        sender_nonce,
                        csr: Box::new(csr),
                    }
                }
            }
            MessageType::CertRep => unreachable!("handled above"),
        };

        debug!("finished decoding pkiMessage");
        Ok(message)
    }

    fn decode_cert_rep(
        &self,
        transaction_id: TransactionId,
        sender_nonce: Option<Nonce>,
        attrs: &[&Attribute],
        content: Option<Vec<u8>>,
    ) -> Result<PkiMessage> {
        let status_value = printable_u32_attr(attrs, asn1::PKI_STATUS)?
            .ok_or_else(|| ScepError::decoding("missing pkiStatus attribute"))?;
        let status = PkiStatus::from_value(status_value)
            .ok_or_else(|| ScepError::decoding("unknown pkiStatus"))?;
        let recipient_nonce = nonce_attr(attrs, asn1::RECIPIENT_NONCE)?
            .ok_or_else(|| ScepError::decoding("missing recipientNonce attribute"))?;

        let outcome = match status {
            PkiStatus::Failure => {
                let fail_info_value = printable_u32_attr(attrs, asn1::FAIL_INFO)?
                    .ok_or_else(|| ScepError::decoding("missing failInfo attribute"))?;
                let fail_info = FailInfo::from_value(fail_info_value)
                    .ok_or_else(|| ScepError::decoding("unknown failInfo"))?;
                CertRepOutcome::Failure(fail_info)
            }
            PkiStatus::Pending => CertRepOutcome::Pending,
            PkiStatus::Success => {
                let content = content
                    .ok_or_else(|| ScepError::decoding("CertRep SUCCESS has no content"))?;
                let message_data = self.envelope.decode(&content)?;
                // The message data must itself be a SignedData.
                parse_signed_data(&message_data)?;
                CertRepOutcome::Success(message_data)
            }
        };

        debug!("finished decoding pkiMessage");
        Ok(PkiMessage::CertRep(CertRep {
            transaction_id,
            sender_nonce,
            recipient_nonce: Some(recipient_nonce),
            outcome,
        }))
    }

    /// SCEP pkiMessages carry exactly one signerInfo, and its identifier
    /// must match the request signer certificate.
    fn sole_signer_info<'a>(&self, signed_data: &'a SignedData) -> Result<&'a SignerInfo> {
        let mut iter = signed_data.signer_infos.0.iter();
        let signer_info = iter
            .next()
            .ok_or_else(|| ScepError::decoding("pkiMessage has no signerInfo"))?;
        if iter.next().is_some() {
            return Err(ScepError::decoding("pkiMessage has multiple signerInfos"));
        }

        let expected = issuer_and_serial(&self.signer);
        match &signer_info.sid {
            SignerIdentifier::IssuerAndSerialNumber(iasn) if *iasn == expected => Ok(signer_info),
            _ => Err(ScepError::decoding(format!(
                "could not find signerInfo for {}",
                self.signer.tbs_certificate.subject
            ))),
        }
    }

    /// Reject messages whose signing time falls outside the signer
    /// certificate validity window. Absence of the attribute is tolerated.
    fn verify_signing_time(&self, attrs: &[&Attribute]) -> Result<()> {
        let Some(value) = first_value(attrs, asn1::SIGNING_TIME) else {
            return Ok(());
        };
        let der_bytes = value
            .to_der()
            .map_err(|e| ScepError::decoding(format!("malformed signingTime: {}", e)))?;
        let signing_time: SystemTime = Time::from_der(&der_bytes)
            .map_err(|e| ScepError::decoding(format!("malformed signingTime: {}", e)))?
            .to_system_time();

        let validity = &self.signer.tbs_certificate.validity;
        let not_before = validity.not_before.to_system_time();
        let not_after = validity.not_after.to_system_time();
        if signing_time < not_before || signing_time > not_after {
            return Err(ScepError::decoding(
                "signing time outside signer certificate validity",
            ));
        }
        Ok(())
    }
}

/// The encapsulated content octets, when present.
fn encapsulated_content(signed_data: &SignedData) -> Result<Option<Vec<u8>>> {
    match &signed_data.encap_content_info.econtent {
        Some(any) => {
            let octets = any
                .decode_as::<OctetString>()
                .map_err(|e| ScepError::decoding(format!("malformed eContent: {}", e)))?;
            Ok(Some(octets.as_bytes().to_vec()))
        }
        None => Ok(None),
    }
}

fn first_value<'a>(attrs: &[&'a Attribute], oid: ObjectIdentifier) -> Option<&'a Any> {
    attrs
        .iter()
        .find(|attr| attr.oid == oid)
        .and_then(|attr| attr.values.iter().next())
}

fn printable_attr(attrs: &[&Attribute], oid: ObjectIdentifier) -> Result<Option<String>> {
    match first_value(attrs, oid) {
        Some(value) => {
            let string = value
                .decode_as::<PrintableStringRef<'_>>()
                .map_err(|e| ScepError::decoding(format!("attribute {} malformed: {}", oid, e)))?;
            Ok(Some(string.as_str().to_owned()))
        }
        None => Ok(None),
    }
}

fn printable_u32_attr(attrs: &[&Attribute], oid: ObjectIdentifier) -> Result<Option<u32>> {
    match printable_attr(attrs, oid)? {
        Some(string) => {
            let value = string.parse::<u32>().map_err(|_| {
                ScepError::decoding(format!("attribute {} is not a decimal value", oid))
            })?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

fn octets_attr(attrs: &[&Attribute], oid: ObjectIdentifier) -> Result<Option<Vec<u8>>> {
    match first_value(attrs, oid) {
        Some(value) => {
            let octets = value
                .decode_as::<OctetStringRef<'_>>()
                .map_err(|e| ScepError::decoding(format!("attribute {} malformed: {}", oid, e)))?;
            Ok(Some(octets.as_bytes().to_vec()))
        }
        None => Ok(None),
    }
}

fn nonce_attr(attrs: &[&Attribute], oid: ObjectIdentifier) -> Result<Option<Nonce>> {
    match octets_attr(attrs, oid)? {
        Some(bytes) => {
            let nonce = Nonce::from_bytes(&bytes)
                .ok_or_else(|| ScepError::decoding("nonce is not 16 bytes"))?;
            Ok(Some(nonce))
        }
        None => Ok(None),
    }
}
