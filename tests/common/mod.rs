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

//! Shared fixtures: a throwaway in-memory CA, certificate and CSR builders,
//! and a SCEP client side built from the crate's own codec.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use der::asn1::{BitString, PrintableString, PrintableStringRef, SetOfVec};
use der::{Any, Decode, Encode};
use rand::rngs::OsRng;
use rsa::pkcs8::EncodePublicKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::{RsaPrivateKey, RsaPublicKey};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::attr::Attribute;
use x509_cert::certificate::{TbsCertificate, Version};
use x509_cert::crl::CertificateList;
use x509_cert::name::Name;
use x509_cert::request::{CertReq, CertReqInfo};
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::{Time, Validity};
use x509_cert::Certificate;

use scep_server::asn1::CHALLENGE_PASSWORD;
use scep_server::ca::{CaBackend, CaError, CaResult};
use scep_server::envelope::{
    ContentEncryptionAlgorithm, PkcsPkiEnvelopeDecoder, PkcsPkiEnvelopeEncoder,
};
use scep_server::message::{PkiMessageDecoder, PkiMessageEncoder};
use scep_server::transaction::TransactionId;
use scep_server::Capability;

/// Small keys keep the fixtures cheap.
const KEY_BITS: usize = 1024;

const SHA256_WITH_RSA: der::asn1::ObjectIdentifier =
    der::asn1::ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

pub fn generate_key() -> RsaPrivateKey {
    RsaPrivateKey::new(&mut OsRng, KEY_BITS).expect("generate RSA key")
}

fn rsa_with_sha256() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: SHA256_WITH_RSA,
        parameters: Some(Any::null()),
    }
}

fn spki_for(key: &RsaPublicKey) -> SubjectPublicKeyInfoOwned {
    let der = key.to_public_key_der().expect("encode public key");
    SubjectPublicKeyInfoOwned::from_der(der.as_bytes()).expect("parse public key")
}

fn sign_sha256(key: &RsaPrivateKey, message: &[u8]) -> Vec<u8> {
    rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(key.clone())
        .sign(message)
        .to_vec()
}

/// Issue a v1 certificate. `signing_key` belongs to the issuer; for a
/// self-signed certificate pass the subject's own key and name twice.
pub fn issue_cert(
    subject: &str,
    issuer: &str,
    serial: u32,
    subject_key: &RsaPublicKey,
    signing_key: &RsaPrivateKey,
    validity: Validity,
) -> Certificate {
    let tbs = TbsCertificate {
        version: Version::V1,
        serial_number: SerialNumber::from(serial),
        signature: rsa_with_sha256(),
        issuer: Name::from_str(issuer).expect("issuer name"),
        validity,
        subject: Name::from_str(subject).expect("subject name"),
        subject_public_key_info: spki_for(subject_key),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: None,
    };
    let signature = sign_sha256(signing_key, &tbs.to_der().expect("encode tbs"));
    Certificate {
        tbs_certificate: tbs,
        signature_algorithm: rsa_with_sha256(),
        signature: BitString::from_bytes(&signature).expect("signature bits"),
    }
}

pub fn validity_hours(hours: u64) -> Validity {
    Validity::from_now(Duration::from_secs(hours * 3600)).expect("validity")
}

/// A validity window that ended an hour ago.
pub fn expired_validity() -> Validity {
    let now = SystemTime::now();
    Validity {
        not_before: Time::try_from(now - Duration::from_secs(7200)).expect("not before"),
        not_after: Time::try_from(now - Duration::from_secs(3600)).expect("not after"),
    }
}

/// Build a PKCS#10 request, optionally carrying a challengePassword.
pub fn build_csr(
    subject: &str,
    subject_key: &RsaPublicKey,
    signing_key: &RsaPrivateKey,
    challenge_password: Option<&str>,
) -> CertReq {
    let mut attributes: Vec<Attribute> = Vec::new();
    if let Some(password) = challenge_password {
        let value = PrintableString::new(password).expect("printable password");
        attributes.push(Attribute {
            oid: CHALLENGE_PASSWORD,
            values: SetOfVec::try_from(vec![Any::encode_from(&value).expect("encode password")])
                .expect("password values"),
        });
    }

    let info = CertReqInfo {
        version: x509_cert::request::Version::V1,
        subject: Name::from_str(subject).expect("subject name"),
        public_key: spki_for(subject_key),
        attributes: SetOfVec::try_from(attributes).expect("attributes"),
    };
    let signature = sign_sha256(signing_key, &info.to_der().expect("encode info"));
    CertReq {
        info,
        algorithm: rsa_with_sha256(),
        signature: BitString::from_bytes(&signature).expect("signature bits"),
    }
}

fn challenge_password_of(csr: &CertReq) -> Option<String> {
    for attr in csr.info.attributes.iter() {
        if attr.oid == CHALLENGE_PASSWORD {
            let value = attr.values.iter().next()?;
            let password = value.decode_as::<PrintableStringRef<'_>>().ok()?;
            return Some(password.as_str().to_owned());
        }
    }
    None
}

/// The in-memory CA used by the integration tests.
///
/// CN=Example with a correct challenge password enrols immediately,
/// CN=Poll stays pending, anything without a password is refused, and the
/// `bad` identifier disables GetNextCACert.
pub struct TestCa {
    key: RsaPrivateKey,
    cert: Certificate,
    ra_cert: Option<Certificate>,
    ca_name: String,
    poll_subject: Name,
    next_serial: Mutex<u32>,
}

pub const CA_NAME: &str = "CN=Example CA";
pub const GOOD_PASSWORD: &str = "password";
pub const BAD_IDENTIFIER: &str = "bad";

impl Clone for TestCa {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            cert: self.cert.clone(),
            ra_cert: self.ra_cert.clone(),
            ca_name: self.ca_name.clone(),
            poll_subject: self.poll_subject.clone(),
            next_serial: Mutex::new(*self.next_serial.lock().expect("serial lock")),
        }
    }
}

impl TestCa {
    pub fn new() -> Self {
        let key = generate_key();
        let cert = issue_cert(
            CA_NAME,
            CA_NAME,
            100,
            &RsaPublicKey::from(&key),
            &key,
            validity_hours(24),
        );
        Self {
            key,
            cert,
            ra_cert: None,
            ca_name: CA_NAME.to_owned(),
            poll_subject: Name::from_str("CN=Poll").expect("poll name"),
            next_serial: Mutex::new(101),
        }
    }

    /// Add an RA certificate, making GetCACert return an RA+CA pair.
    pub fn with_ra(mut self) -> Self {
        let ra_key = generate_key();
        let ra_cert = issue_cert(
            "CN=Example RA",
            CA_NAME,
            99,
            &RsaPublicKey::from(&ra_key),
            &self.key,
            validity_hours(24),
        );
        self.ra_cert = Some(ra_cert);
        self
    }

    pub fn certificate(&self) -> Certificate {
        self.cert.clone()
    }

    fn issue_from_csr(&self, csr: &CertReq) -> CaResult<Vec<Certificate>> {
        let subject = csr.info.subject.to_string();
        let spki_der = csr
            .info
            .public_key
            .to_der()
            .map_err(|e| CaError::other(e.to_string()))?;
        let subject_key: RsaPublicKey =
            rsa::pkcs8::DecodePublicKey::from_public_key_der(&spki_der)
                .map_err(|e| CaError::other(format!("CSR public key: {}", e)))?;

        let serial = {
            let mut guard = self.next_serial.lock().expect("serial lock");
            let serial = *guard;
            *guard += 1;
            serial
        };
        let issued = issue_cert(
            &subject,
            &self.ca_name,
            serial,
            &subject_key,
            &self.key,
            validity_hours(24),
        );
        Ok(vec![issued, self.cert.clone()])
    }
}

impl CaBackend for TestCa {
    fn capabilities(&self, _identifier: &str) -> CaResult<BTreeSet<Capability>> {
        Ok(BTreeSet::from([
            Capability::GetNextCaCert,
            Capability::PostPkiOperation,
            Capability::Renewal,
            Capability::Sha256,
            Capability::TripleDes,
            Capability::Aes,
            Capability::ScepStandard,
        ]))
    }

    fn ca_certificates(&self, _identifier: &str) -> CaResult<Vec<Certificate>> {
        match &self.ra_cert {
            Some(ra) => Ok(vec![ra.clone(), self.cert.clone()]),
            None => Ok(vec![self.cert.clone()]),
        }
    }

    fn next_ca_certificates(&self, identifier: &str) -> CaResult<Vec<Certificate>> {
        if identifier == BAD_IDENTIFIER {
            return Ok(Vec::new());
        }
        Ok(vec![self.cert.clone()])
    }

    fn get_cert(&self, _issuer: &Name, serial: &SerialNumber) -> CaResult<Vec<Certificate>> {
        if *serial == SerialNumber::from(0u32) {
            return Ok(Vec::new());
        }
        Ok(vec![self.cert.clone()])
    }

    fn get_cert_initial(
        &self,
        _issuer: &Name,
        subject: &Name,
        _transaction_id: &TransactionId,
    ) -> CaResult<Vec<Certificate>> {
        if *subject == self.poll_subject {
            return Ok(Vec::new());
        }
        Ok(vec![self.cert.clone()])
    }

    fn get_crl(&self, _issuer: &Name, _serial: &SerialNumber) -> CaResult<Option<CertificateList>> {
        Ok(None)
    }

    fn enrol(
        &self,
        csr: &CertReq,
        _signer: &Certificate,
        _transaction_id: &TransactionId,
    ) -> CaResult<Vec<Certificate>> {
        if csr.info.subject == self.poll_subject {
            return Ok(Vec::new());
        }
        match challenge_password_of(csr) {
            Some(password) if password == GOOD_PASSWORD => self.issue_from_csr(csr),
            _ => Err(CaError::OperationFailure(
                scep_server::FailInfo::BadRequest,
            )),
        }
    }

    fn renew(
        &self,
        csr: &CertReq,
        _signer: &Certificate,
        _transaction_id: &TransactionId,
    ) -> CaResult<Vec<Certificate>> {
        // Renewal is authenticated by the existing certificate, not by a
        // challenge password.
        self.issue_from_csr(csr)
    }

    fn recipient_certificate(&self) -> &Certificate {
        &self.cert
    }

    fn recipient_key(&self) -> &RsaPrivateKey {
        &self.key
    }

    fn signer_certificate(&self) -> &Certificate {
        &self.cert
    }

    fn signer_key(&self) -> &RsaPrivateKey {
        &self.key
    }

    fn signer_chain(&self) -> Vec<Certificate> {
        vec![self.cert.clone()]
    }
}

/// The client side of a SCEP exchange, built from the crate's own codec.
pub struct TestClient {
    pub key: RsaPrivateKey,
    pub cert: Certificate,
    recipient: Certificate,
    algorithm: ContentEncryptionAlgorithm,
}

impl TestClient {
    /// A client with a fresh key and a self-signed CN=Example certificate.
    pub fn new(recipient: Certificate) -> Self {
        Self::with_subject("CN=Example", recipient)
    }

    pub fn with_subject(subject: &str, recipient: Certificate) -> Self {
        let key = generate_key();
        let cert = issue_cert(
            subject,
            subject,
            1,
            &RsaPublicKey::from(&key),
            &key,
            validity_hours(24),
        );
        Self {
            key,
            cert,
            recipient,
            algorithm: ContentEncryptionAlgorithm::DesEde3Cbc,
        }
    }

    /// Re-key the client onto an issued certificate (renewal flows).
    pub fn with_identity(key: RsaPrivateKey, cert: Certificate, recipient: Certificate) -> Self {
        Self {
            key,
            cert,
            recipient,
            algorithm: ContentEncryptionAlgorithm::DesEde3Cbc,
        }
    }

    pub fn with_algorithm(mut self, algorithm: ContentEncryptionAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Encoder producing request pkiMessages addressed to the server.
    pub fn encoder(&self) -> PkiMessageEncoder {
        PkiMessageEncoder::new(
            self.key.clone(),
            self.cert.clone(),
            PkcsPkiEnvelopeEncoder::with_algorithm(self.recipient.clone(), self.algorithm),
        )
    }

    /// Decoder for CertRep replies signed by `server_signer`.
    pub fn decoder(&self, server_signer: Certificate) -> PkiMessageDecoder {
        PkiMessageDecoder::new(
            server_signer,
            PkcsPkiEnvelopeDecoder::new(self.cert.clone(), self.key.clone()),
        )
    }
}
