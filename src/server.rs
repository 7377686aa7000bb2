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

//! The SCEP request dispatcher.
//!
//! [`ScepServer`] is the single entry point of the crate: it receives the
//! method, query string and body of an HTTP request addressed to the SCEP
//! endpoint, routes it to the operation handler, and frames the response.
//! Embedding it in an actual HTTP server is the host's job; the dispatcher
//! itself is stateless and handles each request independently.

use base64::prelude::*;
use http::{Method, StatusCode};
use tracing::{debug, error, warn};
use url::form_urlencoded;
use x509_cert::Certificate;

use crate::ca::{CaBackend, CaError};
use crate::caps;
use crate::envelope::{ContentEncryptionAlgorithm, PkcsPkiEnvelopeDecoder, PkcsPkiEnvelopeEncoder};
use crate::error::{Result, ScepError};
use crate::message::{CertRep, PkiMessage, PkiMessageDecoder, PkiMessageEncoder};
use crate::signed_data::{
    certificates_from, degenerate_certificates, degenerate_crl, parse_signed_data,
    signed_certificates, DigestAlgorithm,
};
use crate::transaction::{FailInfo, Nonce};

/// Content type of GetCACaps responses.
pub const CONTENT_TYPE_TEXT: &str = "text/plain";
/// Content type of single-certificate GetCACert responses.
pub const CONTENT_TYPE_CA_CERT: &str = "application/x-x509-ca-cert";
/// Content type of multi-certificate GetCACert responses.
pub const CONTENT_TYPE_CA_RA_CERT: &str = "application/x-x509-ca-ra-cert";
/// Content type of GetNextCACert responses.
pub const CONTENT_TYPE_NEXT_CA_CERT: &str = "application/x-x509-next-ca-cert";
/// Content type of PKIOperation requests and responses.
pub const CONTENT_TYPE_PKI_MESSAGE: &str = "application/x-pki-message";

const ALLOW_GET: &str = "GET";
const ALLOW_GET_POST: &str = "GET, POST";

/// A SCEP operation, selected by the `operation` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Query the CA capability list.
    GetCaCaps,
    /// Retrieve the CA (or RA and CA) certificates.
    GetCaCert,
    /// Retrieve the next CA certificate chain ahead of a CA rollover.
    GetNextCaCert,
    /// Submit a signed-and-enveloped pkiMessage.
    PkiOperation,
}

impl Operation {
    /// Parse the `operation` query parameter, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        for op in [
            Self::GetCaCaps,
            Self::GetCaCert,
            Self::GetNextCaCert,
            Self::PkiOperation,
        ] {
            if value.eq_ignore_ascii_case(op.as_str()) {
                return Some(op);
            }
        }
        None
    }

    /// The canonical operation name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetCaCaps => "GetCACaps",
            Self::GetCaCert => "GetCACert",
            Self::GetNextCaCert => "GetNextCACert",
            Self::PkiOperation => "PKIOperation",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An HTTP request as seen by the dispatcher.
///
/// The query string is passed raw (percent-encoded); the dispatcher performs
/// its own parameter decoding, which the Base64 space-repair workaround
/// depends on.
#[derive(Debug, Clone)]
pub struct ScepRequest {
    /// The HTTP method.
    pub method: Method,
    /// The raw query string, without the leading `?`.
    pub query: String,
    /// The request body (empty for GET).
    pub body: Vec<u8>,
}

impl ScepRequest {
    /// Create a request from its parts.
    pub fn new(method: Method, query: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method,
            query: query.into(),
            body,
        }
    }

    /// Convenience constructor for a GET request.
    pub fn get(query: impl Into<String>) -> Self {
        Self::new(Method::GET, query, Vec::new())
    }

    /// Convenience constructor for a POST request.
    pub fn post(query: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new(Method::POST, query, body)
    }
}

/// An HTTP response produced by the dispatcher.
#[derive(Debug, Clone)]
pub struct ScepResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// Response headers (`Content-Type`, `Allow`).
    pub headers: Vec<(&'static str, String)>,
    /// The response body.
    pub body: Vec<u8>,
}

impl ScepResponse {
    fn ok(content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: vec![("Content-Type", content_type.to_owned())],
            body,
        }
    }

    fn plain_text(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            headers: vec![("Content-Type", CONTENT_TYPE_TEXT.to_owned())],
            body: body.as_bytes().to_vec(),
        }
    }

    fn method_not_allowed(allow: &'static str) -> Self {
        Self {
            status: StatusCode::METHOD_NOT_ALLOWED,
            headers: vec![("Allow", allow.to_owned())],
            body: Vec::new(),
        }
    }

    /// Look up a response header by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Content-encryption algorithm for reply envelopes.
    pub encryption_algorithm: ContentEncryptionAlgorithm,
    /// Digest algorithm for reply signatures.
    pub digest_algorithm: DigestAlgorithm,
    /// Whether to check pkiMessage signing times against the signer
    /// certificate validity window.
    pub check_signing_time: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            encryption_algorithm: ContentEncryptionAlgorithm::default(),
            digest_algorithm: DigestAlgorithm::default(),
            check_signing_time: true,
        }
    }
}

/// Builder for [`ScepServer`].
pub struct ScepServerBuilder<B> {
    backend: B,
    config: ServerConfig,
}

impl<B: CaBackend> ScepServerBuilder<B> {
    /// Select the content-encryption algorithm for reply envelopes.
    pub fn encryption_algorithm(mut self, algorithm: ContentEncryptionAlgorithm) -> Self {
        self.config.encryption_algorithm = algorithm;
        self
    }

    /// Select the digest algorithm for reply signatures.
    pub fn digest_algorithm(mut self, digest: DigestAlgorithm) -> Self {
        self.config.digest_algorithm = digest;
        self
    }

    /// Enable or disable the signing-time check (enabled by default).
    pub fn check_signing_time(mut self, check: bool) -> Self {
        self.config.check_signing_time = check;
        self
    }

    /// Build the server.
    pub fn build(self) -> ScepServer<B> {
        ScepServer {
            backend: self.backend,
            config: self.config,
        }
    }
}

/// The SCEP request dispatcher.
pub struct ScepServer<B> {
    backend: B,
    config: ServerConfig,
}

impl<B: CaBackend> ScepServer<B> {
    /// Create a dispatcher over `backend` with default configuration.
    pub fn new(backend: B) -> Self {
        Self::builder(backend).build()
    }

    /// Create a configuration builder over `backend`.
    pub fn builder(backend: B) -> ScepServerBuilder<B> {
        ScepServerBuilder {
            backend,
            config: ServerConfig::default(),
        }
    }

    /// Service one HTTP request.
    pub fn handle(&self, request: &ScepRequest) -> ScepResponse {
        match self.service(request) {
            Ok(response) => response,
            Err(err) => error_response(err),
        }
    }

    fn service(&self, request: &ScepRequest) -> Result<ScepResponse> {
        let (operation, message) = parse_query(&request.query)?;
        debug!(%operation, method = %request.method, "incoming operation");

        match operation {
            Operation::PkiOperation => {
                if request.method != Method::GET && request.method != Method::POST {
                    return Err(ScepError::MethodNotAllowed {
                        allow: ALLOW_GET_POST,
                    });
                }
            }
            _ => {
                if request.method != Method::GET {
                    return Err(ScepError::MethodNotAllowed { allow: ALLOW_GET });
                }
            }
        }

        let identifier = message.as_deref().unwrap_or("");
        match operation {
            Operation::GetCaCaps => self.get_ca_caps(identifier),
            Operation::GetCaCert => self.get_ca_cert(identifier),
            Operation::GetNextCaCert => self.get_next_ca_cert(identifier),
            Operation::PkiOperation => {
                let body = if request.method == Method::POST {
                    request.body.clone()
                } else {
                    decode_message_param(message.as_deref().unwrap_or(""))?
                };
                self.pki_operation(&body)
            }
        }
    }

    fn get_ca_caps(&self, identifier: &str) -> Result<ScepResponse> {
        let caps = self
            .backend
            .capabilities(identifier)
            .map_err(backend_error)?;
        Ok(ScepResponse::ok(
            CONTENT_TYPE_TEXT,
            caps::render(&caps).into_bytes(),
        ))
    }

    fn get_ca_cert(&self, identifier: &str) -> Result<ScepResponse> {
        let certs = self
            .backend
            .ca_certificates(identifier)
            .map_err(backend_error)?;

        if certs.is_empty() {
            warn!("no CA certificate configured");
            return Ok(ScepResponse::plain_text(
                StatusCode::INTERNAL_SERVER_ERROR,
                "GetCaCert failed to obtain CA from store",
            ));
        }
        if certs.len() == 1 {
            // A single certificate travels as raw DER, not as SignedData.
            let body = der::Encode::to_der(&certs[0])?;
            return Ok(ScepResponse::ok(CONTENT_TYPE_CA_CERT, body));
        }
        Ok(ScepResponse::ok(
            CONTENT_TYPE_CA_RA_CERT,
            degenerate_certificates(&certs)?,
        ))
    }

    fn get_next_ca_cert(&self, identifier: &str) -> Result<ScepResponse> {
        let certs = self
            .backend
            .next_ca_certificates(identifier)
            .map_err(backend_error)?;

        if certs.is_empty() {
            return Ok(ScepResponse::plain_text(
                StatusCode::NOT_IMPLEMENTED,
                "GetNextCACert Not Supported",
            ));
        }
        let body = signed_certificates(
            &certs,
            self.backend.signer_certificate(),
            self.backend.signer_key(),
            self.config.digest_algorithm,
        )?;
        Ok(ScepResponse::ok(CONTENT_TYPE_NEXT_CA_CERT, body))
    }

    fn pki_operation(&self, body: &[u8]) -> Result<ScepResponse> {
        let signed_data = parse_signed_data(body)?;
        let signer_cert = certificates_from(&signed_data)
            .into_iter()
            .next()
            .ok_or_else(|| ScepError::decoding("pkiMessage carries no signer certificate"))?;

        let envelope = PkcsPkiEnvelopeDecoder::new(
            self.backend.recipient_certificate().clone(),
            self.backend.recipient_key().clone(),
        );
        let mut decoder = PkiMessageDecoder::new(signer_cert.clone(), envelope);
        if !self.config.check_signing_time {
            decoder = decoder.without_signing_time_check();
        }
        let message = decoder.decode(body)?;

        let cert_rep = self.process(&message, &signer_cert)?;

        let envelope =
            PkcsPkiEnvelopeEncoder::with_algorithm(signer_cert, self.config.encryption_algorithm);
        let encoder = PkiMessageEncoder::new(
            self.backend.signer_key().clone(),
            self.backend.signer_certificate().clone(),
            envelope,
        )
        .with_chain(self.backend.signer_chain())
        .with_digest(self.config.digest_algorithm);

        let body = encoder.encode(&PkiMessage::CertRep(cert_rep))?;
        Ok(ScepResponse::ok(CONTENT_TYPE_PKI_MESSAGE, body))
    }

    /// Map a decoded request onto a CA operation and its outcome onto a
    /// CertRep.
    fn process(&self, message: &PkiMessage, signer_cert: &Certificate) -> Result<CertRep> {
        let transaction_id = message.transaction_id().clone();
        let sender_nonce = Nonce::generate();
        let recipient_nonce = message.sender_nonce().copied();

        let rep = match message {
            PkiMessage::GetCert {
                issuer_and_serial, ..
            } => {
                match self
                    .backend
                    .get_cert(&issuer_and_serial.issuer, &issuer_and_serial.serial_number)
                {
                    Ok(certs) if certs.is_empty() => CertRep::failure(
                        transaction_id,
                        sender_nonce,
                        recipient_nonce,
                        FailInfo::BadCertId,
                    ),
                    Ok(certs) => CertRep::success(
                        transaction_id,
                        sender_nonce,
                        recipient_nonce,
                        degenerate_certificates(&certs)?,
                    ),
                    Err(CaError::OperationFailure(fail_info)) => {
                        CertRep::failure(transaction_id, sender_nonce, recipient_nonce, fail_info)
                    }
                    Err(CaError::Other(reason)) => return Err(ScepError::backend(reason)),
                }
            }

            PkiMessage::GetCertInitial {
                issuer_and_subject, ..
            } => {
                match self.backend.get_cert_initial(
                    &issuer_and_subject.issuer,
                    &issuer_and_subject.subject,
                    &transaction_id,
                ) {
                    Ok(certs) if certs.is_empty() => {
                        CertRep::pending(transaction_id, sender_nonce, recipient_nonce)
                    }
                    Ok(certs) => CertRep::success(
                        transaction_id,
                        sender_nonce,
                        recipient_nonce,
                        degenerate_certificates(&certs)?,
                    ),
                    Err(CaError::OperationFailure(fail_info)) => {
                        CertRep::failure(transaction_id, sender_nonce, recipient_nonce, fail_info)
                    }
                    Err(CaError::Other(reason)) => return Err(ScepError::backend(reason)),
                }
            }

            PkiMessage::GetCrl {
                issuer_and_serial, ..
            } => {
                match self
                    .backend
                    .get_crl(&issuer_and_serial.issuer, &issuer_and_serial.serial_number)
                {
                    Ok(crl) => CertRep::success(
                        transaction_id,
                        sender_nonce,
                        recipient_nonce,
                        degenerate_crl(crl)?,
                    ),
                    Err(CaError::OperationFailure(fail_info)) => {
                        error!(%fail_info, "GetCRL refused");
                        CertRep::failure(transaction_id, sender_nonce, recipient_nonce, fail_info)
                    }
                    Err(CaError::Other(reason)) => return Err(ScepError::backend(reason)),
                }
            }

            PkiMessage::PkcsReq { csr, .. } | PkiMessage::RenewalReq { csr, .. } => {
                let result = match message {
                    PkiMessage::PkcsReq { .. } => {
                        self.backend.enrol(csr, signer_cert, &transaction_id)
                    }
                    _ => self.backend.renew(csr, signer_cert, &transaction_id),
                };
                match result {
                    Ok(certs) if certs.is_empty() => {
                        CertRep::pending(transaction_id, sender_nonce, recipient_nonce)
                    }
                    Ok(certs) => CertRep::success(
                        transaction_id,
                        sender_nonce,
                        recipient_nonce,
                        degenerate_certificates(&certs)?,
                    ),
                    Err(CaError::OperationFailure(fail_info)) => {
                        CertRep::failure(transaction_id, sender_nonce, recipient_nonce, fail_info)
                    }
                    Err(CaError::Other(reason)) => return Err(ScepError::backend(reason)),
                }
            }

            PkiMessage::CertRep(_) => {
                return Err(ScepError::decoding("unexpected CertRep in PKIOperation"));
            }
        };
        Ok(rep)
    }
}

/// Extract the `operation` and `message` query parameters.
fn parse_query(query: &str) -> Result<(Operation, Option<String>)> {
    let mut operation = None;
    let mut message = None;
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "operation" if operation.is_none() => operation = Some(value.into_owned()),
            "message" if message.is_none() => message = Some(value.into_owned()),
            _ => {}
        }
    }

    let operation = operation.ok_or(ScepError::MissingOperation)?;
    let operation = Operation::parse(&operation).ok_or(ScepError::InvalidOperation)?;
    Ok((operation, message))
}

/// Decode the Base64 `message` parameter of a PKIOperation GET.
///
/// Some clients (iOS MDM among them) URL-decode the Base64 before sending,
/// turning `+` into a space; spaces are folded back before decoding.
fn decode_message_param(message: &str) -> Result<Vec<u8>> {
    if message.is_empty() {
        return Ok(Vec::new());
    }
    let repaired = message.replace(' ', "+");
    BASE64_STANDARD
        .decode(repaired.as_bytes())
        .map_err(ScepError::InvalidMessage)
}

fn backend_error(err: CaError) -> ScepError {
    match err {
        CaError::OperationFailure(fail_info) => {
            // Non-PKIOperation handlers have no CertRep to carry a failInfo.
            ScepError::backend(format!("operation failed: {}", fail_info))
        }
        CaError::Other(reason) => ScepError::backend(reason),
    }
}

fn error_response(err: ScepError) -> ScepResponse {
    match &err {
        ScepError::MissingOperation | ScepError::InvalidOperation | ScepError::InvalidMessage(_) => {
            ScepResponse::plain_text(StatusCode::BAD_REQUEST, &err.to_string())
        }
        ScepError::MethodNotAllowed { allow } => ScepResponse::method_not_allowed(*allow),
        ScepError::MessageDecoding(reason) => {
            warn!(%reason, "failed to decode pkiMessage");
            ScepResponse::plain_text(StatusCode::INTERNAL_SERVER_ERROR, "pkiMessage decoding failed")
        }
        _ => {
            error!(error = %err, "failed to service request");
            ScepResponse::plain_text(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    }
}
