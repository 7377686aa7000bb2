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

//! The CA backend contract.
//!
//! All certificate-issuance policy lives behind [`CaBackend`]: which CSRs to
//! accept, how to sign them, what to return for lookups, and where pending
//! enrolments are stored. The SCEP core only translates between pkiMessages
//! and these calls.

use std::collections::BTreeSet;

use rsa::RsaPrivateKey;
use thiserror::Error;
use x509_cert::crl::CertificateList;
use x509_cert::name::Name;
use x509_cert::request::CertReq;
use x509_cert::serial_number::SerialNumber;
use x509_cert::Certificate;

use crate::caps::Capability;
use crate::transaction::{FailInfo, TransactionId};

/// Errors raised by a [`CaBackend`].
#[derive(Debug, Error)]
pub enum CaError {
    /// Domain refusal: mapped to a `CertRep` FAILURE carrying the failInfo.
    #[error("operation failed: {0}")]
    OperationFailure(FailInfo),

    /// Infrastructure fault: surfaced as an HTTP 500 without a `CertRep`.
    #[error("{0}")]
    Other(String),
}

impl CaError {
    /// Create an infrastructure fault with the given reason.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Result type alias for backend operations.
pub type CaResult<T> = std::result::Result<T, CaError>;

/// The abstract certification authority consumed by the SCEP dispatcher.
///
/// Lookup operations return certificate lists where an empty list means
/// "unknown" (GetCert) or "still pending" (GetCertInitial, enrol, renew);
/// they refuse outright by returning [`CaError::OperationFailure`].
///
/// Implementations are shared across requests and are responsible for their
/// own synchronisation.
pub trait CaBackend: Send + Sync {
    /// Capabilities of the CA identified by `identifier` (may be empty).
    fn capabilities(&self, identifier: &str) -> CaResult<BTreeSet<Capability>>;

    /// Certificate chain of the CA, CA-only or RA then CA.
    fn ca_certificates(&self, identifier: &str) -> CaResult<Vec<Certificate>>;

    /// Chain of the next CA certificate; empty disables GetNextCACert.
    fn next_ca_certificates(&self, identifier: &str) -> CaResult<Vec<Certificate>>;

    /// Look up a previously issued certificate chain by issuer and serial.
    fn get_cert(&self, issuer: &Name, serial: &SerialNumber) -> CaResult<Vec<Certificate>>;

    /// Check whether a previously submitted enrolment has been issued.
    ///
    /// Returns the chain when issued, or an empty list while still pending.
    fn get_cert_initial(
        &self,
        issuer: &Name,
        subject: &Name,
        transaction_id: &TransactionId,
    ) -> CaResult<Vec<Certificate>>;

    /// Retrieve the CRL covering the identified certificate.
    fn get_crl(&self, issuer: &Name, serial: &SerialNumber) -> CaResult<Option<CertificateList>>;

    /// Enrol a certification request.
    ///
    /// `signer` is the certificate that signed the pkiMessage (self-signed
    /// for initial enrolment, a previously issued certificate for renewal
    /// through PKCSReq). Returns the issued chain, or an empty list when the
    /// request was accepted but is pending manual approval.
    fn enrol(
        &self,
        csr: &CertReq,
        signer: &Certificate,
        transaction_id: &TransactionId,
    ) -> CaResult<Vec<Certificate>>;

    /// Renew via an explicit RenewalReq message.
    ///
    /// The default implementation refuses with `badRequest`; backends that
    /// advertise [`Capability::Renewal`] override it.
    fn renew(
        &self,
        csr: &CertReq,
        signer: &Certificate,
        transaction_id: &TransactionId,
    ) -> CaResult<Vec<Certificate>> {
        let _ = (csr, signer, transaction_id);
        Err(CaError::OperationFailure(FailInfo::BadRequest))
    }

    /// Certificate whose key decrypts incoming pkiMessage envelopes.
    fn recipient_certificate(&self) -> &Certificate;

    /// Private key matching [`CaBackend::recipient_certificate`].
    fn recipient_key(&self) -> &RsaPrivateKey;

    /// Certificate presented as the signer of outgoing pkiMessages.
    fn signer_certificate(&self) -> &Certificate;

    /// Private key matching [`CaBackend::signer_certificate`].
    fn signer_key(&self) -> &RsaPrivateKey;

    /// Certificate chain included in outgoing SignedData.
    fn signer_chain(&self) -> Vec<Certificate>;
}
