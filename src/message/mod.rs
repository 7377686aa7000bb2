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

//! Typed pkiMessages and their codec.
//!
//! A pkiMessage is a CMS SignedData whose signed attributes carry the SCEP
//! transaction state and whose content, when present, is an EnvelopedData
//! holding the message payload. [`PkiMessage`] is the decoded form;
//! [`PkiMessageEncoder`] and [`PkiMessageDecoder`] translate to and from
//! DER.

mod decoder;
mod encoder;

pub use decoder::PkiMessageDecoder;
pub use encoder::PkiMessageEncoder;

use cms::cert::IssuerAndSerialNumber;
use x509_cert::request::CertReq;

use crate::asn1::IssuerAndSubject;
use crate::transaction::{FailInfo, MessageType, Nonce, PkiStatus, TransactionId};

/// A decoded SCEP pkiMessage.
///
/// The variants mirror the `messageType` signed attribute; each carries the
/// transaction identifier and the (nullable, some clients omit it) sender
/// nonce alongside its payload.
#[derive(Debug, Clone)]
pub enum PkiMessage {
    /// Initial enrolment carrying a PKCS#10 certification request.
    PkcsReq {
        /// Client-chosen transaction identifier.
        transaction_id: TransactionId,
        /// Sender nonce, if the client supplied one.
        sender_nonce: Option<Nonce>,
        /// The certification request.
        csr: Box<CertReq>,
    },

    /// Renewal enrolment carrying a PKCS#10 certification request.
    RenewalReq {
        /// Client-chosen transaction identifier.
        transaction_id: TransactionId,
        /// Sender nonce, if the client supplied one.
        sender_nonce: Option<Nonce>,
        /// The certification request.
        csr: Box<CertReq>,
    },

    /// Retrieve a previously issued certificate by issuer and serial.
    GetCert {
        /// Client-chosen transaction identifier.
        transaction_id: TransactionId,
        /// Sender nonce, if the client supplied one.
        sender_nonce: Option<Nonce>,
        /// Identifies the requested certificate.
        issuer_and_serial: IssuerAndSerialNumber,
    },

    /// Poll for a pending enrolment.
    GetCertInitial {
        /// Client-chosen transaction identifier.
        transaction_id: TransactionId,
        /// Sender nonce, if the client supplied one.
        sender_nonce: Option<Nonce>,
        /// Identifies the pending enrolment.
        issuer_and_subject: IssuerAndSubject,
    },

    /// Retrieve a CRL by issuer and serial.
    GetCrl {
        /// Client-chosen transaction identifier.
        transaction_id: TransactionId,
        /// Sender nonce, if the client supplied one.
        sender_nonce: Option<Nonce>,
        /// Identifies the certificate whose CRL is requested.
        issuer_and_serial: IssuerAndSerialNumber,
    },

    /// Server-to-client reply.
    CertRep(CertRep),
}

impl PkiMessage {
    /// The `messageType` of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::PkcsReq { .. } => MessageType::PkcsReq,
            Self::RenewalReq { .. } => MessageType::RenewalReq,
            Self::GetCert { .. } => MessageType::GetCert,
            Self::GetCertInitial { .. } => MessageType::GetCertInitial,
            Self::GetCrl { .. } => MessageType::GetCrl,
            Self::CertRep(_) => MessageType::CertRep,
        }
    }

    /// The transaction identifier of this message.
    pub fn transaction_id(&self) -> &TransactionId {
        match self {
            Self::PkcsReq { transaction_id, .. }
            | Self::RenewalReq { transaction_id, .. }
            | Self::GetCert { transaction_id, .. }
            | Self::GetCertInitial { transaction_id, .. }
            | Self::GetCrl { transaction_id, .. } => transaction_id,
            Self::CertRep(rep) => &rep.transaction_id,
        }
    }

    /// The sender nonce of this message, if any.
    pub fn sender_nonce(&self) -> Option<&Nonce> {
        match self {
            Self::PkcsReq { sender_nonce, .. }
            | Self::RenewalReq { sender_nonce, .. }
            | Self::GetCert { sender_nonce, .. }
            | Self::GetCertInitial { sender_nonce, .. }
            | Self::GetCrl { sender_nonce, .. } => sender_nonce.as_ref(),
            Self::CertRep(rep) => rep.sender_nonce.as_ref(),
        }
    }
}

/// The outcome carried by a [`CertRep`].
#[derive(Debug, Clone)]
pub enum CertRepOutcome {
    /// Granted. Carries the DER of a degenerate SignedData holding the
    /// issued certificate chain or the requested CRL.
    Success(Vec<u8>),
    /// Still pending; the client should poll with GetCertInitial.
    Pending,
    /// Refused with the given failInfo.
    Failure(FailInfo),
}

/// The sole server-to-client message.
#[derive(Debug, Clone)]
pub struct CertRep {
    /// Transaction identifier, echoed from the request.
    pub transaction_id: TransactionId,
    /// Fresh server nonce. Nullable only on decode of foreign messages.
    pub sender_nonce: Option<Nonce>,
    /// Echo of the request's sender nonce, if the request carried one.
    pub recipient_nonce: Option<Nonce>,
    /// The reply outcome.
    pub outcome: CertRepOutcome,
}

impl CertRep {
    /// Reply granting the request with the given message data (the DER of a
    /// degenerate SignedData).
    pub fn success(
        transaction_id: TransactionId,
        sender_nonce: Nonce,
        recipient_nonce: Option<Nonce>,
        message_data: Vec<u8>,
    ) -> Self {
        Self {
            transaction_id,
            sender_nonce: Some(sender_nonce),
            recipient_nonce,
            outcome: CertRepOutcome::Success(message_data),
        }
    }

    /// Reply reporting the request as pending.
    pub fn pending(
        transaction_id: TransactionId,
        sender_nonce: Nonce,
        recipient_nonce: Option<Nonce>,
    ) -> Self {
        Self {
            transaction_id,
            sender_nonce: Some(sender_nonce),
            recipient_nonce,
            outcome: CertRepOutcome::Pending,
        }
    }

    /// Reply refusing the request with the given failInfo.
    pub fn failure(
        transaction_id: TransactionId,
        sender_nonce: Nonce,
        recipient_nonce: Option<Nonce>,
        fail_info: FailInfo,
    ) -> Self {
        Self {
            transaction_id,
            sender_nonce: Some(sender_nonce),
            recipient_nonce,
            outcome: CertRepOutcome::Failure(fail_info),
        }
    }

    /// The `pkiStatus` of this reply.
    pub fn status(&self) -> PkiStatus {
        match self.outcome {
            CertRepOutcome::Success(_) => PkiStatus::Success,
            CertRepOutcome::Pending => PkiStatus::Pending,
            CertRepOutcome::Failure(_) => PkiStatus::Failure,
        }
    }

    /// The failInfo, when the outcome is a failure.
    pub fn fail_info(&self) -> Option<FailInfo> {
        match self.outcome {
            CertRepOutcome::Failure(fail_info) => Some(fail_info),
            _ => None,
        }
    }
}
