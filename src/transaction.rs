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

//! SCEP transaction primitives.
//!
//! Message types, pkiStatus and failInfo codes, nonces, and transaction
//! identifiers. On the wire the numeric values travel as decimal
//! `PrintableString`s inside signed attributes; the parse/render helpers
//! here implement that convention.

use rand::rngs::OsRng;
use rand::RngCore;

/// Length in bytes of a SCEP nonce.
pub const NONCE_LENGTH: usize = 16;

/// The SCEP `messageType` signed attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Server-to-client reply.
    CertRep,
    /// Renewal enrolment.
    RenewalReq,
    /// Initial enrolment.
    PkcsReq,
    /// Client poll for a pending enrolment.
    GetCertInitial,
    /// Retrieve a previously issued certificate by issuer and serial.
    GetCert,
    /// Retrieve a CRL by issuer and serial.
    GetCrl,
}

impl MessageType {
    /// The numeric wire value.
    pub fn value(self) -> u32 {
        match self {
            Self::CertRep => 3,
            Self::RenewalReq => 17,
            Self::PkcsReq => 19,
            Self::GetCertInitial => 20,
            Self::GetCert => 21,
            Self::GetCrl => 22,
        }
    }

    /// Parse from the numeric wire value.
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            3 => Some(Self::CertRep),
            17 => Some(Self::RenewalReq),
            19 => Some(Self::PkcsReq),
            20 => Some(Self::GetCertInitial),
            21 => Some(Self::GetCert),
            22 => Some(Self::GetCrl),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CertRep => "CertRep",
            Self::RenewalReq => "RenewalReq",
            Self::PkcsReq => "PKCSReq",
            Self::GetCertInitial => "GetCertInitial",
            Self::GetCert => "GetCert",
            Self::GetCrl => "GetCRL",
        };
        write!(f, "{}", name)
    }
}

/// The SCEP `pkiStatus` signed attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkiStatus {
    /// Request granted; the reply carries an enveloped SignedData.
    Success,
    /// Request rejected; the reply carries a failInfo.
    Failure,
    /// Request pending; the client should poll with GetCertInitial.
    Pending,
}

impl PkiStatus {
    /// The numeric wire value.
    pub fn value(self) -> u32 {
        match self {
            Self::Success => 0,
            Self::Failure => 2,
            Self::Pending => 3,
        }
    }

    /// Parse from the numeric wire value.
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Success),
            2 => Some(Self::Failure),
            3 => Some(Self::Pending),
            _ => None,
        }
    }
}

/// The SCEP `failInfo` signed attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailInfo {
    /// Unrecognized or unsupported algorithm.
    BadAlg,
    /// Integrity check failed.
    BadMessageCheck,
    /// Transaction not permitted or supported.
    BadRequest,
    /// Message time field was not sufficiently close to the system time.
    BadTime,
    /// No certificate could be identified matching the provided criteria.
    BadCertId,
}

impl FailInfo {
    /// The numeric wire value.
    pub fn value(self) -> u32 {
        match self {
            Self::BadAlg => 0,
            Self::BadMessageCheck => 1,
            Self::BadRequest => 2,
            Self::BadTime => 3,
            Self::BadCertId => 4,
        }
    }

    /// Parse from the numeric wire value.
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::BadAlg),
            1 => Some(Self::BadMessageCheck),
            2 => Some(Self::BadRequest),
            3 => Some(Self::BadTime),
            4 => Some(Self::BadCertId),
            _ => None,
        }
    }
}

impl std::fmt::Display for FailInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::BadAlg => "badAlg",
            Self::BadMessageCheck => "badMessageCheck",
            Self::BadRequest => "badRequest",
            Self::BadTime => "badTime",
            Self::BadCertId => "badCertId",
        };
        write!(f, "{}", name)
    }
}

/// A 16-byte nonce binding a request to its reply.
///
/// The server generates a fresh nonce for every reply it sends; the reply's
/// recipient nonce echoes the sender nonce of the request.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_LENGTH]);

impl Nonce {
    /// Wrap an existing 16-byte value. Deterministic tests use this.
    pub fn new(bytes: [u8; NONCE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh nonce from the operating system CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// The raw nonce bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Parse from wire bytes; fails if the length is not 16.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        <[u8; NONCE_LENGTH]>::try_from(bytes).ok().map(Self)
    }
}

impl std::fmt::Debug for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Nonce(")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

/// A client-chosen transaction identifier, echoed verbatim by the server.
///
/// Carried on the wire as the octets of a `PrintableString`; clients
/// typically send 16+ ASCII characters, but the value is treated as opaque.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TransactionId(Vec<u8>);

impl TransactionId {
    /// Wrap raw identifier octets.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The raw identifier octets.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl std::fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransactionId({})", self)
    }
}
