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

//! # scep-server
//!
//! The server-side core of the Simple Certificate Enrollment Protocol
//! (SCEP): an HTTP-shaped dispatcher through which PKI clients obtain CA
//! certificates, enrol and renew end-entity certificates, retrieve issued
//! certificates and CRLs, and poll for pending requests.
//!
//! The crate is a library meant to be embedded in a host: it contains no
//! HTTP server, no TLS, and no issuance policy. The host feeds
//! `{method, query, body}` triples into [`ScepServer::handle`] and writes
//! the returned `{status, headers, body}` back to the wire; everything the
//! CA actually *decides* lives behind the [`CaBackend`] trait.
//!
//! ## Example
//!
//! ```no_run,ignore
//! use scep_server::{ScepRequest, ScepServer};
//!
//! let server = ScepServer::new(MyCa::new());
//!
//! // Typically driven from an HTTP handler:
//! let response = server.handle(&ScepRequest::get("operation=GetCACaps"));
//! assert_eq!(response.status.as_u16(), 200);
//! ```
//!
//! ## Protocol surface
//!
//! | Operation       | Methods   | Response                                  |
//! |-----------------|-----------|-------------------------------------------|
//! | `GetCACaps`     | GET       | newline-separated capability tokens       |
//! | `GetCACert`     | GET       | raw DER (one cert) or degenerate PKCS#7   |
//! | `GetNextCACert` | GET       | signer-signed PKCS#7 with the next chain  |
//! | `PKIOperation`  | GET, POST | signed-and-enveloped `CertRep` pkiMessage |
//!
//! PKIOperation over GET carries the pkiMessage Base64-encoded in the
//! `message` query parameter; the dispatcher folds spaces back to `+`
//! before decoding to accommodate clients that URL-decode the padding.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod asn1;
pub mod ca;
pub mod caps;
pub mod envelope;
pub mod error;
pub mod message;
pub mod server;
pub mod signed_data;
pub mod transaction;

// Re-export main types at crate root for convenience
pub use ca::{CaBackend, CaError, CaResult};
pub use caps::Capability;
pub use envelope::{ContentEncryptionAlgorithm, PkcsPkiEnvelopeDecoder, PkcsPkiEnvelopeEncoder};
pub use error::{Result, ScepError};
pub use message::{CertRep, CertRepOutcome, PkiMessage, PkiMessageDecoder, PkiMessageEncoder};
pub use server::{Operation, ScepRequest, ScepResponse, ScepServer, ScepServerBuilder, ServerConfig};
pub use signed_data::DigestAlgorithm;
pub use transaction::{FailInfo, MessageType, Nonce, PkiStatus, TransactionId};

// Re-export x509_cert::Certificate for convenience
pub use x509_cert::Certificate;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
