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

//! Codec round-trip properties: every messageType survives an
//! encode/decode cycle, signatures bind the attributes, and envelopes only
//! open for their recipient.

mod common;

use std::str::FromStr;

use cms::cert::IssuerAndSerialNumber;
use der::Encode;
use rsa::{RsaPrivateKey, RsaPublicKey};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::Certificate;

use scep_server::asn1::IssuerAndSubject;
use scep_server::envelope::{
    ContentEncryptionAlgorithm, PkcsPkiEnvelopeDecoder, PkcsPkiEnvelopeEncoder,
};
use scep_server::message::{PkiMessageDecoder, PkiMessageEncoder};
use scep_server::signed_data::{degenerate_certificates, parse_signed_data};
use scep_server::{CertRep, CertRepOutcome, FailInfo, Nonce, PkiMessage, PkiStatus, TransactionId};

use common::TestClient;

struct Rig {
    server_key: RsaPrivateKey,
    server_cert: Certificate,
    client: TestClient,
}

impl Rig {
    fn new() -> Self {
        let server_key = common::generate_key();
        let server_cert = common::issue_cert(
            "CN=SCEP Server",
            "CN=SCEP Server",
            7,
            &RsaPublicKey::from(&server_key),
            &server_key,
            common::validity_hours(24),
        );
        let client = TestClient::new(server_cert.clone());
        Self {
            server_key,
            server_cert,
            client,
        }
    }

    /// Decode a request the way the server does.
    fn decode_request(&self, body: &[u8]) -> scep_server::Result<PkiMessage> {
        PkiMessageDecoder::new(
            self.client.cert.clone(),
            PkcsPkiEnvelopeDecoder::new(self.server_cert.clone(), self.server_key.clone()),
        )
        .decode(body)
    }

    /// Encode a reply the way the server does.
    fn encode_reply(&self, rep: CertRep) -> Vec<u8> {
        PkiMessageEncoder::new(
            self.server_key.clone(),
            self.server_cert.clone(),
            PkcsPkiEnvelopeEncoder::new(self.client.cert.clone()),
        )
        .encode(&PkiMessage::CertRep(rep))
        .expect("encode reply")
    }
}

fn iasn(serial: u32) -> IssuerAndSerialNumber {
    IssuerAndSerialNumber {
        issuer: Name::from_str("CN=Example").unwrap(),
        serial_number: SerialNumber::from(serial),
    }
}

#[test]
fn round_trip_pkcs_req() {
    let rig = Rig::new();
    let csr = common::build_csr(
        "CN=Example",
        &RsaPublicKey::from(&rig.client.key),
        &rig.client.key,
        Some("secret"),
    );
    let nonce = Nonce::new([3u8; 16]);
    let message = PkiMessage::PkcsReq {
        transaction_id: TransactionId::from("codec-pkcsreq"),
        sender_nonce: Some(nonce),
        csr: Box::new(csr.clone()),
    };

    let body = rig.client.encoder().encode(&message).expect("encode");
    let decoded = rig.decode_request(&body).expect("decode");

    let PkiMessage::PkcsReq {
        transaction_id,
        sender_nonce,
        csr: decoded_csr,
    } = decoded
    else {
        panic!("wrong message type");
    };
    assert_eq!(transaction_id, TransactionId::from("codec-pkcsreq"));
    assert_eq!(sender_nonce, Some(nonce));
    assert_eq!(
        decoded_csr.to_der().unwrap(),
        csr.to_der().unwrap(),
        "CSR must survive the round trip byte-for-byte"
    );
}

#[test]
fn round_trip_renewal_req() {
    let rig = Rig::new();
    let csr = common::build_csr(
        "CN=Example",
        &RsaPublicKey::from(&rig.client.key),
        &rig.client.key,
        None,
    );
    let message = PkiMessage::RenewalReq {
        transaction_id: TransactionId::from("codec-renewal"),
        sender_nonce: Some(Nonce::new([4u8; 16])),
        csr: Box::new(csr),
    };

    let body = rig.client.encoder().encode(&message).expect("encode");
    let decoded = rig.decode_request(&body).expect("decode");
    assert!(matches!(decoded, PkiMessage::RenewalReq { .. }));
    assert_eq!(
        decoded.transaction_id(),
        &TransactionId::from("codec-renewal")
    );
}

#[test]
fn round_trip_get_cert_and_get_crl() {
    let rig = Rig::new();
    for (message, expect_crl) in [
        (
            PkiMessage::GetCert {
                transaction_id: TransactionId::from("codec-getcert"),
                sender_nonce: Some(Nonce::new([5u8; 16])),
                issuer_and_serial: iasn(42),
            },
            false,
        ),
        (
            PkiMessage::GetCrl {
                transaction_id: TransactionId::from("codec-getcrl"),
                sender_nonce: Some(Nonce::new([6u8; 16])),
                issuer_and_serial: iasn(42),
            },
            true,
        ),
    ] {
        let body = rig.client.encoder().encode(&message).expect("encode");
        let decoded = rig.decode_request(&body).expect("decode");
        match (&decoded, expect_crl) {
            (PkiMessage::GetCert { issuer_and_serial, .. }, false)
            | (PkiMessage::GetCrl { issuer_and_serial, .. }, true) => {
                assert_eq!(*issuer_and_serial, iasn(42));
            }
            _ => panic!("wrong message type after round trip"),
        }
        assert_eq!(decoded.transaction_id(), message.transaction_id());
    }
}

#[test]
fn round_trip_get_cert_initial() {
    let rig = Rig::new();
    let ias = IssuerAndSubject::new(
        Name::from_str("CN=Example CA").unwrap(),
        Name::from_str("CN=Poll").unwrap(),
    );
    let message = PkiMessage::GetCertInitial {
        transaction_id: TransactionId::from("codec-gci"),
        sender_nonce: Some(Nonce::new([8u8; 16])),
        issuer_and_subject: ias.clone(),
    };

    let body = rig.client.encoder().encode(&message).expect("encode");
    let decoded = rig.decode_request(&body).expect("decode");
    let PkiMessage::GetCertInitial {
        issuer_and_subject, ..
    } = decoded
    else {
        panic!("wrong message type");
    };
    assert_eq!(issuer_and_subject, ias);
}

#[test]
fn round_trip_cert_rep_success() {
    let rig = Rig::new();
    let message_data = degenerate_certificates(&[rig.server_cert.clone()]).unwrap();
    let sender = Nonce::new([10u8; 16]);
    let recipient = Nonce::new([11u8; 16]);
    let rep = CertRep::success(
        TransactionId::from("codec-rep-ok"),
        sender,
        Some(recipient),
        message_data.clone(),
    );

    let body = rig.encode_reply(rep);
    let decoded = rig
        .client
        .decoder(rig.server_cert.clone())
        .decode(&body)
        .expect("decode reply");

    let PkiMessage::CertRep(rep) = decoded else {
        panic!("wrong message type");
    };
    assert_eq!(rep.status(), PkiStatus::Success);
    assert_eq!(rep.sender_nonce, Some(sender));
    assert_eq!(rep.recipient_nonce, Some(recipient));
    let CertRepOutcome::Success(decoded_data) = &rep.outcome else {
        panic!("expected SUCCESS outcome");
    };
    assert_eq!(*decoded_data, message_data);
}

#[test]
fn round_trip_cert_rep_pending_and_failure() {
    let rig = Rig::new();

    let rep = CertRep::pending(
        TransactionId::from("codec-rep-pending"),
        Nonce::new([12u8; 16]),
        Some(Nonce::new([13u8; 16])),
    );
    let body = rig.encode_reply(rep);
    // A pending reply carries no encapsulated content at all.
    let sd = parse_signed_data(&body).unwrap();
    assert!(sd.encap_content_info.econtent.is_none());
    let decoded = rig
        .client
        .decoder(rig.server_cert.clone())
        .decode(&body)
        .expect("decode reply");
    let PkiMessage::CertRep(rep) = decoded else {
        panic!("wrong message type");
    };
    assert_eq!(rep.status(), PkiStatus::Pending);

    let rep = CertRep::failure(
        TransactionId::from("codec-rep-fail"),
        Nonce::new([14u8; 16]),
        Some(Nonce::new([15u8; 16])),
        FailInfo::BadMessageCheck,
    );
    let body = rig.encode_reply(rep);
    let decoded = rig
        .client
        .decoder(rig.server_cert.clone())
        .decode(&body)
        .expect("decode reply");
    let PkiMessage::CertRep(rep) = decoded else {
        panic!("wrong message type");
    };
    assert_eq!(rep.status(), PkiStatus::Failure);
    assert_eq!(rep.fail_info(), Some(FailInfo::BadMessageCheck));
}

#[test]
fn tampered_signature_is_rejected() {
    let rig = Rig::new();
    let message = PkiMessage::GetCert {
        transaction_id: TransactionId::from("codec-tamper"),
        sender_nonce: Some(Nonce::new([16u8; 16])),
        issuer_and_serial: iasn(1),
    };
    let mut body = rig.client.encoder().encode(&message).expect("encode");
    let last = body.len() - 1;
    body[last] ^= 0x01;

    assert!(rig.decode_request(&body).is_err());
}

#[test]
fn envelope_only_opens_for_its_recipient() {
    let rig = Rig::new();
    let other_key = common::generate_key();
    let other_cert = common::issue_cert(
        "CN=Somebody Else",
        "CN=Somebody Else",
        9,
        &RsaPublicKey::from(&other_key),
        &other_key,
        common::validity_hours(24),
    );

    let enveloped = PkcsPkiEnvelopeEncoder::new(rig.server_cert.clone())
        .encode(b"for the server only")
        .expect("envelope");

    let opened = PkcsPkiEnvelopeDecoder::new(rig.server_cert.clone(), rig.server_key.clone())
        .decode(&enveloped)
        .expect("decrypt");
    assert_eq!(opened, b"for the server only");

    assert!(PkcsPkiEnvelopeDecoder::new(other_cert, other_key)
        .decode(&enveloped)
        .is_err());
}

#[test]
fn envelope_round_trips_all_algorithms() {
    let rig = Rig::new();
    let decoder =
        PkcsPkiEnvelopeDecoder::new(rig.server_cert.clone(), rig.server_key.clone());
    for algorithm in [
        ContentEncryptionAlgorithm::DesEde3Cbc,
        ContentEncryptionAlgorithm::DesCbc,
        ContentEncryptionAlgorithm::Aes128Cbc,
        ContentEncryptionAlgorithm::Aes256Cbc,
    ] {
        let enveloped =
            PkcsPkiEnvelopeEncoder::with_algorithm(rig.server_cert.clone(), algorithm)
                .encode(b"algorithm round trip")
                .expect("envelope");
        let opened = decoder.decode(&enveloped).expect("decrypt");
        assert_eq!(opened, b"algorithm round trip", "{:?}", algorithm);
    }
}

#[test]
fn legacy_des_request_decodes() {
    let rig = Rig::new();
    let client = TestClient::with_identity(
        rig.client.key.clone(),
        rig.client.cert.clone(),
        rig.server_cert.clone(),
    )
    .with_algorithm(ContentEncryptionAlgorithm::DesCbc);

    let message = PkiMessage::GetCert {
        transaction_id: TransactionId::from("codec-des"),
        sender_nonce: Some(Nonce::new([17u8; 16])),
        issuer_and_serial: iasn(1),
    };
    let body = client.encoder().encode(&message).expect("encode");
    let decoded = rig.decode_request(&body).expect("decode");
    assert!(matches!(decoded, PkiMessage::GetCert { .. }));
}
