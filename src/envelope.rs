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

//! CMS EnvelopedData codec for the inner pkiMessage content.
//!
//! The content of a SCEP pkiMessage is encrypted for a single key-transport
//! recipient: requests for the server's recipient certificate, replies for
//! the certificate that signed the request. The content-encryption key is
//! wrapped with RSA PKCS#1 v1.5 and the content itself with a CBC block
//! cipher.
//!
//! Triple DES is the interoperability default. Single DES is legacy and kept
//! only because peers still send it; AES is offered to peers that advertise
//! it.

use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use cms::cert::IssuerAndSerialNumber;
use cms::content_info::{CmsVersion, ContentInfo};
use cms::enveloped_data::{
    EncryptedContentInfo, EnvelopedData, KeyTransRecipientInfo, RecipientIdentifier,
    RecipientInfo, RecipientInfos,
};
use der::asn1::{ObjectIdentifier, OctetString, SetOfVec};
use der::{Any, Decode, Encode};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use spki::AlgorithmIdentifierOwned;
use tracing::debug;
use x509_cert::Certificate;

use crate::asn1;
use crate::error::{Result, ScepError};
use crate::signed_data::{issuer_and_serial, rsa_public_key};

/// Content-encryption algorithms for the pkiMessage envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentEncryptionAlgorithm {
    /// DES-EDE3-CBC, the interoperability default.
    #[default]
    DesEde3Cbc,
    /// DES-CBC. Legacy; kept for peers that still send it.
    DesCbc,
    /// AES-128-CBC.
    Aes128Cbc,
    /// AES-256-CBC.
    Aes256Cbc,
}

impl ContentEncryptionAlgorithm {
    /// The algorithm OID.
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            Self::DesEde3Cbc => asn1::DES_EDE3_CBC,
            Self::DesCbc => asn1::DES_CBC,
            Self::Aes128Cbc => asn1::AES_128_CBC,
            Self::Aes256Cbc => asn1::AES_256_CBC,
        }
    }

    /// Reverse lookup from a content-encryption algorithm OID.
    pub fn from_oid(oid: ObjectIdentifier) -> Option<Self> {
        match oid {
            asn1::DES_EDE3_CBC => Some(Self::DesEde3Cbc),
            asn1::DES_CBC => Some(Self::DesCbc),
            asn1::AES_128_CBC => Some(Self::Aes128Cbc),
            asn1::AES_256_CBC => Some(Self::Aes256Cbc),
            _ => None,
        }
    }

    /// Content-encryption key size in bytes.
    pub fn key_size(self) -> usize {
        match self {
            Self::DesEde3Cbc => 24,
            Self::DesCbc => 8,
            Self::Aes128Cbc => 16,
            Self::Aes256Cbc => 32,
        }
    }

    /// Cipher block (and IV) size in bytes.
    pub fn iv_size(self) -> usize {
        match self {
            Self::DesEde3Cbc | Self::DesCbc => 8,
            Self::Aes128Cbc | Self::Aes256Cbc => 16,
        }
    }

    fn encrypt(self, key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::DesEde3Cbc => cbc_encrypt::<des::TdesEde3>(key, iv, plaintext),
            Self::DesCbc => cbc_encrypt::<des::Des>(key, iv, plaintext),
            Self::Aes128Cbc => cbc_encrypt::<aes::Aes128>(key, iv, plaintext),
            Self::Aes256Cbc => cbc_encrypt::<aes::Aes256>(key, iv, plaintext),
        }
    }

    fn decrypt(self, key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::DesEde3Cbc => cbc_decrypt::<des::TdesEde3>(key, iv, ciphertext),
            Self::DesCbc => cbc_decrypt::<des::Des>(key, iv, ciphertext),
            Self::Aes128Cbc => cbc_decrypt::<aes::Aes128>(key, iv, ciphertext),
            Self::Aes256Cbc => cbc_decrypt::<aes::Aes256>(key, iv, ciphertext),
        }
    }
}

fn cbc_encrypt<C>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    let cipher = cbc::Encryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| ScepError::crypto("invalid content-encryption key or IV length"))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    let cipher = cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| ScepError::decoding("invalid content-encryption key or IV length"))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| ScepError::decoding("enveloped content padding check failed"))
}

/// Encrypts pkiMessage content for a single key-transport recipient.
#[derive(Clone)]
pub struct PkcsPkiEnvelopeEncoder {
    recipient: Certificate,
    algorithm: ContentEncryptionAlgorithm,
}

impl PkcsPkiEnvelopeEncoder {
    /// Create an encoder for `recipient` using the default algorithm.
    pub fn new(recipient: Certificate) -> Self {
        Self::with_algorithm(recipient, ContentEncryptionAlgorithm::default())
    }

    /// Create an encoder for `recipient` using a specific algorithm.
    pub fn with_algorithm(recipient: Certificate, algorithm: ContentEncryptionAlgorithm) -> Self {
        Self {
            recipient,
            algorithm,
        }
    }

    /// Encrypt `content` and return the DER of a ContentInfo wrapping the
    /// EnvelopedData.
    pub fn encode(&self, content: &[u8]) -> Result<Vec<u8>> {
        debug!(
            algorithm = ?self.algorithm,
            len = content.len(),
            "enveloping pkiMessage content"
        );

        let mut cek = vec![0u8; self.algorithm.key_size()];
        let mut iv = vec![0u8; self.algorithm.iv_size()];
        OsRng.fill_bytes(&mut cek);
        OsRng.fill_bytes(&mut iv);

        let ciphertext = self.algorithm.encrypt(&cek, &iv, content)?;

        let recipient_key = rsa_public_key(&self.recipient)
            .map_err(|e| ScepError::crypto(format!("recipient certificate unusable: {}", e)))?;
        let encrypted_key = recipient_key
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, &cek)
            .map_err(|e| ScepError::crypto(format!("key transport failed: {}", e)))?;

        let ktri = KeyTransRecipientInfo {
            version: CmsVersion::V0,
            rid: RecipientIdentifier::IssuerAndSerialNumber(issuer_and_serial(&self.recipient)),
            key_enc_alg: AlgorithmIdentifierOwned {
                oid: asn1::RSA_ENCRYPTION,
                parameters: Some(Any::null()),
            },
            enc_key: OctetString::new(encrypted_key)?,
        };

        let enveloped = EnvelopedData {
            version: CmsVersion::V0,
            originator_info: None,
            recip_infos: RecipientInfos(SetOfVec::try_from(vec![RecipientInfo::Ktri(ktri)])?),
            encrypted_content: EncryptedContentInfo {
                content_type: asn1::ID_DATA,
                content_enc_alg: AlgorithmIdentifierOwned {
                    oid: self.algorithm.oid(),
                    parameters: Some(Any::encode_from(&OctetString::new(iv)?)?),
                },
                encrypted_content: Some(OctetString::new(ciphertext)?),
            },
            unprotected_attrs: None,
        };

        let content_info = ContentInfo {
            content_type: asn1::ID_ENVELOPED_DATA,
            content: Any::encode_from(&enveloped)?,
        };
        Ok(content_info.to_der()?)
    }
}

/// Decrypts pkiMessage content addressed to the local recipient identity.
#[derive(Clone)]
pub struct PkcsPkiEnvelopeDecoder {
    recipient: Certificate,
    key: RsaPrivateKey,
}

impl PkcsPkiEnvelopeDecoder {
    /// Create a decoder for the given recipient certificate and key.
    pub fn new(recipient: Certificate, key: RsaPrivateKey) -> Self {
        Self { recipient, key }
    }

    /// Decrypt the DER of a ContentInfo wrapping an EnvelopedData and return
    /// the plaintext content.
    pub fn decode(&self, body: &[u8]) -> Result<Vec<u8>> {
        let content_info = ContentInfo::from_der(body)
            .map_err(|e| ScepError::decoding(format!("failed to parse ContentInfo: {}", e)))?;
        if content_info.content_type != asn1::ID_ENVELOPED_DATA {
            return Err(ScepError::decoding(format!(
                "expected EnvelopedData OID, got {}",
                content_info.content_type
            )));
        }
        let enveloped = EnvelopedData::from_der(&content_info.content.to_der()?)
            .map_err(|e| ScepError::decoding(format!("failed to parse EnvelopedData: {}", e)))?;

        let ktri = self.matching_recipient(&enveloped)?;
        if ktri.key_enc_alg.oid != asn1::RSA_ENCRYPTION {
            return Err(ScepError::decoding(format!(
                "unsupported key-encryption algorithm {}",
                ktri.key_enc_alg.oid
            )));
        }

        let cek = self
            .key
            .decrypt(Pkcs1v15Encrypt, ktri.enc_key.as_bytes())
            .map_err(|_| ScepError::decoding("content-encryption key unwrap failed"))?;

        let eci = &enveloped.encrypted_content;
        let algorithm = ContentEncryptionAlgorithm::from_oid(eci.content_enc_alg.oid)
            .ok_or_else(|| {
                ScepError::decoding(format!(
                    "unsupported content-encryption algorithm {}",
                    eci.content_enc_alg.oid
                ))
            })?;
        let iv = eci
            .content_enc_alg
            .parameters
            .as_ref()
            .ok_or_else(|| ScepError::decoding("missing content-encryption IV"))?
            .decode_as::<OctetString>()
            .map_err(|e| ScepError::decoding(format!("malformed content-encryption IV: {}", e)))?;
        let ciphertext = eci
            .encrypted_content
            .as_ref()
            .ok_or_else(|| ScepError::decoding("missing encrypted content"))?;

        debug!(?algorithm, "decrypting pkiMessage content");
        algorithm.decrypt(&cek, iv.as_bytes(), ciphertext.as_bytes())
    }

    /// Select the key-transport recipient matching the local certificate.
    fn matching_recipient<'a>(
        &self,
        enveloped: &'a EnvelopedData,
    ) -> Result<&'a KeyTransRecipientInfo> {
        let local = IssuerAndSerialNumber {
            issuer: self.recipient.tbs_certificate.issuer.clone(),
            serial_number: self.recipient.tbs_certificate.serial_number.clone(),
        };
        for info in enveloped.recip_infos.0.iter() {
            if let RecipientInfo::Ktri(ktri) = info {
                match &ktri.rid {
                    RecipientIdentifier::IssuerAndSerialNumber(iasn) if *iasn == local => {
                        return Ok(ktri);
                    }
                    _ => {}
                }
            }
        }
        Err(ScepError::decoding(
            "no recipient matches the local decryption key",
        ))
    }
}
