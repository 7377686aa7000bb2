//! CA capability advertisement.
//!
//! `GetCACaps` returns a newline-separated list of capability tokens drawn
//! from the closed vocabulary of the SCEP specification.

use std::collections::BTreeSet;

/// A single CA capability token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    /// The CA supports the GetNextCACert operation.
    GetNextCaCert,
    /// PKIOperation may be sent via HTTP POST.
    PostPkiOperation,
    /// The CA accepts RenewalReq messages.
    Renewal,
    /// SHA-1 digest support.
    Sha1,
    /// SHA-256 digest support.
    Sha256,
    /// SHA-512 digest support.
    Sha512,
    /// Triple DES content encryption support.
    TripleDes,
    /// AES content encryption support.
    Aes,
    /// Full conformance with the final SCEP specification.
    ScepStandard,
}

impl Capability {
    /// The wire token for this capability.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetNextCaCert => "GetNextCACert",
            Self::PostPkiOperation => "POSTPKIOperation",
            Self::Renewal => "Renewal",
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha512 => "SHA-512",
            Self::TripleDes => "DES3",
            Self::Aes => "AES",
            Self::ScepStandard => "SCEPStandard",
        }
    }

    /// Parse a wire token.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "GetNextCACert" => Some(Self::GetNextCaCert),
            "POSTPKIOperation" => Some(Self::PostPkiOperation),
            "Renewal" => Some(Self::Renewal),
            "SHA-1" => Some(Self::Sha1),
            "SHA-256" => Some(Self::Sha256),
            "SHA-512" => Some(Self::Sha512),
            "DES3" => Some(Self::TripleDes),
            "AES" => Some(Self::Aes),
            "SCEPStandard" => Some(Self::ScepStandard),
            _ => None,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Render a capability set as the GetCACaps response body: each token
/// followed by a newline.
pub fn render(caps: &BTreeSet<Capability>) -> String {
    let mut body = String::new();
    for cap in caps {
        body.push_str(cap.as_str());
        body.push('\n');
    }
    body
}
