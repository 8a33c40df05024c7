//! [RFC-8555][RFC-8555] [DNS-01] challenge record computation.
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4

use crate::error::Error;
use base64::engine::general_purpose;
use base64::{alphabet, engine, Engine};
use lazy_static::lazy_static;
use sha2::{Digest, Sha256};

/// Label prepended to the validated domain, see RFC-8555 section 8.4.
pub const CHALLENGE_LABEL: &str = "_acme-challenge";

lazy_static! {
    static ref BASE64_ENGINE: engine::GeneralPurpose =
        engine::GeneralPurpose::new(&alphabet::URL_SAFE, general_purpose::NO_PAD);
}

/// The `(fqdn, value)` pair published to satisfy a DNS-01 challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRecord {
    pub fqdn: String,
    pub value: String,
}

/// Compute the TXT record name and value for `domain` and key authorization `key_auth`.
///
/// The value is the unpadded base64url SHA-256 digest of the key authorization.
#[must_use]
pub fn challenge_record(domain: &str, key_auth: &str) -> ChallengeRecord {
    let domain = domain.trim().trim_end_matches('.');
    let fqdn = format!("{CHALLENGE_LABEL}.{domain}.");
    let digest = Sha256::digest(key_auth.as_bytes());
    ChallengeRecord {
        fqdn,
        value: BASE64_ENGINE.encode(digest),
    }
}

/// Check that `key_auth` has the `token.thumbprint` shape for `token`.
///
/// # Errors
///
/// Returns [`Error::InvalidKeyAuthorization`] if it doesn't.
pub fn validate_key_authorization(token: &str, key_auth: &str) -> Result<(), Error> {
    match key_auth.split_once('.') {
        Some((prefix, thumbprint))
            if !token.is_empty() && prefix == token && !thumbprint.is_empty() =>
        {
            Ok(())
        }
        _ => Err(Error::InvalidKeyAuthorization(token.to_string())),
    }
}
