//! HMAC-SHA256 signing for session cookies and password reset tokens
//!
//! A signed value has the form `<payload>.<base64url(mac)>`. The payload is
//! carried verbatim and must not contain a `.`.

use argon2::password_hash::rand_core::{OsRng, RngCore};
use data_encoding::{BASE64URL_NOPAD, HEXLOWER};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies opaque string payloads with a server-side key.
#[derive(Clone)]
pub struct Signer {
    key: Vec<u8>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

impl Signer {
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self {
            key: key.as_ref().to_vec(),
        }
    }

    /// Signer with a random 32-byte key. Signatures do not survive a restart.
    pub fn random() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length")
    }

    /// `payload.signature`
    pub fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        let tag = mac.finalize().into_bytes();
        format!("{}.{}", payload, BASE64URL_NOPAD.encode(&tag))
    }

    /// Return the payload if the signature matches. Comparison is constant-time.
    pub fn verify<'a>(&self, signed: &'a str) -> Option<&'a str> {
        let (payload, signature) = signed.rsplit_once('.')?;
        let tag = BASE64URL_NOPAD.decode(signature.as_bytes()).ok()?;

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        mac.verify_slice(&tag).ok()?;
        Some(payload)
    }
}

/// Random URL-safe nonce of `bytes` bytes of entropy
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    BASE64URL_NOPAD.encode(&buf)
}

/// Lower-case hex SHA-256, used to store tokens without keeping them
pub fn sha256_hex(value: &str) -> String {
    HEXLOWER.encode(&Sha256::digest(value.as_bytes()))
}
