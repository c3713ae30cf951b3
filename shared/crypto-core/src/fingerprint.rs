//! Deterministic human-comparable identifiers for RSA public keys.
//!
//! A fingerprint is the BLAKE2b-256 digest of the key's canonical PEM
//! export, base-32 encoded with the trailing five characters stripped and
//! a dash inserted every four: `XXXX-XXXX-...-XXX`. Users compare these
//! out-of-band, so the comparison itself is constant-time.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use data_encoding::BASE32;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use subtle::ConstantTimeEq;

use crate::keys::export_public_pem;
use crate::Result;

type Blake2b256 = Blake2b<U32>;

const GROUP: usize = 4;
const STRIP: usize = 5;

/// Canonical short-string identity of a public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Digest a public key into its dash-grouped base-32 form.
    ///
    /// Deterministic: equal keys always yield equal fingerprints.
    pub fn from_public_key(public: &RsaPublicKey) -> Result<Self> {
        let export = export_public_pem(public)?;
        let mut hasher = Blake2b256::new();
        hasher.update(export.as_bytes());
        let digest = hasher.finalize();

        let encoded = BASE32.encode(&digest);
        let trimmed = &encoded[..encoded.len() - STRIP];

        let mut grouped = String::with_capacity(trimmed.len() + trimmed.len() / GROUP);
        for (i, ch) in trimmed.chars().enumerate() {
            if i > 0 && i % GROUP == 0 {
                grouped.push('-');
            }
            grouped.push(ch);
        }
        Ok(Self(grouped))
    }

    /// Validate and normalize a user-entered fingerprint.
    ///
    /// Accepts exactly the shape `from_public_key` produces (case
    /// insensitively); returns `None` for anything else.
    pub fn parse(input: &str) -> Option<Self> {
        let normalized = input.trim().to_ascii_uppercase();
        let groups: Vec<&str> = normalized.split('-').collect();
        let well_formed = groups.len() == 13
            && groups[..12].iter().all(|g| g.len() == GROUP)
            && groups[12].len() == 3
            && normalized
                .chars()
                .all(|c| matches!(c, 'A'..='Z' | '2'..='7' | '-'));
        well_formed.then_some(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time equality with another fingerprint.
    pub fn matches(&self, other: &Fingerprint) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }

    /// True when `public` is the key this fingerprint was taken from.
    pub fn verify(&self, public: &RsaPublicKey) -> Result<bool> {
        Ok(self.matches(&Self::from_public_key(public)?))
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;

    #[test]
    fn fingerprint_is_deterministic() {
        let pair = KeyPair::generate().unwrap();
        let first = Fingerprint::from_public_key(pair.public()).unwrap();
        let second = Fingerprint::from_public_key(pair.public()).unwrap();
        assert_eq!(first, second);
        assert!(first.matches(&second));
    }

    #[test]
    fn fingerprint_format() {
        let pair = KeyPair::generate().unwrap();
        let fp = Fingerprint::from_public_key(pair.public()).unwrap();
        let shape = regex::Regex::new(r"^([A-Z2-7]{4}-){12}[A-Z2-7]{3}$").unwrap();
        assert!(shape.is_match(fp.as_str()), "unexpected shape: {fp}");
    }

    #[test]
    fn distinct_keys_yield_distinct_fingerprints() {
        let a = KeyPair::generate().unwrap();
        let b = KeyPair::generate().unwrap();
        let fp_a = Fingerprint::from_public_key(a.public()).unwrap();
        let fp_b = Fingerprint::from_public_key(b.public()).unwrap();
        assert_ne!(fp_a, fp_b);
        assert!(!fp_a.matches(&fp_b));
    }

    #[test]
    fn verify_binds_fingerprint_to_key() {
        let a = KeyPair::generate().unwrap();
        let b = KeyPair::generate().unwrap();
        let fp = Fingerprint::from_public_key(a.public()).unwrap();
        assert!(fp.verify(a.public()).unwrap());
        assert!(!fp.verify(b.public()).unwrap());
    }

    #[test]
    fn parse_accepts_own_output_and_rejects_noise() {
        let pair = KeyPair::generate().unwrap();
        let fp = Fingerprint::from_public_key(pair.public()).unwrap();
        assert_eq!(Fingerprint::parse(fp.as_str()), Some(fp.clone()));
        assert_eq!(
            Fingerprint::parse(&fp.as_str().to_ascii_lowercase()),
            Some(fp)
        );

        assert!(Fingerprint::parse("").is_none());
        assert!(Fingerprint::parse("AAAA-BBBB").is_none());
        assert!(Fingerprint::parse("1111-1111-1111-1111-1111-1111-1111-1111-1111-1111-1111-1111-111").is_none());
    }
}
