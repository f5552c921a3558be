//! Salted password hashes in the form
//! `pbkdf2-sha256$<iterations>$<salt>$<hash>` (unpadded base64 fields).

use std::num::NonZeroU32;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use ring::{
    digest, pbkdf2,
    rand::{SecureRandom, SystemRandom},
};
use thiserror::Error;

const SCHEME: &str = "pbkdf2-sha256";
pub const DEFAULT_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = digest::SHA256_OUTPUT_LEN;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("system random source failed")]
    Random,
    #[error("iteration count must be positive")]
    ZeroIterations,
}

pub fn hash_password_with(password: &str, iterations: u32) -> Result<String, CredentialError> {
    let iterations = NonZeroU32::new(iterations).ok_or(CredentialError::ZeroIterations)?;
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| CredentialError::Random)?;

    let mut hash = [0u8; HASH_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        password.as_bytes(),
        &mut hash,
    );

    Ok(format!(
        "{SCHEME}${iterations}${}${}",
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(hash)
    ))
}

/// Constant-time check of `password` against a stored hash. Malformed hashes
/// never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((iterations, salt, hash)) = parse(stored) else {
        return false;
    };
    pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        password.as_bytes(),
        &hash,
    )
    .is_ok()
}

fn parse(stored: &str) -> Option<(NonZeroU32, Vec<u8>, Vec<u8>)> {
    let mut parts = stored.split('$');
    if parts.next()? != SCHEME {
        return None;
    }
    let iterations = parts.next()?.parse::<NonZeroU32>().ok()?;
    let salt = STANDARD_NO_PAD.decode(parts.next()?).ok()?;
    let hash = STANDARD_NO_PAD.decode(parts.next()?).ok()?;
    if parts.next().is_some() || hash.len() != HASH_LEN {
        return None;
    }
    Some((iterations, salt, hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_matching_password() {
        let stored = hash_password_with("1234", 1_000).expect("hash");
        assert!(stored.starts_with("pbkdf2-sha256$1000$"));
        assert!(verify_password("1234", &stored));
        assert!(!verify_password("12345", &stored));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let first = hash_password_with("1234", 1_000).expect("hash");
        let second = hash_password_with("1234", 1_000).expect("hash");
        assert_ne!(first, second);
    }

    #[test]
    fn plaintext_and_malformed_hashes_never_verify() {
        assert!(!verify_password("1234", "1234"));
        assert!(!verify_password("1234", "pbkdf2-sha256$0$AAAA$AAAA"));
        assert!(!verify_password("1234", "md5$1$AAAA$AAAA"));
    }

    #[test]
    fn zero_iterations_is_rejected() {
        assert_eq!(
            hash_password_with("1234", 0),
            Err(CredentialError::ZeroIterations)
        );
    }
}
