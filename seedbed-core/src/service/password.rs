use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, ParamsBuilder, Version,
};
use tokio::task;

use crate::{Error, Result};

/// 64 MiB
const MEMORY_COST_KIB: u32 = 65536;
const TIME_COST: u32 = 3;
const PARALLELISM: u32 = 4;
const OUTPUT_LEN: usize = 32;

fn params() -> Result<Params> {
    ParamsBuilder::new()
        .m_cost(MEMORY_COST_KIB)
        .t_cost(TIME_COST)
        .p_cost(PARALLELISM)
        .output_len(OUTPUT_LEN)
        .build()
        .map_err(|e| Error::Internal(format!("Failed to build Argon2 params: {e}")))
}

/// Hash a password with Argon2id and a fresh random salt
///
/// Returns a PHC string (`$argon2id$v=19$m=65536,t=3,p=4$...`). The work
/// runs on the blocking pool.
pub async fn hash_password(password: &str) -> Result<String> {
    let password = password.to_string();

    task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params()?);

        argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::Internal(format!("Failed to hash password: {e}")))
    })
    .await
    .map_err(|e| Error::Internal(format!("Password hashing task failed: {e}")))?
}

/// Verify a password against a stored PHC hash
///
/// Cost parameters are read from the hash itself, so hashes made with
/// older settings still verify.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let password = password.to_string();
    let hash = hash.to_string();

    task::spawn_blocking(move || {
        let parsed_hash = PasswordHash::new(&hash)
            .map_err(|e| Error::Internal(format!("Invalid password hash format: {e}")))?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::Internal(format!("Password verification failed: {e}"))),
        }
    })
    .await
    .map_err(|e| Error::Internal(format!("Password verification task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_is_phc_argon2id() {
        let hash = hash_password("Secret#123").await.unwrap();

        assert!(hash.starts_with("$argon2id$v=19$m=65536,t=3,p=4$"));
        assert_ne!(hash, "Secret#123");
    }

    #[tokio::test]
    async fn test_verify_round_trip() {
        let hash = hash_password("Secret#123").await.unwrap();

        assert!(verify_password("Secret#123", &hash).await.unwrap());
        assert!(!verify_password("Secret#124", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_salts_differ() {
        let hash1 = hash_password("Secret#123").await.unwrap();
        let hash2 = hash_password("Secret#123").await.unwrap();

        assert_ne!(hash1, hash2);
    }

    #[tokio::test]
    async fn test_garbage_hash_is_error() {
        let err = verify_password("Secret#123", "plaintext").await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
