//! Key derivation: Argon2id password + salt → derived key

use std::cell::Cell;

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::{KEY_SIZE, SALT_SIZE};

/// Smallest memory cost accepted from configuration (8 MiB).
pub const MIN_MEM_COST_KIB: u32 = 8 * 1024;

/// Stand-in password for derivations whose output is thrown away.
const DECOY_PASSWORD: &str = "lockbox-decoy-derivation";

thread_local! {
    static DERIVATIONS: Cell<u64> = const { Cell::new(0) };
}

/// Number of Argon2id runs completed on the calling thread.
pub fn derivation_count() -> u64 {
    DERIVATIONS.with(Cell::get)
}

/// A 256-bit key derived from a password via Argon2id.
///
/// Only ever used to wrap or unwrap a content key. Zeroized on drop.
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Argon2id parameters for KDF.
///
/// Recorded next to every wrapped key so that tuning the defaults later
/// never strands files wrapped under the old cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    pub fn new(mem_cost_kib: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            mem_cost_kib,
            time_cost,
            parallelism,
        }
    }

    /// Check that Argon2 accepts these parameters at all, without the
    /// production floor applied by [`KdfParams::validate`].
    pub fn check_argon2(&self) -> CryptoResult<()> {
        self.argon2_params().map(|_| ())
    }

    fn argon2_params(&self) -> CryptoResult<Params> {
        Params::new(self.mem_cost_kib, self.time_cost, self.parallelism, Some(KEY_SIZE))
            .map_err(|e| CryptoError::invalid(format!("invalid Argon2id params: {e}")))
    }

    /// Reject parameters too weak for production use.
    ///
    /// `derive_key` itself accepts anything Argon2 accepts; this floor is
    /// applied where parameters enter from configuration.
    pub fn validate(&self) -> CryptoResult<()> {
        if self.mem_cost_kib < MIN_MEM_COST_KIB {
            return Err(CryptoError::invalid(format!(
                "Argon2id memory cost {} KiB is below the minimum of {} KiB",
                self.mem_cost_kib, MIN_MEM_COST_KIB
            )));
        }
        if self.time_cost == 0 {
            return Err(CryptoError::invalid("Argon2id time cost must be at least 1"));
        }
        if self.parallelism == 0 {
            return Err(CryptoError::invalid("Argon2id parallelism must be at least 1"));
        }
        Ok(())
    }
}

/// Derive a 256-bit key from a password and salt using Argon2id.
///
/// Deterministic for a given (password, salt, params). Run time depends only
/// on the parameters, never on whether the password is the right one.
pub fn derive_key(
    password: &SecretString,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> CryptoResult<DerivedKey> {
    if password.expose_secret().is_empty() {
        return Err(CryptoError::invalid("password must not be empty"));
    }

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.argon2_params()?);

    let mut key = [0u8; KEY_SIZE];
    let hashed = argon2.hash_password_into(password.expose_secret().as_bytes(), salt, &mut key);
    DERIVATIONS.with(|count| count.set(count.get() + 1));
    hashed.map_err(|e| CryptoError::KeyDerivation(format!("Argon2id KDF failed: {e}")))?;

    Ok(DerivedKey::from_bytes(key))
}

/// Run one derivation under `params` with a random salt and discard the key.
///
/// Lets a refusal that never reached the KDF take as long as one that did.
/// Parameters Argon2 rejects fall back to the defaults so the cost is still
/// paid.
pub fn burn_derivation(params: &KdfParams) {
    let params = if params.check_argon2().is_ok() {
        *params
    } else {
        KdfParams::default()
    };
    let salt = crate::keys::generate_salt();
    if let Err(e) = derive_key(&SecretString::from(DECOY_PASSWORD), &salt, &params) {
        tracing::debug!(error = %e, "decoy derivation failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> KdfParams {
        KdfParams::new(1024, 1, 1)
    }

    #[test]
    fn test_kdf_deterministic() {
        let password = SecretString::from("test-password-123");
        let salt = [1u8; SALT_SIZE];

        let key1 = derive_key(&password, &salt, &fast_params()).unwrap();
        let key2 = derive_key(&password, &salt, &fast_params()).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes(), "KDF must be deterministic");
    }

    #[test]
    fn test_kdf_different_passwords() {
        let salt = [1u8; SALT_SIZE];

        let key1 = derive_key(&SecretString::from("password-a"), &salt, &fast_params()).unwrap();
        let key2 = derive_key(&SecretString::from("password-b"), &salt, &fast_params()).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_kdf_different_salts() {
        let password = SecretString::from("same-password");

        let key1 = derive_key(&password, &[1u8; SALT_SIZE], &fast_params()).unwrap();
        let key2 = derive_key(&password, &[2u8; SALT_SIZE], &fast_params()).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_kdf_params_change_output() {
        let password = SecretString::from("same-password");
        let salt = [7u8; SALT_SIZE];

        let key1 = derive_key(&password, &salt, &KdfParams::new(1024, 1, 1)).unwrap();
        let key2 = derive_key(&password, &salt, &KdfParams::new(1024, 2, 1)).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_empty_password_rejected() {
        let result = derive_key(&SecretString::from(""), &[0u8; SALT_SIZE], &fast_params());
        assert!(matches!(result, Err(CryptoError::InvalidInput(_))));
    }

    #[test]
    fn test_invalid_argon2_params_rejected() {
        let params = KdfParams::new(1024, 1, 0);
        let result = derive_key(&SecretString::from("pw"), &[0u8; SALT_SIZE], &params);
        assert!(matches!(result, Err(CryptoError::InvalidInput(_))));
    }

    #[test]
    fn test_validate_floor() {
        assert!(KdfParams::default().validate().is_ok());
        assert!(KdfParams::new(1024, 3, 4).validate().is_err());
        assert!(KdfParams::new(MIN_MEM_COST_KIB, 0, 1).validate().is_err());
        assert!(KdfParams::new(MIN_MEM_COST_KIB, 1, 0).validate().is_err());
        assert!(KdfParams::new(MIN_MEM_COST_KIB, 1, 1).validate().is_ok());
    }

    #[test]
    fn test_derivation_count_tracks_argon2_runs() {
        let before = derivation_count();
        derive_key(&SecretString::from("pw"), &[3u8; SALT_SIZE], &fast_params()).unwrap();
        assert_eq!(derivation_count(), before + 1);

        // rejected before hashing
        let _ = derive_key(&SecretString::from(""), &[3u8; SALT_SIZE], &fast_params());
        let _ = derive_key(&SecretString::from("pw"), &[3u8; SALT_SIZE], &KdfParams::new(1024, 1, 0));
        assert_eq!(derivation_count(), before + 1);
    }

    #[test]
    fn test_burn_derivation_runs_kdf() {
        let before = derivation_count();
        burn_derivation(&fast_params());
        assert_eq!(derivation_count(), before + 1);
    }

    #[test]
    fn test_check_argon2_ignores_floor() {
        assert!(fast_params().check_argon2().is_ok());
        assert!(KdfParams::new(1024, 1, 0).check_argon2().is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = DerivedKey::from_bytes([0x5Au8; KEY_SIZE]);
        let shown = format!("{key:?}");
        assert!(shown.contains("REDACTED"));
        assert!(!shown.contains("90"));
    }
}
