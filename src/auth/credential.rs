//! Password hashing with bcrypt.
//!
//! bcrypt only looks at the first 72 bytes of its input, so both `hash` and
//! `verify` cut the password there themselves (on a character boundary) and
//! the two paths always agree.

use super::AuthError;

pub const MAX_PASSWORD_BYTES: usize = 72;
pub const MIN_COST: u32 = 4;
pub const MAX_COST: u32 = 31;
pub const DEFAULT_COST: u32 = 12;

#[derive(Clone, Copy, Debug)]
pub struct PasswordCodec {
    cost: u32,
}

impl Default for PasswordCodec {
    fn default() -> Self {
        Self::new(DEFAULT_COST)
    }
}

impl PasswordCodec {
    /// Codec with the given bcrypt cost, clamped to the supported range.
    #[must_use]
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(MIN_COST, MAX_COST),
        }
    }

    #[must_use]
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Salted, self-describing digest of `password`.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if bcrypt fails (never for valid costs).
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        bcrypt::hash(truncate(password), self.cost)
            .map_err(|err| AuthError::Internal(format!("password hashing failed: {err}")))
    }

    /// `false` for a wrong password and for any digest bcrypt cannot parse.
    #[must_use]
    pub fn verify(&self, password: &str, digest: &str) -> bool {
        bcrypt::verify(truncate(password), digest).unwrap_or(false)
    }

    /// [`Self::hash`] on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if hashing fails or the blocking task is lost.
    pub async fn hash_blocking(&self, password: String) -> Result<String, AuthError> {
        let codec = *self;
        tokio::task::spawn_blocking(move || codec.hash(&password))
            .await
            .map_err(|err| AuthError::Internal(format!("hashing task failed: {err}")))?
    }

    /// [`Self::verify`] on the blocking pool; a lost task counts as a mismatch.
    pub async fn verify_blocking(&self, password: String, digest: String) -> bool {
        let codec = *self;
        tokio::task::spawn_blocking(move || codec.verify(&password, &digest))
            .await
            .unwrap_or(false)
    }
}

fn truncate(password: &str) -> &str {
    if password.len() <= MAX_PASSWORD_BYTES {
        return password;
    }
    let mut end = MAX_PASSWORD_BYTES;
    while !password.is_char_boundary(end) {
        end -= 1;
    }
    &password[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> PasswordCodec {
        PasswordCodec::new(MIN_COST)
    }

    #[test]
    fn verifies_own_digest_only() -> anyhow::Result<()> {
        let digest = codec().hash("Passw0rd!")?;
        assert!(digest.starts_with("$2"));
        assert!(codec().verify("Passw0rd!", &digest));
        assert!(!codec().verify("passw0rd!", &digest));
        assert!(!codec().verify("", &digest));
        Ok(())
    }

    #[test]
    fn salts_differ() -> anyhow::Result<()> {
        let a = codec().hash("Passw0rd!")?;
        let b = codec().hash("Passw0rd!")?;
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn malformed_digest_is_a_mismatch() {
        assert!(!codec().verify("Passw0rd!", "not-a-bcrypt-digest"));
        assert!(!codec().verify("Passw0rd!", ""));
        assert!(!codec().verify("Passw0rd!", "$2b$04$short"));
    }

    #[test]
    fn long_passwords_truncate_consistently() -> anyhow::Result<()> {
        let base = "A1b".repeat(24);
        assert_eq!(base.len(), MAX_PASSWORD_BYTES);
        let digest = codec().hash(&format!("{base}tail-one"))?;
        assert!(codec().verify(&format!("{base}tail-two"), &digest));
        assert!(codec().verify(&base, &digest));
        Ok(())
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // 71 ASCII bytes followed by a 2-byte character straddling the cap.
        let input = format!("{}é", "a".repeat(71));
        let cut = truncate(&input);
        assert_eq!(cut.len(), 71);
        assert!(cut.chars().all(|c| c == 'a'));
    }

    #[test]
    fn cost_is_clamped() {
        assert_eq!(PasswordCodec::new(1).cost(), MIN_COST);
        assert_eq!(PasswordCodec::new(99).cost(), MAX_COST);
        assert_eq!(PasswordCodec::default().cost(), DEFAULT_COST);
    }

    #[tokio::test]
    async fn blocking_helpers_agree() -> anyhow::Result<()> {
        let digest = codec().hash_blocking("Passw0rd!".to_string()).await?;
        assert!(codec().verify_blocking("Passw0rd!".to_string(), digest.clone()).await);
        assert!(!codec().verify_blocking("nope".to_string(), digest).await);
        Ok(())
    }
}
