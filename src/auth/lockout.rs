//! Brute-force lockout over a principal's failed-attempt counter.
//!
//! `Active -(fail, below threshold)-> Active(n+1)`
//! `Active -(fail, reaches threshold)-> Locked(until = now + duration)`
//! `Locked -(now >= until)-> Active`, counter kept until the next success
//! `* -(verified while not locked)-> Active(0, None)`

use chrono::{DateTime, Duration, Utc};

use super::principal::Principal;

pub const DEFAULT_THRESHOLD: u32 = 5;
pub const DEFAULT_LOCKOUT_MINUTES: i64 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockoutPolicy {
    threshold: u32,
    duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            duration: Duration::minutes(DEFAULT_LOCKOUT_MINUTES),
        }
    }
}

impl LockoutPolicy {
    #[must_use]
    pub fn new(threshold: u32, duration: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            duration,
        }
    }

    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub fn is_locked(&self, principal: &Principal, now: DateTime<Utc>) -> bool {
        principal.locked_until.is_some_and(|until| until > now)
    }

    #[must_use]
    pub fn should_lock(&self, principal: &Principal) -> bool {
        principal.failed_attempts >= self.threshold
    }

    #[must_use]
    pub fn lockout_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.duration
    }

    /// Count one failed attempt. Returns `true` when this attempt locked the account.
    pub fn register_failure(&self, principal: &mut Principal, now: DateTime<Utc>) -> bool {
        principal.failed_attempts = principal.failed_attempts.saturating_add(1);
        if self.should_lock(principal) {
            principal.locked_until = Some(self.lockout_expiry(now));
            true
        } else {
            false
        }
    }

    pub fn register_success(&self, principal: &mut Principal) {
        principal.failed_attempts = 0;
        principal.locked_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        permissions::Role,
        principal::{principal_id, Campus},
    };

    fn bob() -> Principal {
        Principal {
            id: principal_id("bob", Campus::Acapulco),
            username: "bob".into(),
            email: "bob@example.com".into(),
            display_name: "Bob".into(),
            role: Role::Reception,
            campus: Campus::Acapulco,
            department: String::new(),
            active: true,
            created_at: Utc::now(),
            last_access: None,
            failed_attempts: 0,
            locked_until: None,
            password_hash: String::new(),
        }
    }

    #[test]
    fn fifth_failure_locks() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let mut principal = bob();

        for attempt in 1..=4 {
            assert!(!policy.register_failure(&mut principal, now));
            assert_eq!(principal.failed_attempts, attempt);
            assert!(!policy.is_locked(&principal, now));
        }
        assert!(policy.register_failure(&mut principal, now));
        assert!(policy.should_lock(&principal));
        assert!(policy.is_locked(&principal, now));
        assert_eq!(principal.locked_until, Some(now + Duration::minutes(30)));
    }

    #[test]
    fn lock_lapses_but_counter_persists() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let mut principal = bob();
        for _ in 0..5 {
            policy.register_failure(&mut principal, now);
        }

        let later = now + Duration::minutes(30);
        assert!(!policy.is_locked(&principal, later));
        assert_eq!(principal.failed_attempts, 5);

        policy.register_success(&mut principal);
        assert_eq!(principal.failed_attempts, 0);
        assert_eq!(principal.locked_until, None);
    }

    #[test]
    fn failure_after_lapse_relocks_immediately() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let mut principal = bob();
        for _ in 0..5 {
            policy.register_failure(&mut principal, now);
        }
        let later = now + Duration::minutes(31);
        assert!(policy.register_failure(&mut principal, later));
        assert!(policy.is_locked(&principal, later));
    }

    #[test]
    fn custom_threshold() {
        let policy = LockoutPolicy::new(2, Duration::minutes(1));
        let now = Utc::now();
        let mut principal = bob();
        assert!(!policy.register_failure(&mut principal, now));
        assert!(policy.register_failure(&mut principal, now));
        assert_eq!(policy.lockout_expiry(now), now + Duration::minutes(1));
    }
}
