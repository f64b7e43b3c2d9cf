//! # campus-iam (identity and access core)
//!
//! `campus-iam` authenticates staff of a multi-campus student health service and
//! gates every record operation behind role and permission checks.
//!
//! ## Identity Model
//!
//! A principal is identified by `(username, campus)`; its document id is derived
//! deterministically as `user:{username}@{campus}` and never changes.
//!
//! - **Credentials:** bcrypt digests, truncated consistently at 72 bytes.
//! - **Sessions:** stateless HS256 bearer tokens carrying subject, role and campus.
//!   There is no revocation list; logout only records an audit event.
//! - **Lockout:** five consecutive failures lock the account for thirty minutes.
//!
//! ## Authorization
//!
//! Roles map to a static, closed set of `resource:action` permissions. Unknown
//! roles or malformed permission strings are always denied.
//!
//! ## Storage
//!
//! Every read and write goes through [`store::ResilientStore`], which retries a
//! throttled call once, treats an upsert conflict as the earlier attempt having
//! succeeded, and infers partition keys for collections that are not
//! partitioned by `id`.

pub mod api;
pub mod auth;
pub mod cli;
pub mod clock;
pub mod records;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }
}
