//! Identity and access: credentials, sessions, lockout, permissions and audit.

pub mod audit;
pub mod credential;
pub mod error;
pub mod lockout;
pub mod permissions;
pub mod principal;
pub mod service;
pub mod token;
pub mod validation;

pub use audit::{AuditAction, AuditEvent, AuditFilter, AuditRecord, AuditRecorder};
pub use credential::PasswordCodec;
pub use error::AuthError;
pub use lockout::LockoutPolicy;
pub use permissions::{has_permission, has_permission_str, Action, Permission, Resource, Role};
pub use principal::{Campus, NewPrincipal, PrincipalUpdate, PrincipalView};
pub use service::{AuthConfig, AuthService, LoginRequest, LoginResponse, Requirement};
pub use token::{SessionClaims, TokenService};
