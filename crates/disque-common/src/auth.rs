//! Authentication for Disque connections
//!
//! Disque nodes can require a shared secret, sent with `AUTH <secret>` as the
//! first command on every connection. The same configuration type is used on
//! both sides: clients read the secret to send it, the mock node validates
//! what it receives.
//!
//! # Example
//!
//! ```
//! use disque_common::auth::AuthConfig;
//!
//! let auth = AuthConfig::with_secret("foobar");
//! assert_eq!(auth.secret(), Some("foobar"));
//! assert!(auth.validate("foobar"));
//!
//! let no_auth = AuthConfig::disabled();
//! assert!(!no_auth.requires_auth());
//! ```

use std::fmt;

use crate::protocol::Command;

/// Shared-secret authentication configuration.
///
/// # Variants
///
/// - **Disabled**: no `AUTH` is sent / every connection is accepted (default)
/// - **Secret**: `AUTH <secret>` is sent before any other command / required
///
/// The secret never appears in `Display` or `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthConfig {
    secret: Option<String>,
}

impl AuthConfig {
    /// Creates an `AuthConfig` that uses the given shared secret.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
        }
    }

    /// Creates an `AuthConfig` with authentication disabled.
    pub fn disabled() -> Self {
        Self { secret: None }
    }

    /// Builds from an optional secret, treating `None` as disabled.
    pub fn from_option(secret: Option<String>) -> Self {
        Self { secret }
    }

    pub fn requires_auth(&self) -> bool {
        self.secret.is_some()
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    /// The `AUTH` command to send on a fresh connection, if any.
    pub fn auth_command(&self) -> Option<Command> {
        self.secret.as_ref().map(|s| Command::new("AUTH").arg(s))
    }

    /// Validates a provided secret against the configured one.
    ///
    /// Uses constant-time comparison. If authentication is disabled, this
    /// always returns `true`.
    pub fn validate(&self, provided: &str) -> bool {
        match &self.secret {
            Some(expected) => constant_time_eq(expected, provided),
            None => true,
        }
    }
}

impl fmt::Display for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.secret {
            Some(_) => write!(f, "Secret(*****)"),
            None => write!(f, "Disabled"),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthConfig({})", self)
    }
}

/// Performs constant-time string comparison to prevent timing attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_config_with_secret() {
        let auth = AuthConfig::with_secret("test-key");
        assert!(auth.requires_auth());
        assert!(auth.validate("test-key"));
        assert!(!auth.validate("wrong-key"));
    }

    #[test]
    fn test_auth_config_disabled() {
        let auth = AuthConfig::disabled();
        assert!(!auth.requires_auth());
        assert!(auth.validate("anything"));
        assert!(auth.auth_command().is_none());
    }

    #[test]
    fn test_auth_command() {
        let cmd = AuthConfig::with_secret("foobar").auth_command().unwrap();
        assert_eq!(cmd.name(), "AUTH");
        assert_eq!(cmd.arg_str(0), Some("foobar"));
    }

    #[test]
    fn test_from_option() {
        assert_eq!(AuthConfig::from_option(None), AuthConfig::default());
        assert!(AuthConfig::from_option(Some("x".into())).requires_auth());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("same-key-123", "same-key-123"));
        assert!(!constant_time_eq("key1", "key2"));
        assert!(!constant_time_eq("short", "longer"));
        assert!(!constant_time_eq("a", ""));
    }

    #[test]
    fn test_secret_is_masked() {
        let auth = AuthConfig::with_secret("secret");
        assert_eq!(format!("{}", auth), "Secret(*****)");
        assert!(!format!("{:?}", auth).contains("secret"));
        assert_eq!(format!("{}", AuthConfig::disabled()), "Disabled");
    }
}
