//! Access descriptor validation.
//!
//! An access descriptor is the `ss:` URI the backend hands out. Only the
//! scheme is checked here; parsing the credentials inside is the native
//! layer's job.

use std::fmt;

use crate::error::ConnectError;

const SCHEME: &str = "ss";

/// Message used when the backend hands out something that is not an `ss:` URI.
pub const INVALID_DESCRIPTOR_MESSAGE: &str = "Invalid access key format from server";

/// Whether `url` is syntactically an `ss:` URI.
///
/// The scheme is compared case-insensitively, must be followed by a
/// non-empty remainder, and the whole string may not contain whitespace.
pub fn is_shadowsocks_url(url: &str) -> bool {
    if url.is_empty() || url.chars().any(char::is_whitespace) {
        return false;
    }
    match url.split_once(':') {
        Some((scheme, rest)) => scheme.eq_ignore_ascii_case(SCHEME) && !rest.is_empty(),
        None => false,
    }
}

/// An access descriptor that passed the scheme check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessDescriptor(String);

impl AccessDescriptor {
    /// Validate `url` as an access descriptor.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidConfig` error if the scheme is not `ss:`.
    pub fn parse(url: &str) -> Result<Self, ConnectError> {
        if is_shadowsocks_url(url) {
            Ok(Self(url.to_string()))
        } else {
            Err(ConnectError::invalid_config(INVALID_DESCRIPTOR_MESSAGE))
        }
    }

    /// The validated URI.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Credentials live in the URI, keep them out of logs.
impl fmt::Display for AccessDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ss://<redacted>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn accepts_ss_scheme() {
        assert!(is_shadowsocks_url("ss://abc"));
        assert!(is_shadowsocks_url("SS://YWVzLTI1Ni1nY206cGFzcw@1.2.3.4:8388"));
        assert!(is_shadowsocks_url("ss:opaque"));
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(!is_shadowsocks_url("http://bad"));
        assert!(!is_shadowsocks_url("ssh://host"));
        assert!(!is_shadowsocks_url("ss:"));
        assert!(!is_shadowsocks_url(""));
        assert!(!is_shadowsocks_url("ss:// abc"));
        assert!(!is_shadowsocks_url("no-scheme"));
    }

    #[test]
    fn parse_reports_invalid_config() {
        let err = AccessDescriptor::parse("http://bad").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidConfig);
        assert_eq!(err.message, INVALID_DESCRIPTOR_MESSAGE);
    }

    #[test]
    fn display_redacts_credentials() {
        let descriptor = AccessDescriptor::parse("ss://secret@host:1").unwrap();
        assert_eq!(descriptor.to_string(), "ss://<redacted>");
        assert_eq!(descriptor.as_str(), "ss://secret@host:1");
    }
}
