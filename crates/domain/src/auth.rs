//! Application-layer authentication credential.
//!
//! The official mobile apps pair with a machine by writing a per-user code
//! to the auth characteristic. The same code has to be replayed after every
//! connection before sensors or commands are accepted.

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Raw credential bytes, parsed from the hex form shown by the apps.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthCode(Vec<u8>);

impl AuthCode {
    /// Credential bytes as written to the auth characteristic.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for AuthCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::EmptyAuthCode);
        }
        hex::decode(s)
            .map(Self)
            .map_err(ValidationError::InvalidAuthCode)
    }
}

// Keep the credential out of logs.
impl fmt::Debug for AuthCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthCode(<{} bytes>)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_hex_code() {
        let code: AuthCode = "87302f3c2b62e4f0".parse().unwrap();
        assert_eq!(
            code.as_bytes(),
            &[0x87, 0x30, 0x2f, 0x3c, 0x2b, 0x62, 0xe4, 0xf0]
        );
    }

    #[test]
    fn should_reject_empty_code() {
        let err = "  ".parse::<AuthCode>().unwrap_err();
        assert!(matches!(err, ValidationError::EmptyAuthCode));
    }

    #[test]
    fn should_reject_odd_length_code() {
        let err = "abc".parse::<AuthCode>().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidAuthCode(_)));
    }

    #[test]
    fn should_reject_non_hex_code() {
        let err = "zz".parse::<AuthCode>().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidAuthCode(_)));
    }

    #[test]
    fn should_not_leak_code_in_debug_output() {
        let code: AuthCode = "87302f3c2b62e4f0".parse().unwrap();
        assert_eq!(format!("{code:?}"), "AuthCode(<8 bytes>)");
    }
}
