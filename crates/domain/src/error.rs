//! Domain validation errors.

/// Input rejected while building a domain value.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The authentication code was empty.
    #[error("auth code must not be empty")]
    EmptyAuthCode,

    /// The authentication code is not a valid hex string.
    #[error("auth code is not valid hex")]
    InvalidAuthCode(#[source] hex::FromHexError),

    /// The volume name is not one of the known options.
    #[error("unknown volume {0:?}")]
    UnknownVolume(String),
}
