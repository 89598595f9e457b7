// SPDX-License-Identifier: MIT

mod marshal;
mod parse;
mod registration;
mod signature;
mod unsupported;
mod validation;

pub use marshal::*;
pub use parse::*;
pub use registration::*;
pub use signature::*;
pub use unsupported::*;
pub use validation::*;

use derive_more::From;

/// Every failure the library reports falls in exactly one of these classes.
#[derive(Debug, From, PartialEq, Clone)]
pub enum Error {
    /// A value could not be encoded (programming error on the caller side).
    Marshal(MarshalError),
    /// Malformed or non-conforming input bytes or text.
    Parse(ParseError),
    /// A decoded or constructed document violates a semantic rule.
    Validation(ValidationError),
    /// COSE signing or verification failed.
    Signature(SignatureError),
    /// A registry rejected a registration.
    Registration(RegistrationError),
    /// The document uses something the library does not know how to handle.
    Unsupported(UnsupportedError),
}

impl Error {
    /// Prefixes a validation error with the position of the failing node, e.g.
    /// `reference value at index 3`. Other error classes are returned as is.
    pub fn context<C: Into<String>>(self, ctx: C) -> Self {
        match self {
            Self::Validation(err) => Self::Validation(err.at(ctx)),
            other => other,
        }
    }

    pub fn validation<M: Into<String>>(msg: M) -> Self {
        Self::Validation(ValidationError::new(msg))
    }

    pub fn marshal<M: std::fmt::Display>(msg: M) -> Self {
        Self::Marshal(MarshalError(msg.to_string()))
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self {
            Self::Marshal(err) => write!(f, "{err}"),
            Self::Parse(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Signature(err) => write!(f, "{err}"),
            Self::Registration(err) => write!(f, "{err}"),
            Self::Unsupported(err) => write!(f, "{err}"),
        }
    }
}

/// Adds index/field context to the validation errors of a `Result`.
pub trait ResultExt<T> {
    fn context<C: Into<String>>(self, ctx: C) -> std::result::Result<T, Error>;

    fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F)
        -> std::result::Result<T, Error>;
}

impl<T> ResultExt<T> for std::result::Result<T, Error> {
    fn context<C: Into<String>>(self, ctx: C) -> std::result::Result<T, Error> {
        self.map_err(|e| e.context(ctx))
    }

    fn with_context<C: Into<String>, F: FnOnce() -> C>(
        self,
        f: F,
    ) -> std::result::Result<T, Error> {
        self.map_err(|e| e.context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_context_nesting() {
        let err: std::result::Result<(), Error> = Err(Error::validation("bad digest"));
        let err = err
            .context("measurement at index 0")
            .context("reference value at index 3")
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "reference value at index 3, measurement at index 0: bad digest"
        );
    }

    #[test]
    fn test_context_leaves_other_errors_alone() {
        let err = Error::marshal("boom").context("tag at index 0");
        assert_eq!(err.to_string(), "marshal error: boom");
    }
}
