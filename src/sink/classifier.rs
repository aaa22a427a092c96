//! Upload Failure Classification
//!
//! Walks the whole cause chain of a failure. Any link carrying a 401/403
//! status, or a service error code containing `authenticationfailed`
//! (case-insensitive), makes the failure fatal. Everything else is retriable.

use crate::sink::error::UploadError;
use std::error::Error;

const AUTH_ERROR_CODE_FRAGMENT: &str = "authenticationfailed";

/// Outcome of classifying an upload failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    FatalAuth,
    Retriable,
}

/// Classify any error whose chain may contain `UploadError` links
///
/// Links of other types are skipped, not inspected.
pub fn classify(err: &(dyn Error + 'static)) -> ErrorClass {
    let mut current: Option<&(dyn Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(upload) = e.downcast_ref::<UploadError>() {
            if is_auth_failure(upload) {
                return ErrorClass::FatalAuth;
            }
        }
        current = e.source();
    }
    ErrorClass::Retriable
}

fn is_auth_failure(err: &UploadError) -> bool {
    if matches!(err.status_code(), Some(401) | Some(403)) {
        return true;
    }
    err.error_code()
        .map(|code| code.to_lowercase().contains(AUTH_ERROR_CODE_FRAGMENT))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            classify(&UploadError::new("x").with_status(401)),
            ErrorClass::FatalAuth
        );
        assert_eq!(
            classify(&UploadError::new("x").with_status(403)),
            ErrorClass::FatalAuth
        );
        assert_eq!(
            classify(&UploadError::new("x").with_status(500)),
            ErrorClass::Retriable
        );
        assert_eq!(
            classify(&UploadError::new("x").with_status(404)),
            ErrorClass::Retriable
        );
    }

    #[test]
    fn test_error_code_without_status() {
        let err = UploadError::new("server refused").with_error_code("AuthenticationFailed");
        assert_eq!(classify(&err), ErrorClass::FatalAuth);

        let err = UploadError::new("x").with_error_code("ServerBusy");
        assert_eq!(classify(&err), ErrorClass::Retriable);
    }

    #[test]
    fn test_walks_nested_causes() {
        let err = UploadError::new("append failed").caused_by(
            UploadError::new("request failed")
                .caused_by(UploadError::new("unauthorized").with_status(401)),
        );
        assert_eq!(classify(&err), ErrorClass::FatalAuth);
    }

    #[test]
    fn test_through_foreign_wrapper() {
        #[derive(Debug, thiserror::Error)]
        #[error("wrapped")]
        struct Wrapper(#[source] UploadError);

        let err = Wrapper(UploadError::new("forbidden").with_status(403));
        assert_eq!(classify(&err), ErrorClass::FatalAuth);
    }

    #[test]
    fn test_plain_failure_is_retriable() {
        let err = UploadError::new("connection reset")
            .caused_by(UploadError::new("timeout").with_status(503));
        assert_eq!(classify(&err), ErrorClass::Retriable);

        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        assert_eq!(classify(&io), ErrorClass::Retriable);
    }
}
