//! Error types for account provisioning.
//!
//! Every layer reports failures through the single [`Error`] enum. Console and directory
//! responses are classified once, at the boundary where they are read, so callers match on
//! variants instead of inspecting message text. Multi-resource operations report exactly which
//! sub-resources were touched through [`Error::CreateFailed`] and [`Error::DeleteIncomplete`].

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A sub-resource that makes up a UNIX account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// The account's entry in the identity directory.
    DirectoryEntry,
    /// The account's own-name group in the identity directory.
    Group,
    /// The account's principal in the credential store.
    Principal,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DirectoryEntry => "directory entry",
            Self::Group => "group",
            Self::Principal => "principal",
        })
    }
}

/// Where a conflicting name was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameSource {
    /// A user entry in the identity directory.
    DirectoryUser,
    /// A group entry in the identity directory.
    DirectoryGroup,
    /// A principal in the credential store.
    CredentialPrincipal,
    /// The local passwd database.
    LocalPasswd,
    /// The local group database.
    LocalGroup,
}

impl fmt::Display for NameSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DirectoryUser => "directory users",
            Self::DirectoryGroup => "directory groups",
            Self::CredentialPrincipal => "credential principals",
            Self::LocalPasswd => "local passwd database",
            Self::LocalGroup => "local group database",
        })
    }
}

/// Outcome of one compensating action taken after a failed create step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompensationOutcome {
    /// Resource the compensation tried to remove.
    pub resource: Resource,
    /// Failure message, `None` when the resource was removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompensationOutcome {
    /// Records a successful removal.
    #[must_use]
    pub const fn removed(resource: Resource) -> Self {
        Self {
            resource,
            error: None,
        }
    }

    /// Records a failed removal.
    #[must_use]
    pub fn failed(resource: Resource, error: &Error) -> Self {
        Self {
            resource,
            error: Some(error.to_string()),
        }
    }

    /// Returns true if the resource was removed.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// A sub-resource that could not be removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceFailure {
    /// Resource that is still present.
    pub resource: Resource,
    /// Why the removal failed.
    pub message: String,
}

/// Main error type for provisioning operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Validation error (bad username, short password, bad shell, ...)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Malformed term string
    #[error("Invalid term: {0}")]
    InvalidTerm(String),

    /// The requested name is already in use somewhere
    #[error("Name `{name}` already exists in {found_in}")]
    NameConflict {
        /// Conflicting name
        name: String,
        /// Store that reported the conflict
        found_in: NameSource,
    },

    /// Every id in the configured range is taken
    #[error("No available ids in range [{min}, {max}]")]
    NoAvailableIds {
        /// Lower bound (inclusive)
        min: u32,
        /// Upper bound (inclusive)
        max: u32,
    },

    /// No sub-resource of the account exists anywhere
    #[error("No such account: {0}")]
    NoSuchAccount(String),

    /// Directory entry not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Directory entry already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Credential principal already exists
    #[error("Principal already exists: {0}")]
    PrincipalExists(String),

    /// Credential principal does not exist
    #[error("Principal does not exist: {0}")]
    PrincipalNotFound(String),

    /// Error line reported by the administration console
    #[error("Console error: {0}")]
    ConsoleError(String),

    /// The console process exited while a response was being read
    #[error("Console terminated unexpectedly{}", format_output(.output))]
    ConsoleTerminated {
        /// Partial output collected before the console exited
        output: Vec<String>,
    },

    /// The console did not re-display its prompt in time
    #[error("Timeout waiting for console response: {0}")]
    ResponseTimeout(String),

    /// The console sent output that does not belong to the current exchange
    #[error("Console protocol violation: {0}")]
    ProtocolViolation(String),

    /// Remote service sent a response that could not be interpreted
    #[error("Malformed response from {service}: {message}")]
    MalformedResponse {
        /// Service name
        service: String,
        /// Error message
        message: String,
    },

    /// Remote service is unreachable
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Operation timed out
    #[error("Timeout waiting for service: {0}")]
    Timeout(String),

    /// External service error
    #[error("External service error: {service}: {message}")]
    ExternalServiceError {
        /// Service name that failed
        service: String,
        /// Error message
        message: String,
    },

    /// A privileged helper process exited unsuccessfully
    #[error("{program} failed with status {status}{}", format_child_output(.output))]
    ChildFailed {
        /// Program name
        program: String,
        /// Exit status
        status: i32,
        /// Captured stdout and stderr
        output: String,
    },

    /// A create step failed after earlier steps succeeded
    #[error("Failed to create {step}: {cause}{}", format_compensation(.compensation))]
    CreateFailed {
        /// The step that failed
        step: Resource,
        /// Why it failed
        cause: Box<Error>,
        /// Compensating actions taken, in order
        compensation: Vec<CompensationOutcome>,
    },

    /// Account deletion removed only part of the account
    #[error("Account `{username}` partially deleted{}", format_delete(.removed, .failed))]
    DeleteIncomplete {
        /// Account name
        username: String,
        /// Resources that were removed
        removed: Vec<Resource>,
        /// Resources that remain
        failed: Vec<ResourceFailure>,
    },

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(String),
}

/// Specialized result type for provisioning operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error response for serialization.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetail,
}

/// Error detail structure.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorDetail {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Whether the caller may retry the operation unchanged
    pub retryable: bool,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::InvalidTerm(_) => "INVALID_TERM",
            Self::NameConflict { .. } => "NAME_CONFLICT",
            Self::NoAvailableIds { .. } => "NO_AVAILABLE_IDS",
            Self::NoSuchAccount(_) => "NO_SUCH_ACCOUNT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::PrincipalExists(_) => "PRINCIPAL_EXISTS",
            Self::PrincipalNotFound(_) => "PRINCIPAL_NOT_FOUND",
            Self::ConsoleError(_) => "CONSOLE_ERROR",
            Self::ConsoleTerminated { .. } => "CONSOLE_TERMINATED",
            Self::ResponseTimeout(_) => "RESPONSE_TIMEOUT",
            Self::ProtocolViolation(_) => "PROTOCOL_VIOLATION",
            Self::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Timeout(_) => "TIMEOUT",
            Self::ExternalServiceError { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::ChildFailed { .. } => "CHILD_FAILED",
            Self::CreateFailed { .. } => "CREATE_FAILED",
            Self::DeleteIncomplete { .. } => "DELETE_INCOMPLETE",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// Returns true if retrying the same call may succeed.
    ///
    /// Connection-level failures are retryable; malformed responses, protocol violations and
    /// application-level outcomes are not. A failed create is retryable only when its cause is
    /// and every compensating action succeeded.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::ServiceUnavailable(_) => true,
            Self::CreateFailed {
                cause,
                compensation,
                ..
            } => cause.is_retryable() && compensation.iter().all(CompensationOutcome::succeeded),
            _ => false,
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_)
                | Self::ExternalServiceError { .. }
                | Self::ConsoleTerminated { .. }
                | Self::ProtocolViolation(_)
                | Self::DeleteIncomplete { .. }
                | Self::CreateFailed { .. }
        )
    }

    /// Converts the error into an `ErrorResponse`.
    #[must_use]
    pub fn into_error_response(self) -> ErrorResponse {
        let details = match &self {
            Self::CreateFailed {
                step, compensation, ..
            } => Some(serde_json::json!({
                "step": step,
                "compensation": compensation,
            })),
            Self::DeleteIncomplete {
                removed, failed, ..
            } => Some(serde_json::json!({
                "removed": removed,
                "failed": failed,
            })),
            Self::NameConflict { found_in, .. } => {
                Some(serde_json::json!({ "found_in": found_in }))
            }
            _ => None,
        };

        ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                retryable: self.is_retryable(),
                details,
            },
        }
    }
}

fn format_output(output: &[String]) -> String {
    if output.is_empty() {
        String::new()
    } else {
        format!(": {}", output.join("\n"))
    }
}

fn format_child_output(output: &str) -> String {
    if output.is_empty() {
        String::new()
    } else {
        format!(": {output}")
    }
}

fn format_compensation(compensation: &[CompensationOutcome]) -> String {
    if compensation.is_empty() {
        return String::new();
    }

    let steps = compensation
        .iter()
        .map(|outcome| match &outcome.error {
            None => format!("removed {}", outcome.resource),
            Some(err) => format!("failed to remove {} ({err})", outcome.resource),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("; compensation: {steps}")
}

fn format_delete(removed: &[Resource], failed: &[ResourceFailure]) -> String {
    let removed = if removed.is_empty() {
        "nothing".to_string()
    } else {
        removed
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    let failed = failed
        .iter()
        .map(|failure| format!("{} ({})", failure.resource, failure.message))
        .collect::<Vec<_>>()
        .join(", ");
    format!(": removed {removed}; not removed {failed}")
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Self::ConfigError(format!("invalid pattern: {err}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::NameConflict {
                name: "jdoe".to_string(),
                found_in: NameSource::LocalPasswd,
            }
            .error_code(),
            "NAME_CONFLICT"
        );
        assert_eq!(
            Error::NoAvailableIds { min: 1, max: 2 }.error_code(),
            "NO_AVAILABLE_IDS"
        );
        assert_eq!(
            Error::ConsoleTerminated { output: Vec::new() }.error_code(),
            "CONSOLE_TERMINATED"
        );
        assert_eq!(
            Error::ChildFailed {
                program: "addclub".to_string(),
                status: 1,
                output: String::new(),
            }
            .error_code(),
            "CHILD_FAILED"
        );
    }

    #[test]
    fn test_error_display() {
        let err = Error::NameConflict {
            name: "jdoe".to_string(),
            found_in: NameSource::CredentialPrincipal,
        };
        assert_eq!(
            err.to_string(),
            "Name `jdoe` already exists in credential principals"
        );

        let err = Error::ChildFailed {
            program: "addmember".to_string(),
            status: 2,
            output: "no such user".to_string(),
        };
        assert_eq!(err.to_string(), "addmember failed with status 2: no such user");

        let err = Error::ConsoleTerminated {
            output: vec!["kadmin: lost connection".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Console terminated unexpectedly: kadmin: lost connection"
        );
    }

    #[test]
    fn test_create_failed_display_names_step_and_compensation() {
        let err = Error::CreateFailed {
            step: Resource::Principal,
            cause: Box::new(Error::ConsoleError("add_principal: quota".to_string())),
            compensation: vec![
                CompensationOutcome::removed(Resource::Group),
                CompensationOutcome::failed(
                    Resource::DirectoryEntry,
                    &Error::Timeout("delete".to_string()),
                ),
            ],
        };
        let message = err.to_string();
        assert!(message.starts_with("Failed to create principal: Console error"));
        assert!(message.contains("removed group"));
        assert!(message.contains("failed to remove directory entry"));
    }

    #[test]
    fn test_delete_incomplete_display() {
        let err = Error::DeleteIncomplete {
            username: "jdoe".to_string(),
            removed: vec![Resource::DirectoryEntry],
            failed: vec![ResourceFailure {
                resource: Resource::Principal,
                message: "timeout".to_string(),
            }],
        };
        assert_eq!(
            err.to_string(),
            "Account `jdoe` partially deleted: removed directory entry; not removed principal (timeout)"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Timeout("bind".to_string()).is_retryable());
        assert!(Error::ServiceUnavailable("ldap".to_string()).is_retryable());
        assert!(!Error::MalformedResponse {
            service: "ldap".to_string(),
            message: "bad".to_string(),
        }
        .is_retryable());
        assert!(!Error::ProtocolViolation("stale".to_string()).is_retryable());

        let clean = Error::CreateFailed {
            step: Resource::Group,
            cause: Box::new(Error::Timeout("add".to_string())),
            compensation: vec![CompensationOutcome::removed(Resource::DirectoryEntry)],
        };
        assert!(clean.is_retryable());

        let dirty = Error::CreateFailed {
            step: Resource::Group,
            cause: Box::new(Error::Timeout("add".to_string())),
            compensation: vec![CompensationOutcome::failed(
                Resource::DirectoryEntry,
                &Error::Timeout("delete".to_string()),
            )],
        };
        assert!(!dirty.is_retryable());
    }

    #[test]
    fn test_should_log() {
        assert!(Error::ConfigError("test".to_string()).should_log());
        assert!(Error::ProtocolViolation("test".to_string()).should_log());
        assert!(!Error::NotFound("test".to_string()).should_log());
        assert!(!Error::ValidationError("test".to_string()).should_log());
    }

    #[test]
    fn test_into_error_response_carries_report() {
        let err = Error::DeleteIncomplete {
            username: "jdoe".to_string(),
            removed: vec![Resource::Group],
            failed: vec![ResourceFailure {
                resource: Resource::Principal,
                message: "console died".to_string(),
            }],
        };
        let response = err.into_error_response();
        assert_eq!(response.error.code, "DELETE_INCOMPLETE");
        assert!(!response.error.retryable);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"removed\":[\"group\"]"));
        assert!(json.contains("\"resource\":\"principal\""));
    }

    #[test]
    fn test_error_response_omits_empty_details() {
        let response = Error::NotFound("uid=x".to_string()).into_error_response();
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("details"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let err = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::ConfigError(_)));
    }
}
