//! Error type shared by every operation in the crate.

use std::ffi::NulError;
use std::fmt;
use std::thread::ThreadId;

use crate::sys::jni;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A Java exception captured (and already cleared) after a JNI call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaException {
    /// Binary name of the throwable's class, e.g. `java/lang/NumberFormatException`.
    pub class: Option<String>,
    /// `Throwable.toString()`, when it could be obtained.
    pub description: String,
}

impl fmt::Display for JavaException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed signature {signature:?}: {reason}")]
    MalformedSignature { signature: String, reason: String },

    #[error("class not found: {name}")]
    ClassNotFound { name: String },

    #[error("no such field: {name} {signature}")]
    NoSuchField { name: String, signature: String },

    #[error("no such method: {name}{signature}")]
    NoSuchMethod { name: String, signature: String },

    #[error("type mismatch in {operation}: expected {expected}, found {found}")]
    TypeMismatch { operation: String, expected: String, found: String },

    #[error("{operation} threw {exception}")]
    InvocationError { operation: String, exception: JavaException },

    #[error("JVM could not allocate {what}")]
    AllocationError { what: String },

    #[error("invalid reference: {0}")]
    ReferenceError(String),

    #[error("cannot attach thread to the JVM: {reason} (JNI code {code})")]
    AttachError { code: jni::jint, reason: String },

    #[error("environment belongs to thread {owner:?} but was used from {current:?}")]
    ThreadAffinityViolation { owner: ThreadId, current: ThreadId },

    #[error("failed to launch the JVM: {0}")]
    Launch(String),

    #[error("JNI function table has no entry for {0}")]
    MissingFunction(&'static str),

    #[error("string contains an interior NUL byte: {0}")]
    Nul(#[from] NulError),
}

impl Error {
    pub(crate) fn mismatch(operation: impl fmt::Display, expected: impl fmt::Display, found: impl fmt::Display) -> Self {
        Error::TypeMismatch {
            operation: operation.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// The captured Java exception, for `InvocationError`.
    pub fn java_exception(&self) -> Option<&JavaException> {
        match self {
            Error::InvocationError { exception, .. } => Some(exception),
            _ => None,
        }
    }
}

/// Human readable text for the `JNI_E*` status codes.
pub fn describe_jni_code(code: jni::jint) -> &'static str {
    match code {
        jni::JNI_OK => "success",
        jni::JNI_EDETACHED => "thread detached from the VM",
        jni::JNI_EVERSION => "JNI version error",
        jni::JNI_ENOMEM => "not enough memory",
        jni::JNI_EEXIST => "VM already created",
        jni::JNI_EINVAL => "invalid arguments",
        _ => "unknown error",
    }
}
