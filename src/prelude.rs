//! Common imports for calling into the JVM.
//!
//! This prelude is intentionally small. It covers the types most callers use
//! while avoiding over-broad re-exports.

pub use crate::env::{Env, FieldId, MethodId, Target};
pub use crate::error::{Error, Result};
pub use crate::refs::{ClassRef, GlobalRef, LocalRef, ObjectRef};
pub use crate::sys::jni;
pub use crate::value::{HostValue, JValue, ReturnKind, Value};
pub use crate::vm::{JavaVmBuilder, VirtualMachine};
