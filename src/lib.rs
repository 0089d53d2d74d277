//! # jni-host
//!
//! Call into a Java Virtual Machine from Rust through JNI.
//!
//! The crate launches (or attaches to) the JVM of the current process, hands
//! out a per-thread [`Env`], and exposes class lookup, field access and
//! method invocation with checked signatures, RAII reference guards and Java
//! exceptions turned into [`Error`] values.
//!
//! ## Features
//!
//! - **Signature codec**: parse and render JNI descriptors like `(Ljava/lang/String;)V`
//! - **Checked calls**: the return kind and every argument are matched
//!   against the declared descriptor before anything reaches the JVM
//! - **No stale exceptions**: a pending exception is captured, described and
//!   cleared after every call
//! - **Reference guards**: local references are deleted on drop, global
//!   references are released exactly once
//! - **Thread affinity**: an [`Env`] used off its thread fails instead of crashing
//!
//! ## Quick Start
//!
//! Point `JAVA_HOME` (or `JVM_LIB_PATH`) at a JDK, then:
//!
//! ```rust,ignore
//! use jni_host::prelude::*;
//!
//! fn main() -> jni_host::Result<()> {
//!     let vm = VirtualMachine::new()?;
//!     let env = vm.env()?;
//!
//!     let math = env.find_class("java/lang/Math")?;
//!     let abs = env.static_method_id(&math, "abs", "(F)F")?;
//!     assert_eq!(env.call_static_float_method(&math, &abs, &[JValue::Float(-2.0)])?, 2.0);
//!
//!     let system = env.find_class("Ljava/lang/System;")?;
//!     let out_id = env.static_field_id(&system, "out", "Ljava/io/PrintStream;")?;
//!     let out = env.static_object_field(&system, &out_id)?.expect("System.out");
//!     let println = env.method_id(&env.object_class(&out)?, "println", "(Ljava/lang/String;)V")?;
//!     let greeting = env.new_string_utf("Hello World!")?;
//!     env.call_void_method(&out, &println, &[JValue::from(&greeting)])?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Your Code                            │
//! ├─────────────────────────────────────────────────────────┤
//! │          Virtual Machine Handle (vm module)              │
//! │   VirtualMachine - process singleton, attach/destroy     │
//! │   JavaVmBuilder  - libjvm lookup, options, class path    │
//! ├─────────────────────────────────────────────────────────┤
//! │          Environment Facade (env module)                 │
//! │   Env - find_class, *_id, fields, invoke, strings        │
//! ├──────────────────────────┬──────────────────────────────┤
//! │  refs: LocalRef,         │  value: JValue, HostValue,    │
//! │  ClassRef, ObjectRef,    │  Value, ReturnKind            │
//! │  GlobalRef               │  signature: descriptors       │
//! ├──────────────────────────┴──────────────────────────────┤
//! │              Raw FFI Bindings (sys module)               │
//! │   sys::jni - JNI types, vtables (236 + 8 slots)          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//!
//! | Variable            | Used by                      | Meaning                          |
//! |---------------------|------------------------------|----------------------------------|
//! | `JVM_LIB_PATH`      | [`vm::find_libjvm`]          | exact path to libjvm             |
//! | `JAVA_HOME`         | [`vm::find_libjvm`]          | JDK root searched for libjvm     |
//! | `JNI_HOST_JVM_OPTS` | [`JavaVmBuilder::from_env`]  | whitespace separated JVM options |
//! | `CLASSPATH`         | [`JavaVmBuilder::from_env`]  | becomes `-Djava.class.path`      |
//!
//! ## Logging
//!
//! Events are emitted through `tracing` (launch, attach/detach, global
//! reference traffic, captured exceptions). Install a subscriber to see them.

pub mod env;
pub mod error;
pub mod prelude;
pub mod refs;
pub mod signature;
pub mod sys;
pub mod value;
pub mod vm;

#[cfg(test)]
mod testing;

pub use crate::sys::jni;

pub use crate::env::{Env, FieldId, MethodId, Target};
pub use crate::error::{Error, JavaException, Result};
pub use crate::refs::{ClassRef, GlobalRef, LocalRef, ObjectRef};
pub use crate::signature::{JavaType, MethodSignature, Primitive, ReturnType};
pub use crate::value::{HostValue, JValue, ReturnKind, Value};
pub use crate::vm::{JavaVmBuilder, VirtualMachine};
