//! Raw FFI bindings.
//!
//! Nothing here is safe to call directly; use [`crate::Env`] and
//! [`crate::VirtualMachine`].

pub mod jni;
