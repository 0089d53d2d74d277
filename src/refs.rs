//! Reference guards.
//!
//! Every reference the JVM hands back is wrapped before user code sees it:
//!
//! - [`LocalRef`] (and its typed forms [`ClassRef`], [`ObjectRef`]) borrows the
//!   [`Env`] that produced it and deletes the local reference when dropped.
//!   Ownership makes a second delete impossible and the borrow keeps the
//!   reference on the thread whose local frame it lives in.
//! - [`GlobalRef`] is a promoted reference that outlives any local frame and
//!   may cross threads. It is released explicitly through
//!   [`Env::delete_global_ref`]; the VM's registry rejects double releases,
//!   releases against another VM, and use after release.
//!
//! ```rust,ignore
//! let env = vm.env()?;
//! let string_class = env.find_class("java/lang/String")?;  // LocalRef inside
//! let pinned = env.new_global_ref(&string_class)?;
//! drop(string_class);                                       // DeleteLocalRef
//! env.delete_global_ref(&pinned)?;                          // DeleteGlobalRef
//! assert!(env.delete_global_ref(&pinned).is_err());         // ReferenceError
//! ```

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::env::Env;
use crate::error::{Error, Result};
use crate::sys::jni;

/// A local reference, deleted on drop.
///
/// Never null: a null result from the JVM is reported as an error or as
/// `None` before a `LocalRef` is built.
pub struct LocalRef<'env> {
    env: &'env Env,
    raw: jni::jobject,
}

impl<'env> LocalRef<'env> {
    pub(crate) fn from_raw(env: &'env Env, raw: jni::jobject) -> Option<Self> {
        if raw.is_null() {
            None
        } else {
            Some(LocalRef { env, raw })
        }
    }

    /// Returns the underlying jobject.
    pub fn as_raw(&self) -> jni::jobject {
        self.raw
    }

    /// The environment this reference belongs to.
    pub fn env(&self) -> &'env Env {
        self.env
    }

    /// Deletes the local reference now rather than at end of scope.
    pub fn delete(self) {
        drop(self)
    }

    /// Gives up ownership without deleting; the JVM frees it when the
    /// enclosing native frame returns.
    pub fn into_raw(self) -> jni::jobject {
        let raw = self.raw;
        std::mem::forget(self);
        raw
    }

    /// The raw handle, provided it was produced on the JNIEnv `env`.
    pub(crate) fn owned_by(&self, env: *mut jni::JNIEnv) -> Result<jni::jobject> {
        if self.env.raw() == env {
            Ok(self.raw)
        } else {
            Err(Error::ReferenceError(format!(
                "local reference {:p} belongs to another environment",
                self.raw
            )))
        }
    }
}

impl Drop for LocalRef<'_> {
    fn drop(&mut self) {
        self.env.delete_local_raw(self.raw);
    }
}

impl fmt::Debug for LocalRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalRef({:p})", self.raw)
    }
}

/// A local reference to a `java.lang.Class`.
pub struct ClassRef<'env> {
    inner: LocalRef<'env>,
    name: Option<String>,
}

impl<'env> ClassRef<'env> {
    pub(crate) fn new(inner: LocalRef<'env>, name: Option<String>) -> Self {
        ClassRef { inner, name }
    }

    /// The binary name it was looked up by, if it came from `find_class`.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Treats the class as a plain object (a `java.lang.Class` instance).
    pub fn into_object(self) -> ObjectRef<'env> {
        ObjectRef(self.inner)
    }
}

impl<'env> Deref for ClassRef<'env> {
    type Target = LocalRef<'env>;

    fn deref(&self) -> &LocalRef<'env> {
        &self.inner
    }
}

impl fmt::Debug for ClassRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "ClassRef({name}, {:p})", self.inner.raw),
            None => write!(f, "ClassRef({:p})", self.inner.raw),
        }
    }
}

/// A local reference to any object instance, strings included.
pub struct ObjectRef<'env>(LocalRef<'env>);

impl<'env> ObjectRef<'env> {
    pub(crate) fn new(inner: LocalRef<'env>) -> Self {
        ObjectRef(inner)
    }
}

impl<'env> Deref for ObjectRef<'env> {
    type Target = LocalRef<'env>;

    fn deref(&self) -> &LocalRef<'env> {
        &self.0
    }
}

impl fmt::Debug for ObjectRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:p})", self.0.raw)
    }
}

/// A promoted (JNI global) reference.
///
/// Cloning copies the handle, not the JNI reference: all clones are released
/// together by a single [`Env::delete_global_ref`].
#[derive(Clone)]
pub struct GlobalRef {
    id: u64,
    registry: u64,
    raw: jni::jobject,
}

// Global references are valid on every attached thread.
unsafe impl Send for GlobalRef {}
unsafe impl Sync for GlobalRef {}

impl GlobalRef {
    pub fn as_raw(&self) -> jni::jobject {
        self.raw
    }
}

impl fmt::Debug for GlobalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GlobalRef(#{}, {:p})", self.id, self.raw)
    }
}

static NEXT_REGISTRY: AtomicU64 = AtomicU64::new(1);

/// Live global references of one VM.
pub(crate) struct GlobalRegistry {
    id: u64,
    next: AtomicU64,
    live: Mutex<HashMap<u64, usize>>,
}

impl GlobalRegistry {
    pub(crate) fn new() -> Self {
        GlobalRegistry {
            id: NEXT_REGISTRY.fetch_add(1, Ordering::Relaxed),
            next: AtomicU64::new(1),
            live: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn insert(&self, raw: jni::jobject) -> GlobalRef {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.live.lock().insert(id, raw as usize);
        GlobalRef { id, registry: self.id, raw }
    }

    /// The raw handle of a still-live reference.
    pub(crate) fn resolve(&self, global: &GlobalRef) -> Result<jni::jobject> {
        self.check_owner(global)?;
        match self.live.lock().get(&global.id) {
            Some(&raw) => Ok(raw as jni::jobject),
            None => Err(Error::ReferenceError(format!("{global:?} was already released"))),
        }
    }

    /// Unregisters a reference; the caller deletes it on the JVM side.
    pub(crate) fn remove(&self, global: &GlobalRef) -> Result<jni::jobject> {
        self.check_owner(global)?;
        match self.live.lock().remove(&global.id) {
            Some(raw) => Ok(raw as jni::jobject),
            None => Err(Error::ReferenceError(format!("{global:?} was already released"))),
        }
    }

    /// Unregisters everything still live.
    pub(crate) fn drain(&self) -> Vec<jni::jobject> {
        self.live.lock().drain().map(|(_, raw)| raw as jni::jobject).collect()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    fn check_owner(&self, global: &GlobalRef) -> Result<()> {
        if global.registry == self.id {
            Ok(())
        } else {
            Err(Error::ReferenceError(format!("{global:?} belongs to another virtual machine")))
        }
    }
}
