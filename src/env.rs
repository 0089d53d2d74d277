//! The per-thread environment facade.
//!
//! An [`Env`] wraps the `JNIEnv*` of one attached thread. Every operation first
//! checks that it runs on that thread, then goes through the JNI function
//! table, and finally captures and clears any pending Java exception so that
//! no call ever observes a stale one.
//!
//! # Example
//!
//! ```rust,ignore
//! use jni_host::{JValue, VirtualMachine};
//!
//! let vm = VirtualMachine::new()?;
//! let env = vm.env()?;
//!
//! let system = env.find_class("Ljava/lang/System;")?;
//! let out_id = env.static_field_id(&system, "out", "Ljava/io/PrintStream;")?;
//! let out = env.static_object_field(&system, &out_id)?.expect("System.out");
//!
//! let print_stream = env.object_class(&out)?;
//! let println = env.method_id(&print_stream, "println", "(Ljava/lang/String;)V")?;
//! let greeting = env.new_string_utf("Hello World!")?;
//! env.call_void_method(&out, &println, &[JValue::from(&greeting)])?;
//! ```

use std::ffi::{c_char, CStr, CString};
use std::fmt;
use std::ptr;
use std::thread::ThreadId;

use tracing::{debug, warn};

use crate::error::{Error, JavaException, Result};
use crate::refs::{ClassRef, GlobalRef, LocalRef, ObjectRef};
use crate::signature::{class_lookup_name, JavaType, MethodSignature, ReturnType};
use crate::sys::jni;
use crate::value::{narrow_primitive, HostValue, JValue, ReturnKind, Value};
use crate::vm::VirtualMachine;

/// Helper to call JNIEnv functions through the function table.
///
/// A null slot becomes `Error::MissingFunction`; must be used inside `unsafe`
/// in a function returning `Result`.
macro_rules! jni_call {
    ($env:expr, $func:ident $(, $arg:expr)* $(,)?) => {{
        let env_ptr: *mut jni::JNIEnv = $env;
        let f = (**env_ptr).$func.ok_or(Error::MissingFunction(stringify!($func)))?;
        f(env_ptr $(, $arg)*)
    }};
}

/// Picks the static, instance or nonvirtual flavour of a `Call*MethodA` family.
macro_rules! dispatch_call {
    ($raw:expr, $target:expr, $id:expr, $args:expr, $stat:ident, $inst:ident, $nonvirt:ident) => {
        match $target {
            RawTarget::Static(class) => jni_call!($raw, $stat, class, $id, $args),
            RawTarget::Instance(obj) => jni_call!($raw, $inst, obj, $id, $args),
            RawTarget::Nonvirtual(obj, class) => jni_call!($raw, $nonvirt, obj, class, $id, $args),
        }
    };
}

macro_rules! field_get {
    ($raw:expr, $is_static:expr, $holder:expr, $id:expr, $stat:ident, $inst:ident) => {
        if $is_static {
            jni_call!($raw, $stat, $holder, $id)
        } else {
            jni_call!($raw, $inst, $holder, $id)
        }
    };
}

macro_rules! field_set {
    ($raw:expr, $is_static:expr, $holder:expr, $id:expr, $value:expr, $stat:ident, $inst:ident) => {
        if $is_static {
            jni_call!($raw, $stat, $holder, $id, $value)
        } else {
            jni_call!($raw, $inst, $holder, $id, $value)
        }
    };
}

/// A resolved field: the JNI id plus the declared type it was resolved with.
#[derive(Debug, Clone)]
pub struct FieldId {
    raw: jni::jfieldID,
    name: String,
    ty: JavaType,
    is_static: bool,
    class: Option<String>,
}

// Field and method ids are process-wide and stay valid while the class is loaded.
unsafe impl Send for FieldId {}
unsafe impl Sync for FieldId {}

impl FieldId {
    pub fn as_raw(&self) -> jni::jfieldID {
        self.raw
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &JavaType {
        &self.ty
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(class) = &self.class {
            write!(f, "{class}.")?;
        }
        write!(f, "{}:{}", self.name, self.ty)
    }
}

/// A resolved method or constructor.
#[derive(Debug, Clone)]
pub struct MethodId {
    raw: jni::jmethodID,
    name: String,
    sig: MethodSignature,
    is_static: bool,
    class: Option<String>,
}

unsafe impl Send for MethodId {}
unsafe impl Sync for MethodId {}

impl MethodId {
    pub fn as_raw(&self) -> jni::jmethodID {
        self.raw
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.sig
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(class) = &self.class {
            write!(f, "{class}.")?;
        }
        write!(f, "{}{}", self.name, self.sig)
    }
}

/// What a method is invoked on.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// A static method of the class.
    Static(&'a ClassRef<'a>),
    /// Virtual dispatch on the receiver's runtime class.
    Instance(&'a LocalRef<'a>),
    /// The implementation declared by the given class, bypassing overrides.
    Nonvirtual(&'a LocalRef<'a>, &'a ClassRef<'a>),
}

impl Target<'_> {
    fn is_static(&self) -> bool {
        matches!(self, Target::Static(_))
    }
}

#[derive(Clone, Copy)]
enum RawTarget {
    Static(jni::jclass),
    Instance(jni::jobject),
    Nonvirtual(jni::jobject, jni::jclass),
}

/// Operation name plus the member it acts on, used in error messages.
struct Operation<'a> {
    name: &'static str,
    member: &'a dyn fmt::Display,
}

impl fmt::Display for Operation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.member)
    }
}

fn return_name(ret: &ReturnType) -> String {
    match ret {
        ReturnType::Void => "void".to_string(),
        ReturnType::Type(ty) => ty.java_name(),
    }
}

/// Declared reference types a host string may be passed as.
fn accepts_string(ty: &JavaType) -> bool {
    matches!(
        ty,
        JavaType::Object(name) if matches!(
            name.as_str(),
            "java/lang/String" | "java/lang/Object" | "java/lang/CharSequence" | "java/lang/Comparable" | "java/io/Serializable"
        )
    )
}

/// The JNI environment of one attached thread.
///
/// `Env` may be moved to another thread but every operation checks that it is
/// used on the thread it was obtained on, failing with
/// `Error::ThreadAffinityViolation` otherwise. It is not `Sync`, so references
/// borrowed from it stay on that thread too.
///
/// Once its thread detaches or the JVM is destroyed, every operation fails
/// with `Error::AttachError`.
pub struct Env {
    raw: *mut jni::JNIEnv,
    owner: ThreadId,
    generation: u64,
    vm: VirtualMachine,
}

// Moving is allowed; use on the wrong thread is rejected at runtime.
unsafe impl Send for Env {}

impl Env {
    /// # Safety
    ///
    /// `raw` must be the JNIEnv of the calling thread, obtained from `vm`
    /// during attach `generation`.
    pub(crate) unsafe fn from_raw(raw: *mut jni::JNIEnv, vm: VirtualMachine, generation: u64) -> Self {
        Env { raw, owner: std::thread::current().id(), generation, vm }
    }

    /// Returns the raw JNI environment pointer.
    pub fn raw(&self) -> *mut jni::JNIEnv {
        self.raw
    }

    /// The thread this environment belongs to.
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn vm(&self) -> &VirtualMachine {
        &self.vm
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether operations may reach the JVM from the calling thread.
    pub fn is_usable(&self) -> bool {
        self.check_usable().is_ok()
    }

    fn check_usable(&self) -> Result<()> {
        let current = std::thread::current().id();
        if current != self.owner {
            return Err(Error::ThreadAffinityViolation { owner: self.owner, current });
        }
        if self.vm.is_destroyed() {
            return Err(Error::AttachError {
                code: jni::JNI_EDETACHED,
                reason: "virtual machine was destroyed".to_string(),
            });
        }
        if !self.vm.is_attached(self.owner, self.generation) {
            return Err(Error::AttachError {
                code: jni::JNI_EDETACHED,
                reason: "thread was detached from the JVM".to_string(),
            });
        }
        Ok(())
    }

    // =========================================================================
    // Version and exceptions
    // =========================================================================

    /// Returns the JNI version implemented by the JVM.
    pub fn jni_version(&self) -> Result<jni::jint> {
        self.check_usable()?;
        Ok(unsafe { jni_call!(self.raw, GetVersion) })
    }

    /// Whether an exception is pending. Operations of this type never leave
    /// one behind; this only matters after raw calls through [`Env::raw`].
    pub fn exception_check(&self) -> Result<bool> {
        self.check_usable()?;
        Ok(unsafe { jni_call!(self.raw, ExceptionCheck) } != jni::JNI_FALSE)
    }

    /// Takes the pending exception, if any, and clears it.
    fn take_exception(&self) -> Result<Option<JavaException>> {
        let pending = unsafe { jni_call!(self.raw, ExceptionCheck) };
        if pending == jni::JNI_FALSE {
            return Ok(None);
        }
        let throwable = unsafe { jni_call!(self.raw, ExceptionOccurred) };
        unsafe { jni_call!(self.raw, ExceptionClear) };
        let throwable = LocalRef::from_raw(self, throwable);

        let exception = match throwable {
            Some(throwable) => self.describe_throwable(&throwable)?,
            None => JavaException { class: None, description: "unknown Java exception".to_string() },
        };
        Ok(Some(exception))
    }

    fn check_exception(&self, operation: &dyn fmt::Display) -> Result<()> {
        match self.take_exception()? {
            None => Ok(()),
            Some(exception) => {
                warn!(operation = %operation, exception = %exception, "Java exception raised");
                Err(Error::InvocationError { operation: operation.to_string(), exception })
            }
        }
    }

    fn describe_throwable(&self, throwable: &LocalRef<'_>) -> Result<JavaException> {
        let class = {
            let raw = unsafe { jni_call!(self.raw, GetObjectClass, throwable.as_raw()) };
            match LocalRef::from_raw(self, raw) {
                Some(class) => self.class_name_raw(class.as_raw())?,
                None => None,
            }
        };
        let description = match self.string_method_raw(throwable.as_raw(), b"toString\0")? {
            Some(text) => text,
            None => class.as_deref().map_or_else(|| "unknown Java exception".to_string(), |c| c.replace('/', ".")),
        };
        Ok(JavaException { class, description })
    }

    /// Calls a no-argument `String`-returning instance method. Any exception it
    /// raises is cleared and reported as `None`.
    fn string_method_raw(&self, obj: jni::jobject, name: &[u8]) -> Result<Option<String>> {
        const STRING_GETTER: &[u8] = b"()Ljava/lang/String;\0";

        let class = unsafe { jni_call!(self.raw, GetObjectClass, obj) };
        let Some(class) = LocalRef::from_raw(self, class) else {
            return Ok(None);
        };
        let method = unsafe {
            jni_call!(
                self.raw,
                GetMethodID,
                class.as_raw(),
                name.as_ptr() as *const c_char,
                STRING_GETTER.as_ptr() as *const c_char,
            )
        };
        if method.is_null() {
            unsafe { jni_call!(self.raw, ExceptionClear) };
            return Ok(None);
        }
        let result = unsafe { jni_call!(self.raw, CallObjectMethodA, obj, method, ptr::null()) };
        let result = LocalRef::from_raw(self, result);
        if unsafe { jni_call!(self.raw, ExceptionCheck) } != jni::JNI_FALSE {
            unsafe { jni_call!(self.raw, ExceptionClear) };
            return Ok(None);
        }
        match result {
            Some(text) => self.read_string_raw(text.as_raw()).map(Some),
            None => Ok(None),
        }
    }

    /// `Class.getName()` in binary (`/`) form.
    fn class_name_raw(&self, class: jni::jclass) -> Result<Option<String>> {
        Ok(self.string_method_raw(class, b"getName\0")?.map(|name| name.replace('.', "/")))
    }

    // =========================================================================
    // Classes and member ids
    // =========================================================================

    /// Finds a class by binary name (`java/lang/String`) or descriptor
    /// (`Ljava/lang/String;`, `[I`).
    pub fn find_class(&self, name: &str) -> Result<ClassRef<'_>> {
        self.check_usable()?;
        let lookup = class_lookup_name(name)?;
        let c_name = CString::new(lookup.as_str())?;
        let raw = unsafe { jni_call!(self.raw, FindClass, c_name.as_ptr()) };
        let class = LocalRef::from_raw(self, raw);

        if let Some(exception) = self.take_exception()? {
            return Err(match exception.class.as_deref() {
                None | Some("java/lang/NoClassDefFoundError") | Some("java/lang/ClassNotFoundException") => {
                    debug!(class = %lookup, "class not found");
                    Error::ClassNotFound { name: lookup }
                }
                Some(_) => Error::InvocationError { operation: format!("find_class {lookup}"), exception },
            });
        }
        match class {
            Some(class) => Ok(ClassRef::new(class, Some(lookup))),
            None => Err(Error::ClassNotFound { name: lookup }),
        }
    }

    /// Returns the runtime class of an object.
    pub fn object_class(&self, obj: &LocalRef<'_>) -> Result<ClassRef<'_>> {
        self.check_usable()?;
        let raw = obj.owned_by(self.raw)?;
        let class = unsafe { jni_call!(self.raw, GetObjectClass, raw) };
        let class = LocalRef::from_raw(self, class)
            .ok_or_else(|| Error::ReferenceError(format!("GetObjectClass returned null for {obj:?}")))?;
        let name = self.class_name_raw(class.as_raw())?;
        Ok(ClassRef::new(class, name))
    }

    pub fn field_id(&self, class: &ClassRef<'_>, name: &str, signature: &str) -> Result<FieldId> {
        self.resolve_field(class, name, signature, false)
    }

    pub fn static_field_id(&self, class: &ClassRef<'_>, name: &str, signature: &str) -> Result<FieldId> {
        self.resolve_field(class, name, signature, true)
    }

    fn resolve_field(&self, class: &ClassRef<'_>, name: &str, signature: &str, is_static: bool) -> Result<FieldId> {
        self.check_usable()?;
        let ty = JavaType::parse(signature)?;
        let class_raw = class.owned_by(self.raw)?;
        let c_name = CString::new(name)?;
        let c_sig = CString::new(signature)?;

        let raw = unsafe {
            if is_static {
                jni_call!(self.raw, GetStaticFieldID, class_raw, c_name.as_ptr(), c_sig.as_ptr())
            } else {
                jni_call!(self.raw, GetFieldID, class_raw, c_name.as_ptr(), c_sig.as_ptr())
            }
        };
        let member = qualified(class, name);
        if let Some(exception) = self.take_exception()? {
            return Err(match exception.class.as_deref() {
                None | Some("java/lang/NoSuchFieldError") => {
                    Error::NoSuchField { name: member, signature: signature.to_string() }
                }
                Some(_) => Error::InvocationError { operation: format!("field_id {member}:{signature}"), exception },
            });
        }
        if raw.is_null() {
            return Err(Error::NoSuchField { name: member, signature: signature.to_string() });
        }
        Ok(FieldId { raw, name: name.to_string(), ty, is_static, class: class.name().map(str::to_string) })
    }

    /// Resolves an instance method or a constructor (`<init>`).
    pub fn method_id(&self, class: &ClassRef<'_>, name: &str, signature: &str) -> Result<MethodId> {
        self.resolve_method(class, name, signature, false)
    }

    pub fn static_method_id(&self, class: &ClassRef<'_>, name: &str, signature: &str) -> Result<MethodId> {
        self.resolve_method(class, name, signature, true)
    }

    fn resolve_method(&self, class: &ClassRef<'_>, name: &str, signature: &str, is_static: bool) -> Result<MethodId> {
        self.check_usable()?;
        let sig = MethodSignature::parse(signature)?;
        let class_raw = class.owned_by(self.raw)?;
        let c_name = CString::new(name)?;
        let c_sig = CString::new(signature)?;

        let raw = unsafe {
            if is_static {
                jni_call!(self.raw, GetStaticMethodID, class_raw, c_name.as_ptr(), c_sig.as_ptr())
            } else {
                jni_call!(self.raw, GetMethodID, class_raw, c_name.as_ptr(), c_sig.as_ptr())
            }
        };
        let member = qualified(class, name);
        if let Some(exception) = self.take_exception()? {
            return Err(match exception.class.as_deref() {
                None | Some("java/lang/NoSuchMethodError") => {
                    Error::NoSuchMethod { name: member, signature: signature.to_string() }
                }
                Some(_) => Error::InvocationError { operation: format!("method_id {member}{signature}"), exception },
            });
        }
        if raw.is_null() {
            return Err(Error::NoSuchMethod { name: member, signature: signature.to_string() });
        }
        Ok(MethodId { raw, name: name.to_string(), sig, is_static, class: class.name().map(str::to_string) })
    }

    // =========================================================================
    // Fields
    // =========================================================================

    /// Reads a static field as whatever type it was declared with.
    pub fn get_static_field(&self, class: &ClassRef<'_>, field: &FieldId) -> Result<Value<'_>> {
        self.read_field("get_static_field", class, true, field, None)
    }

    /// Reads an instance field as whatever type it was declared with.
    pub fn get_field(&self, obj: &LocalRef<'_>, field: &FieldId) -> Result<Value<'_>> {
        self.read_field("get_field", obj, false, field, None)
    }

    pub fn static_object_field(&self, class: &ClassRef<'_>, field: &FieldId) -> Result<Option<ObjectRef<'_>>> {
        self.read_field("static_object_field", class, true, field, Some(ReturnKind::Object))?.into_object()
    }

    pub fn object_field(&self, obj: &LocalRef<'_>, field: &FieldId) -> Result<Option<ObjectRef<'_>>> {
        self.read_field("object_field", obj, false, field, Some(ReturnKind::Object))?.into_object()
    }

    fn read_field(
        &self,
        name: &'static str,
        holder: &LocalRef<'_>,
        is_static: bool,
        field: &FieldId,
        requested: Option<ReturnKind>,
    ) -> Result<Value<'_>> {
        self.check_usable()?;
        let op = Operation { name, member: field };
        check_field_path(&op, field, is_static)?;
        let declared = ReturnKind::of_type(&field.ty);
        if let Some(requested) = requested {
            if requested != declared {
                return Err(Error::mismatch(&op, field.ty.java_name(), requested));
            }
        }
        let holder = holder.owned_by(self.raw)?;
        let id = field.raw;

        let value = unsafe {
            match declared {
                ReturnKind::Boolean => Value::Boolean(
                    field_get!(self.raw, is_static, holder, id, GetStaticBooleanField, GetBooleanField)
                        != jni::JNI_FALSE,
                ),
                ReturnKind::Byte => Value::Byte(field_get!(self.raw, is_static, holder, id, GetStaticByteField, GetByteField)),
                ReturnKind::Char => Value::Char(field_get!(self.raw, is_static, holder, id, GetStaticCharField, GetCharField)),
                ReturnKind::Short => {
                    Value::Short(field_get!(self.raw, is_static, holder, id, GetStaticShortField, GetShortField))
                }
                ReturnKind::Int => Value::Int(field_get!(self.raw, is_static, holder, id, GetStaticIntField, GetIntField)),
                ReturnKind::Long => Value::Long(field_get!(self.raw, is_static, holder, id, GetStaticLongField, GetLongField)),
                ReturnKind::Float => {
                    Value::Float(field_get!(self.raw, is_static, holder, id, GetStaticFloatField, GetFloatField))
                }
                ReturnKind::Double => {
                    Value::Double(field_get!(self.raw, is_static, holder, id, GetStaticDoubleField, GetDoubleField))
                }
                ReturnKind::Object => {
                    let raw = field_get!(self.raw, is_static, holder, id, GetStaticObjectField, GetObjectField);
                    Value::Object(LocalRef::from_raw(self, raw).map(ObjectRef::new))
                }
                ReturnKind::Void => return Err(Error::mismatch(&op, "field type", "void")),
            }
        };
        self.check_exception(&op)?;
        Ok(value)
    }

    /// Writes a static field; the value must match the declared type exactly.
    pub fn set_static_field(&self, class: &ClassRef<'_>, field: &FieldId, value: JValue<'_>) -> Result<()> {
        self.write_field("set_static_field", class, true, field, value)
    }

    pub fn set_field(&self, obj: &LocalRef<'_>, field: &FieldId, value: JValue<'_>) -> Result<()> {
        self.write_field("set_field", obj, false, field, value)
    }

    fn write_field(
        &self,
        name: &'static str,
        holder: &LocalRef<'_>,
        is_static: bool,
        field: &FieldId,
        value: JValue<'_>,
    ) -> Result<()> {
        self.check_usable()?;
        let op = Operation { name, member: field };
        check_field_path(&op, field, is_static)?;
        let raw = value.to_raw(&field.ty, self.raw, &op)?;
        let holder = holder.owned_by(self.raw)?;
        let id = field.raw;

        unsafe {
            match ReturnKind::of_type(&field.ty) {
                ReturnKind::Boolean => field_set!(self.raw, is_static, holder, id, raw.z, SetStaticBooleanField, SetBooleanField),
                ReturnKind::Byte => field_set!(self.raw, is_static, holder, id, raw.b, SetStaticByteField, SetByteField),
                ReturnKind::Char => field_set!(self.raw, is_static, holder, id, raw.c, SetStaticCharField, SetCharField),
                ReturnKind::Short => field_set!(self.raw, is_static, holder, id, raw.s, SetStaticShortField, SetShortField),
                ReturnKind::Int => field_set!(self.raw, is_static, holder, id, raw.i, SetStaticIntField, SetIntField),
                ReturnKind::Long => field_set!(self.raw, is_static, holder, id, raw.j, SetStaticLongField, SetLongField),
                ReturnKind::Float => field_set!(self.raw, is_static, holder, id, raw.f, SetStaticFloatField, SetFloatField),
                ReturnKind::Double => field_set!(self.raw, is_static, holder, id, raw.d, SetStaticDoubleField, SetDoubleField),
                ReturnKind::Object => field_set!(self.raw, is_static, holder, id, raw.l, SetStaticObjectField, SetObjectField),
                ReturnKind::Void => return Err(Error::mismatch(&op, "field type", "void")),
            }
        }
        self.check_exception(&op)
    }

    // =========================================================================
    // Method invocation
    // =========================================================================

    /// Invokes `method` on `target`, expecting it to return `kind`.
    ///
    /// The method's declared return type must map to `kind`, `target` must be
    /// static exactly when the method is, and `args` must match the declared
    /// parameters one for one. A Java exception thrown by the callee is
    /// cleared and returned as `Error::InvocationError`.
    pub fn invoke(&self, target: Target<'_>, method: &MethodId, kind: ReturnKind, args: &[JValue<'_>]) -> Result<Value<'_>> {
        self.invoke_as("invoke", target, method, kind, args)
    }

    fn invoke_as(
        &self,
        name: &'static str,
        target: Target<'_>,
        method: &MethodId,
        kind: ReturnKind,
        args: &[JValue<'_>],
    ) -> Result<Value<'_>> {
        self.check_usable()?;
        let op = Operation { name, member: method };
        check_call(&op, &target, method, kind)?;

        let params = &method.sig.params;
        if params.len() != args.len() {
            return Err(Error::mismatch(&op, arg_count(params.len()), arg_count(args.len())));
        }
        let raw_args = params
            .iter()
            .zip(args)
            .map(|(ty, arg)| arg.to_raw(ty, self.raw, &op))
            .collect::<Result<Vec<_>>>()?;

        self.dispatch(&op, target, method, kind, &raw_args)
    }

    /// Like [`Env::invoke`], but converting loosely typed host values against
    /// the declared parameters: integers are range checked, doubles narrow to
    /// `float`, and strings become fresh `java.lang.String` objects.
    pub fn invoke_host(
        &self,
        target: Target<'_>,
        method: &MethodId,
        kind: ReturnKind,
        args: &[HostValue<'_>],
    ) -> Result<Value<'_>> {
        self.check_usable()?;
        let op = Operation { name: "invoke_host", member: method };
        check_call(&op, &target, method, kind)?;

        let params = &method.sig.params;
        if params.len() != args.len() {
            return Err(Error::mismatch(&op, arg_count(params.len()), arg_count(args.len())));
        }

        // Strings created for the call live until it returns.
        let mut temporaries = Vec::new();
        let mut raw_args = Vec::with_capacity(args.len());
        for (ty, arg) in params.iter().zip(args) {
            let raw = match (ty, arg) {
                (JavaType::Primitive(p), _) => narrow_primitive(*p, arg, &op)?,
                (_, HostValue::Nil) => jni::jvalue { l: ptr::null_mut() },
                (_, HostValue::Object(obj)) => jni::jvalue { l: obj.owned_by(self.raw)? },
                (ty, HostValue::Str(text)) if accepts_string(ty) => {
                    let string = self.new_string_utf(text)?;
                    let l = string.as_raw();
                    temporaries.push(string);
                    jni::jvalue { l }
                }
                (ty, other) => return Err(Error::mismatch(&op, ty.java_name(), other.type_name())),
            };
            raw_args.push(raw);
        }

        let result = self.dispatch(&op, target, method, kind, &raw_args);
        drop(temporaries);
        result
    }

    fn dispatch(
        &self,
        op: &Operation<'_>,
        target: Target<'_>,
        method: &MethodId,
        kind: ReturnKind,
        args: &[jni::jvalue],
    ) -> Result<Value<'_>> {
        let target = match target {
            Target::Static(class) => RawTarget::Static(class.owned_by(self.raw)?),
            Target::Instance(obj) => RawTarget::Instance(obj.owned_by(self.raw)?),
            Target::Nonvirtual(obj, class) => RawTarget::Nonvirtual(obj.owned_by(self.raw)?, class.owned_by(self.raw)?),
        };
        let id = method.raw;
        let args = args.as_ptr();

        let value = unsafe {
            match kind {
                ReturnKind::Void => {
                    dispatch_call!(self.raw, target, id, args, CallStaticVoidMethodA, CallVoidMethodA, CallNonvirtualVoidMethodA);
                    Value::Void
                }
                ReturnKind::Boolean => Value::Boolean(
                    dispatch_call!(
                        self.raw,
                        target,
                        id,
                        args,
                        CallStaticBooleanMethodA,
                        CallBooleanMethodA,
                        CallNonvirtualBooleanMethodA
                    ) != jni::JNI_FALSE,
                ),
                ReturnKind::Byte => Value::Byte(dispatch_call!(
                    self.raw,
                    target,
                    id,
                    args,
                    CallStaticByteMethodA,
                    CallByteMethodA,
                    CallNonvirtualByteMethodA
                )),
                ReturnKind::Char => Value::Char(dispatch_call!(
                    self.raw,
                    target,
                    id,
                    args,
                    CallStaticCharMethodA,
                    CallCharMethodA,
                    CallNonvirtualCharMethodA
                )),
                ReturnKind::Short => Value::Short(dispatch_call!(
                    self.raw,
                    target,
                    id,
                    args,
                    CallStaticShortMethodA,
                    CallShortMethodA,
                    CallNonvirtualShortMethodA
                )),
                ReturnKind::Int => Value::Int(dispatch_call!(
                    self.raw,
                    target,
                    id,
                    args,
                    CallStaticIntMethodA,
                    CallIntMethodA,
                    CallNonvirtualIntMethodA
                )),
                ReturnKind::Long => Value::Long(dispatch_call!(
                    self.raw,
                    target,
                    id,
                    args,
                    CallStaticLongMethodA,
                    CallLongMethodA,
                    CallNonvirtualLongMethodA
                )),
                ReturnKind::Float => Value::Float(dispatch_call!(
                    self.raw,
                    target,
                    id,
                    args,
                    CallStaticFloatMethodA,
                    CallFloatMethodA,
                    CallNonvirtualFloatMethodA
                )),
                ReturnKind::Double => Value::Double(dispatch_call!(
                    self.raw,
                    target,
                    id,
                    args,
                    CallStaticDoubleMethodA,
                    CallDoubleMethodA,
                    CallNonvirtualDoubleMethodA
                )),
                ReturnKind::Object => {
                    let raw = dispatch_call!(
                        self.raw,
                        target,
                        id,
                        args,
                        CallStaticObjectMethodA,
                        CallObjectMethodA,
                        CallNonvirtualObjectMethodA
                    );
                    Value::Object(LocalRef::from_raw(self, raw).map(ObjectRef::new))
                }
            }
        };
        self.check_exception(op)?;
        Ok(value)
    }

    /// Constructs an object with a constructor resolved through
    /// `method_id(class, "<init>", "(...)V")`.
    pub fn new_object(&self, class: &ClassRef<'_>, ctor: &MethodId, args: &[JValue<'_>]) -> Result<ObjectRef<'_>> {
        self.check_usable()?;
        let op = Operation { name: "new_object", member: ctor };
        if !ctor.is_constructor() || ctor.is_static || ctor.sig.ret != ReturnType::Void {
            return Err(Error::mismatch(&op, "constructor", format!("method {}", ctor.name)));
        }
        let params = &ctor.sig.params;
        if params.len() != args.len() {
            return Err(Error::mismatch(&op, arg_count(params.len()), arg_count(args.len())));
        }
        let raw_args = params
            .iter()
            .zip(args)
            .map(|(ty, arg)| arg.to_raw(ty, self.raw, &op))
            .collect::<Result<Vec<_>>>()?;
        let class_raw = class.owned_by(self.raw)?;

        let obj = unsafe { jni_call!(self.raw, NewObjectA, class_raw, ctor.raw, raw_args.as_ptr()) };
        let obj = LocalRef::from_raw(self, obj);
        self.check_exception(&op)?;
        obj.map(ObjectRef::new).ok_or_else(|| Error::AllocationError {
            what: format!("instance of {}", class.name().unwrap_or("<class>")),
        })
    }

    // =========================================================================
    // Strings
    // =========================================================================

    /// Creates a `java.lang.String`. Any Rust string is accepted, including
    /// interior NULs and supplementary characters.
    pub fn new_string_utf(&self, text: &str) -> Result<ObjectRef<'_>> {
        self.check_usable()?;
        let mut bytes = cesu8::to_java_cesu8(text).into_owned();
        bytes.push(0);
        let raw = unsafe { jni_call!(self.raw, NewStringUTF, bytes.as_ptr() as *const c_char) };
        let string = LocalRef::from_raw(self, raw);

        if let Some(exception) = self.take_exception()? {
            debug!(exception = %exception, "NewStringUTF failed");
            return Err(Error::AllocationError { what: format!("string of {} bytes", text.len()) });
        }
        string
            .map(ObjectRef::new)
            .ok_or_else(|| Error::AllocationError { what: format!("string of {} bytes", text.len()) })
    }

    /// Reads a `java.lang.String` into a Rust string.
    pub fn get_string(&self, obj: &LocalRef<'_>) -> Result<String> {
        self.check_usable()?;
        let raw = obj.owned_by(self.raw)?;
        let string_class = self.find_class("java/lang/String")?;
        let is_string = unsafe { jni_call!(self.raw, IsInstanceOf, raw, string_class.as_raw()) };
        if is_string == jni::JNI_FALSE {
            let found = self.object_class(obj)?.name().map_or_else(|| "object".to_string(), |n| n.replace('/', "."));
            return Err(Error::mismatch("get_string", "java.lang.String", found));
        }
        self.read_string_raw(raw)
    }

    fn read_string_raw(&self, string: jni::jstring) -> Result<String> {
        let chars = unsafe { jni_call!(self.raw, GetStringUTFChars, string, ptr::null_mut()) };
        if chars.is_null() {
            let _ = self.take_exception()?;
            return Err(Error::AllocationError { what: "string characters".to_string() });
        }
        let bytes = unsafe { CStr::from_ptr(chars) }.to_bytes().to_vec();
        unsafe { jni_call!(self.raw, ReleaseStringUTFChars, string, chars) };

        match cesu8::from_java_cesu8(&bytes) {
            Ok(text) => Ok(text.into_owned()),
            Err(_) => Err(Error::mismatch("get_string", "modified UTF-8", "invalid byte sequence")),
        }
    }

    // =========================================================================
    // References
    // =========================================================================

    /// Promotes a reference so it outlives this call frame and can be used on
    /// other threads. Release it with [`Env::delete_global_ref`].
    pub fn new_global_ref(&self, obj: &LocalRef<'_>) -> Result<GlobalRef> {
        self.check_usable()?;
        let local = obj.owned_by(self.raw)?;
        let raw = unsafe { jni_call!(self.raw, NewGlobalRef, local) };
        if raw.is_null() {
            return Err(Error::AllocationError { what: "global reference".to_string() });
        }
        let global = self.vm.globals().insert(raw);
        debug!(global = ?global, "created global reference");
        Ok(global)
    }

    /// Releases a global reference. A second release, or one of a reference
    /// from another VM, fails with `Error::ReferenceError`.
    pub fn delete_global_ref(&self, global: &GlobalRef) -> Result<()> {
        self.check_usable()?;
        let raw = self.vm.globals().remove(global)?;
        unsafe { jni_call!(self.raw, DeleteGlobalRef, raw) };
        debug!(global = ?global, "deleted global reference");
        Ok(())
    }

    /// A local reference to the object behind a live global reference.
    pub fn global_to_local(&self, global: &GlobalRef) -> Result<ObjectRef<'_>> {
        self.check_usable()?;
        let raw = self.vm.globals().resolve(global)?;
        let local = unsafe { jni_call!(self.raw, NewLocalRef, raw) };
        LocalRef::from_raw(self, local)
            .map(ObjectRef::new)
            .ok_or_else(|| Error::AllocationError { what: "local reference".to_string() })
    }

    /// Ensures at least `capacity` more local references can be created.
    pub fn ensure_local_capacity(&self, capacity: jni::jint) -> Result<()> {
        self.check_usable()?;
        let res = unsafe { jni_call!(self.raw, EnsureLocalCapacity, capacity) };
        if res != jni::JNI_OK {
            let _ = self.take_exception()?;
            return Err(Error::AllocationError { what: format!("{capacity} local reference slots") });
        }
        Ok(())
    }

    pub fn is_instance_of(&self, obj: &LocalRef<'_>, class: &ClassRef<'_>) -> Result<bool> {
        self.check_usable()?;
        let obj = obj.owned_by(self.raw)?;
        let class = class.owned_by(self.raw)?;
        Ok(unsafe { jni_call!(self.raw, IsInstanceOf, obj, class) } != jni::JNI_FALSE)
    }

    pub fn is_same_object(&self, a: &LocalRef<'_>, b: &LocalRef<'_>) -> Result<bool> {
        self.check_usable()?;
        let a = a.owned_by(self.raw)?;
        let b = b.owned_by(self.raw)?;
        Ok(unsafe { jni_call!(self.raw, IsSameObject, a, b) } != jni::JNI_FALSE)
    }

    /// Called from `LocalRef::drop`; nothing to report on failure. After
    /// detach or destroy the handle is already gone, so the JVM is not called.
    pub(crate) fn delete_local_raw(&self, raw: jni::jobject) {
        if !self.is_usable() {
            return;
        }
        unsafe {
            if let Some(delete) = (**self.raw).DeleteLocalRef {
                delete(self.raw, raw);
            }
        }
    }

    pub(crate) fn delete_global_raw(&self, raw: jni::jobject) {
        unsafe {
            if let Some(delete) = (**self.raw).DeleteGlobalRef {
                delete(self.raw, raw);
            }
        }
    }
}

/// Typed wrappers over [`Env::invoke`], one per return kind.
macro_rules! call_wrappers {
    ($($kind:ident: $ty:ty => $name:ident, $static_name:ident;)*) => {
        impl Env {
            $(
                #[doc = concat!("Calls an instance method returning `", stringify!($ty), "`.")]
                pub fn $name(&self, obj: &LocalRef<'_>, method: &MethodId, args: &[JValue<'_>]) -> Result<$ty> {
                    let value = self.invoke_as(stringify!($name), Target::Instance(obj), method, ReturnKind::$kind, args)?;
                    <$ty>::try_from(value)
                }

                #[doc = concat!("Calls a static method returning `", stringify!($ty), "`.")]
                pub fn $static_name(&self, class: &ClassRef<'_>, method: &MethodId, args: &[JValue<'_>]) -> Result<$ty> {
                    let value = self.invoke_as(stringify!($static_name), Target::Static(class), method, ReturnKind::$kind, args)?;
                    <$ty>::try_from(value)
                }
            )*
        }
    };
}

call_wrappers! {
    Void: () => call_void_method, call_static_void_method;
    Boolean: bool => call_boolean_method, call_static_boolean_method;
    Byte: i8 => call_byte_method, call_static_byte_method;
    Char: u16 => call_char_method, call_static_char_method;
    Short: i16 => call_short_method, call_static_short_method;
    Int: i32 => call_int_method, call_static_int_method;
    Long: i64 => call_long_method, call_static_long_method;
    Float: f32 => call_float_method, call_static_float_method;
    Double: f64 => call_double_method, call_static_double_method;
}

impl Env {
    /// Calls an instance method returning a reference; `None` for `null`.
    pub fn call_object_method(
        &self,
        obj: &LocalRef<'_>,
        method: &MethodId,
        args: &[JValue<'_>],
    ) -> Result<Option<ObjectRef<'_>>> {
        self.invoke_as("call_object_method", Target::Instance(obj), method, ReturnKind::Object, args)?.into_object()
    }

    pub fn call_static_object_method(
        &self,
        class: &ClassRef<'_>,
        method: &MethodId,
        args: &[JValue<'_>],
    ) -> Result<Option<ObjectRef<'_>>> {
        self.invoke_as("call_static_object_method", Target::Static(class), method, ReturnKind::Object, args)?
            .into_object()
    }
}

/// Typed field accessors, one static and one instance variant per primitive.
macro_rules! field_getters {
    ($($kind:ident: $ty:ty => $name:ident, $static_name:ident;)*) => {
        impl Env {
            $(
                pub fn $static_name(&self, class: &ClassRef<'_>, field: &FieldId) -> Result<$ty> {
                    let value = self.read_field(stringify!($static_name), class, true, field, Some(ReturnKind::$kind))?;
                    <$ty>::try_from(value)
                }

                pub fn $name(&self, obj: &LocalRef<'_>, field: &FieldId) -> Result<$ty> {
                    let value = self.read_field(stringify!($name), obj, false, field, Some(ReturnKind::$kind))?;
                    <$ty>::try_from(value)
                }
            )*
        }
    };
}

field_getters! {
    Boolean: bool => boolean_field, static_boolean_field;
    Byte: i8 => byte_field, static_byte_field;
    Char: u16 => char_field, static_char_field;
    Short: i16 => short_field, static_short_field;
    Int: i32 => int_field, static_int_field;
    Long: i64 => long_field, static_long_field;
    Float: f32 => float_field, static_float_field;
    Double: f64 => double_field, static_double_field;
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env").field("raw", &self.raw).field("owner", &self.owner).finish()
    }
}

fn qualified(class: &ClassRef<'_>, member: &str) -> String {
    match class.name() {
        Some(class) => format!("{class}.{member}"),
        None => member.to_string(),
    }
}

fn arg_count(n: usize) -> String {
    if n == 1 {
        "1 argument".to_string()
    } else {
        format!("{n} arguments")
    }
}

fn check_field_path(op: &Operation<'_>, field: &FieldId, is_static: bool) -> Result<()> {
    if field.is_static == is_static {
        return Ok(());
    }
    let (expected, found) = if field.is_static {
        ("instance field", "static field")
    } else {
        ("static field", "instance field")
    };
    Err(Error::mismatch(op, expected, found))
}

fn check_call(op: &Operation<'_>, target: &Target<'_>, method: &MethodId, kind: ReturnKind) -> Result<()> {
    if method.is_constructor() {
        return Err(Error::mismatch(op, "method", "constructor (use new_object)"));
    }
    if method.is_static != target.is_static() {
        let (expected, found) = if method.is_static {
            ("static call", "instance call")
        } else {
            ("instance call", "static call")
        };
        return Err(Error::mismatch(op, expected, found));
    }
    if ReturnKind::of(&method.sig.ret) != kind {
        return Err(Error::mismatch(op, return_name(&method.sig.ret), kind));
    }
    Ok(())
}
