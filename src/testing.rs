//! An in-process stand-in for libjvm, used by unit tests.
//!
//! Fills in the slice of the JNI and invocation tables this crate calls,
//! backed by a small object heap with a handful of well-known classes:
//!
//! - `java/lang/System.out` and `java/io/PrintStream.println(String)` (output
//!   is recorded in [`FakeState::stdout`])
//! - `java/lang/Math.abs(F)F`, `abs(D)D`, `max(II)I`, `addExact(JJ)J`, `PI`
//! - `java/lang/Integer.parseInt(String)`, which throws
//!   `NumberFormatException`, and `MAX_VALUE`
//! - `java/lang/Character.isDigit(C)Z`, `String.length()`,
//!   `Object.toString()`, `Class.getName()`
//! - `demo/Config` with static `level:I` and `name:String`
//! - `demo/Point` with `<init>(II)V`, fields `x`, `y` and `length()D`
//!
//! Nonvirtual calls are left out of the table on purpose so the
//! missing-function path can be exercised.

use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ThreadId;

use parking_lot::{Mutex, MutexGuard};

use crate::sys::jni;
use crate::vm::VirtualMachine;

#[derive(Debug, Clone)]
enum Obj {
    Class(&'static str),
    PrintStream,
    Str(String),
    Throwable { class: &'static str, message: String },
    Point { x: i32, y: i32 },
}

impl Obj {
    fn class_name(&self) -> &'static str {
        match self {
            Obj::Class(_) => "java/lang/Class",
            Obj::PrintStream => "java/io/PrintStream",
            Obj::Str(_) => "java/lang/String",
            Obj::Throwable { class, .. } => *class,
            Obj::Point { .. } => "demo/Point",
        }
    }

    fn to_java_string(&self) -> String {
        match self {
            Obj::Class(name) => format!("class {}", name.replace('/', ".")),
            Obj::PrintStream => "java.io.PrintStream@1b6d3586".to_string(),
            Obj::Str(text) => text.clone(),
            Obj::Throwable { class, message } => format!("{}: {message}", class.replace('/', ".")),
            Obj::Point { x, y } => format!("Point({x}, {y})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefKind {
    Local,
    Global,
}

struct Member {
    class: &'static str,
    name: &'static str,
    sig: &'static str,
    is_static: bool,
}

const fn member(class: &'static str, name: &'static str, sig: &'static str, is_static: bool) -> Member {
    Member { class, name, sig, is_static }
}

const CLASSES: &[&str] = &[
    "java/lang/Object",
    "java/lang/Class",
    "java/lang/String",
    "java/lang/System",
    "java/io/PrintStream",
    "java/lang/Math",
    "java/lang/Integer",
    "java/lang/Character",
    "demo/Config",
    "demo/Point",
];

const METHODS: &[Member] = &[
    member("java/io/PrintStream", "println", "(Ljava/lang/String;)V", false),
    member("java/lang/Object", "toString", "()Ljava/lang/String;", false),
    member("java/lang/Class", "getName", "()Ljava/lang/String;", false),
    member("java/lang/String", "length", "()I", false),
    member("java/lang/Math", "abs", "(F)F", true),
    member("java/lang/Math", "abs", "(D)D", true),
    member("java/lang/Math", "max", "(II)I", true),
    member("java/lang/Math", "addExact", "(JJ)J", true),
    member("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I", true),
    member("java/lang/Character", "isDigit", "(C)Z", true),
    member("demo/Point", "<init>", "(II)V", false),
    member("demo/Point", "length", "()D", false),
];

const FIELDS: &[Member] = &[
    member("java/lang/System", "out", "Ljava/io/PrintStream;", true),
    member("java/lang/Math", "PI", "D", true),
    member("java/lang/Integer", "MAX_VALUE", "I", true),
    member("demo/Config", "level", "I", true),
    member("demo/Config", "name", "Ljava/lang/String;", true),
    member("demo/Point", "x", "I", false),
    member("demo/Point", "y", "I", false),
];

/// Heap, reference table and pending exception of a fake JVM.
pub(crate) struct FakeState {
    heap: Vec<Obj>,
    refs: HashMap<usize, (usize, RefKind)>,
    next_handle: usize,
    pending: Option<usize>,
    system_out: usize,
    config_level: i32,
    config_name: Option<usize>,
    utf_buffers: HashMap<usize, Box<[u8]>>,
    /// Lines passed to `PrintStream.println`.
    pub(crate) stdout: Vec<String>,
    /// Deletes of handles that were not live (or of the wrong kind).
    pub(crate) bad_deletes: usize,
    /// Makes `NewStringUTF` throw `OutOfMemoryError`.
    pub(crate) fail_allocations: bool,
}

impl FakeState {
    fn new() -> Self {
        FakeState {
            heap: vec![Obj::PrintStream],
            refs: HashMap::new(),
            next_handle: 0x1000,
            pending: None,
            system_out: 0,
            config_level: 1,
            config_name: None,
            utf_buffers: HashMap::new(),
            stdout: Vec::new(),
            bad_deletes: 0,
            fail_allocations: false,
        }
    }

    pub(crate) fn live_locals(&self) -> usize {
        self.refs.values().filter(|(_, kind)| *kind == RefKind::Local).count()
    }

    pub(crate) fn live_globals(&self) -> usize {
        self.refs.values().filter(|(_, kind)| *kind == RefKind::Global).count()
    }

    fn alloc(&mut self, obj: Obj) -> usize {
        self.heap.push(obj);
        self.heap.len() - 1
    }

    fn new_ref(&mut self, index: usize, kind: RefKind) -> jni::jobject {
        let handle = self.next_handle;
        self.next_handle += 8;
        self.refs.insert(handle, (index, kind));
        handle as jni::jobject
    }

    fn local(&mut self, obj: Obj) -> jni::jobject {
        let index = self.alloc(obj);
        self.new_ref(index, RefKind::Local)
    }

    fn target(&self, handle: jni::jobject) -> Option<usize> {
        self.refs.get(&(handle as usize)).map(|(index, _)| *index)
    }

    fn object(&self, handle: jni::jobject) -> Option<&Obj> {
        self.target(handle).map(|index| &self.heap[index])
    }

    fn class_ref(&mut self, name: &'static str) -> jni::jobject {
        let index = match self.heap.iter().position(|obj| matches!(obj, Obj::Class(n) if *n == name)) {
            Some(index) => index,
            None => self.alloc(Obj::Class(name)),
        };
        self.new_ref(index, RefKind::Local)
    }

    fn class_of_handle(&self, handle: jni::jobject) -> Option<&'static str> {
        match self.object(handle)? {
            Obj::Class(name) => Some(*name),
            _ => None,
        }
    }

    fn string(&self, handle: jni::jobject) -> Option<String> {
        match self.object(handle)? {
            Obj::Str(text) => Some(text.clone()),
            _ => None,
        }
    }

    fn throw(&mut self, class: &'static str, message: impl Into<String>) {
        let index = self.alloc(Obj::Throwable { class, message: message.into() });
        self.pending = Some(index);
    }

    fn delete(&mut self, handle: jni::jobject, kind: RefKind) {
        match self.refs.get(&(handle as usize)) {
            Some((_, k)) if *k == kind => {
                self.refs.remove(&(handle as usize));
            }
            _ => self.bad_deletes += 1,
        }
    }
}

/// The fake `JavaVM`. The first field is the table pointer, so a pointer to
/// this struct is a valid `JavaVM*`.
#[repr(C)]
struct FakeVm {
    table: *const jni::JNIInvokeInterface_,
    env_table: *const jni::JNINativeInterface_,
    state: Mutex<FakeState>,
    envs: Mutex<HashMap<ThreadId, usize>>,
    destroyed: AtomicBool,
    /// Makes `GetEnv` report every thread detached and `AttachCurrentThread` fail.
    refuse_attach: AtomicBool,
}

unsafe impl Send for FakeVm {}
unsafe impl Sync for FakeVm {}

/// The fake `JNIEnv` of one attached thread.
#[repr(C)]
struct FakeEnv {
    table: *const jni::JNINativeInterface_,
    vm: *const FakeVm,
}

/// Test-side view of a fake JVM.
pub(crate) struct Fake {
    vm: &'static FakeVm,
}

impl Fake {
    pub(crate) fn state(&self) -> MutexGuard<'static, FakeState> {
        self.vm.state.lock()
    }

    /// Whether `DestroyJavaVM` was called.
    pub(crate) fn destroyed(&self) -> bool {
        self.vm.destroyed.load(Ordering::SeqCst)
    }

    pub(crate) fn refuse_attach(&self, refuse: bool) {
        self.vm.refuse_attach.store(refuse, Ordering::SeqCst);
    }
}

/// A fake JVM wrapped like one created elsewhere (destroy leaves it running).
pub(crate) fn fake_vm() -> (VirtualMachine, Fake) {
    build(false)
}

/// A fake JVM wrapped like one this crate launched.
pub(crate) fn owned_fake_vm() -> (VirtualMachine, Fake) {
    build(true)
}

fn build(owned: bool) -> (VirtualMachine, Fake) {
    let fake: &'static FakeVm = Box::leak(Box::new(FakeVm {
        table: Box::leak(Box::new(invoke_table())),
        env_table: Box::leak(Box::new(native_table())),
        state: Mutex::new(FakeState::new()),
        envs: Mutex::new(HashMap::new()),
        destroyed: AtomicBool::new(false),
        refuse_attach: AtomicBool::new(false),
    }));
    let raw = fake as *const FakeVm as *mut jni::JavaVM;
    let vm = VirtualMachine::wrap(raw, jni::JNI_VERSION_1_8, owned, None);
    (vm, Fake { vm: fake })
}

unsafe fn fake_of(vm: *mut jni::JavaVM) -> &'static FakeVm {
    &*(vm as *const FakeVm)
}

unsafe fn state(env: *mut jni::JNIEnv) -> MutexGuard<'static, FakeState> {
    let env = &*(env as *const FakeEnv);
    (*env.vm).state.lock()
}

// =========================================================================
// Invocation interface
// =========================================================================

fn invoke_table() -> jni::JNIInvokeInterface_ {
    jni::JNIInvokeInterface_ {
        reserved: [ptr::null(); 3],
        DestroyJavaVM: Some(destroy_java_vm),
        AttachCurrentThread: Some(attach_current_thread),
        DetachCurrentThread: Some(detach_current_thread),
        GetEnv: Some(get_env),
        AttachCurrentThreadAsDaemon: Some(attach_current_thread),
    }
}

unsafe extern "system" fn destroy_java_vm(vm: *mut jni::JavaVM) -> jni::jint {
    fake_of(vm).destroyed.store(true, Ordering::SeqCst);
    jni::JNI_OK
}

unsafe extern "system" fn attach_current_thread(
    vm: *mut jni::JavaVM,
    penv: *mut *mut c_void,
    _args: *mut c_void,
) -> jni::jint {
    let fake = fake_of(vm);
    if fake.refuse_attach.load(Ordering::SeqCst) {
        return jni::JNI_ERR;
    }
    let mut envs = fake.envs.lock();
    let env = *envs.entry(std::thread::current().id()).or_insert_with(|| {
        Box::into_raw(Box::new(FakeEnv { table: fake.env_table, vm: fake as *const FakeVm })) as usize
    });
    *penv = env as *mut c_void;
    jni::JNI_OK
}

unsafe extern "system" fn detach_current_thread(vm: *mut jni::JavaVM) -> jni::jint {
    fake_of(vm).envs.lock().remove(&std::thread::current().id());
    jni::JNI_OK
}

unsafe extern "system" fn get_env(vm: *mut jni::JavaVM, penv: *mut *mut c_void, _version: jni::jint) -> jni::jint {
    let fake = fake_of(vm);
    if fake.refuse_attach.load(Ordering::SeqCst) {
        *penv = ptr::null_mut();
        return jni::JNI_EDETACHED;
    }
    match fake.envs.lock().get(&std::thread::current().id()) {
        Some(&env) => {
            *penv = env as *mut c_void;
            jni::JNI_OK
        }
        None => {
            *penv = ptr::null_mut();
            jni::JNI_EDETACHED
        }
    }
}

// =========================================================================
// Native interface
// =========================================================================

fn native_table() -> jni::JNINativeInterface_ {
    // All-zero is a table of `None` slots.
    let mut t: jni::JNINativeInterface_ = unsafe { std::mem::zeroed() };

    t.GetVersion = Some(get_version);
    t.FindClass = Some(find_class);
    t.ExceptionOccurred = Some(exception_occurred);
    t.ExceptionClear = Some(exception_clear);
    t.ExceptionCheck = Some(exception_check);

    t.NewGlobalRef = Some(new_global_ref);
    t.DeleteGlobalRef = Some(delete_global_ref);
    t.DeleteLocalRef = Some(delete_local_ref);
    t.IsSameObject = Some(is_same_object);
    t.NewLocalRef = Some(new_local_ref);
    t.EnsureLocalCapacity = Some(ensure_local_capacity);

    t.NewObjectA = Some(new_object_a);
    t.GetObjectClass = Some(get_object_class);
    t.IsInstanceOf = Some(is_instance_of);

    t.GetMethodID = Some(get_method_id);
    t.GetStaticMethodID = Some(get_static_method_id);
    t.GetFieldID = Some(get_field_id);
    t.GetStaticFieldID = Some(get_static_field_id);

    t.CallVoidMethodA = Some(call_void);
    t.CallStaticVoidMethodA = Some(call_void);
    t.CallBooleanMethodA = Some(call_boolean);
    t.CallStaticBooleanMethodA = Some(call_boolean);
    t.CallIntMethodA = Some(call_int);
    t.CallStaticIntMethodA = Some(call_int);
    t.CallLongMethodA = Some(call_long);
    t.CallStaticLongMethodA = Some(call_long);
    t.CallFloatMethodA = Some(call_float);
    t.CallStaticFloatMethodA = Some(call_float);
    t.CallDoubleMethodA = Some(call_double);
    t.CallStaticDoubleMethodA = Some(call_double);
    t.CallObjectMethodA = Some(call_object);
    t.CallStaticObjectMethodA = Some(call_object);

    t.GetObjectField = Some(get_object_field);
    t.GetStaticObjectField = Some(get_object_field);
    t.SetObjectField = Some(set_object_field);
    t.SetStaticObjectField = Some(set_object_field);
    t.GetIntField = Some(get_int_field);
    t.GetStaticIntField = Some(get_int_field);
    t.SetIntField = Some(set_int_field);
    t.SetStaticIntField = Some(set_int_field);
    t.GetStaticDoubleField = Some(get_double_field);

    t.NewStringUTF = Some(new_string_utf);
    t.GetStringUTFChars = Some(get_string_utf_chars);
    t.ReleaseStringUTFChars = Some(release_string_utf_chars);
    t
}

unsafe extern "system" fn get_version(_env: *mut jni::JNIEnv) -> jni::jint {
    jni::JNI_VERSION_1_8
}

unsafe extern "system" fn find_class(env: *mut jni::JNIEnv, name: *const c_char) -> jni::jclass {
    let mut st = state(env);
    let name = CStr::from_ptr(name).to_string_lossy();
    match CLASSES.iter().copied().find(|class| *class == name) {
        Some(class) => st.class_ref(class),
        None => {
            st.throw("java/lang/NoClassDefFoundError", name.into_owned());
            ptr::null_mut()
        }
    }
}

unsafe extern "system" fn exception_occurred(env: *mut jni::JNIEnv) -> jni::jthrowable {
    let mut st = state(env);
    match st.pending {
        Some(index) => st.new_ref(index, RefKind::Local),
        None => ptr::null_mut(),
    }
}

unsafe extern "system" fn exception_clear(env: *mut jni::JNIEnv) {
    state(env).pending = None;
}

unsafe extern "system" fn exception_check(env: *mut jni::JNIEnv) -> jni::jboolean {
    state(env).pending.is_some() as jni::jboolean
}

unsafe extern "system" fn new_global_ref(env: *mut jni::JNIEnv, obj: jni::jobject) -> jni::jobject {
    let mut st = state(env);
    match st.target(obj) {
        Some(index) => st.new_ref(index, RefKind::Global),
        None => ptr::null_mut(),
    }
}

unsafe extern "system" fn delete_global_ref(env: *mut jni::JNIEnv, obj: jni::jobject) {
    state(env).delete(obj, RefKind::Global);
}

unsafe extern "system" fn delete_local_ref(env: *mut jni::JNIEnv, obj: jni::jobject) {
    state(env).delete(obj, RefKind::Local);
}

unsafe extern "system" fn is_same_object(env: *mut jni::JNIEnv, a: jni::jobject, b: jni::jobject) -> jni::jboolean {
    let st = state(env);
    (st.target(a) == st.target(b)) as jni::jboolean
}

unsafe extern "system" fn new_local_ref(env: *mut jni::JNIEnv, obj: jni::jobject) -> jni::jobject {
    let mut st = state(env);
    match st.target(obj) {
        Some(index) => st.new_ref(index, RefKind::Local),
        None => ptr::null_mut(),
    }
}

unsafe extern "system" fn ensure_local_capacity(env: *mut jni::JNIEnv, capacity: jni::jint) -> jni::jint {
    if capacity > 65_536 {
        state(env).throw("java/lang/OutOfMemoryError", "could not ensure local capacity");
        return jni::JNI_ERR;
    }
    jni::JNI_OK
}

unsafe extern "system" fn new_object_a(
    env: *mut jni::JNIEnv,
    _class: jni::jclass,
    method: jni::jmethodID,
    args: *const jni::jvalue,
) -> jni::jobject {
    let mut st = state(env);
    match lookup(METHODS, method) {
        Some(m) if m.class == "demo/Point" && m.name == "<init>" => {
            let (x, y) = ((*args).i, (*args.add(1)).i);
            st.local(Obj::Point { x, y })
        }
        _ => {
            st.throw("java/lang/InstantiationError", "not a constructor");
            ptr::null_mut()
        }
    }
}

unsafe extern "system" fn get_object_class(env: *mut jni::JNIEnv, obj: jni::jobject) -> jni::jclass {
    let mut st = state(env);
    match st.object(obj).map(Obj::class_name) {
        Some(class) => st.class_ref(class),
        None => ptr::null_mut(),
    }
}

unsafe extern "system" fn is_instance_of(env: *mut jni::JNIEnv, obj: jni::jobject, class: jni::jclass) -> jni::jboolean {
    let st = state(env);
    let (Some(obj), Some(class)) = (st.object(obj), st.class_of_handle(class)) else {
        return jni::JNI_FALSE;
    };
    (class == "java/lang/Object" || obj.class_name() == class) as jni::jboolean
}

fn lookup(table: &'static [Member], id: *mut c_void) -> Option<&'static Member> {
    table.get((id as usize).wrapping_sub(1))
}

unsafe fn member_id(
    env: *mut jni::JNIEnv,
    table: &'static [Member],
    class: jni::jclass,
    name: *const c_char,
    sig: *const c_char,
    is_static: bool,
    error: &'static str,
) -> *mut c_void {
    let mut st = state(env);
    let name = CStr::from_ptr(name).to_string_lossy();
    let sig = CStr::from_ptr(sig).to_string_lossy();
    let found = st.class_of_handle(class).and_then(|class| {
        table.iter().position(|m| {
            m.is_static == is_static
                && m.name == name
                && m.sig == sig
                && (m.class == class || (!is_static && m.class == "java/lang/Object"))
        })
    });
    match found {
        Some(index) => (index + 1) as *mut c_void,
        None => {
            st.throw(error, name.into_owned());
            ptr::null_mut()
        }
    }
}

unsafe extern "system" fn get_method_id(
    env: *mut jni::JNIEnv,
    class: jni::jclass,
    name: *const c_char,
    sig: *const c_char,
) -> jni::jmethodID {
    member_id(env, METHODS, class, name, sig, false, "java/lang/NoSuchMethodError")
}

unsafe extern "system" fn get_static_method_id(
    env: *mut jni::JNIEnv,
    class: jni::jclass,
    name: *const c_char,
    sig: *const c_char,
) -> jni::jmethodID {
    member_id(env, METHODS, class, name, sig, true, "java/lang/NoSuchMethodError")
}

unsafe extern "system" fn get_field_id(
    env: *mut jni::JNIEnv,
    class: jni::jclass,
    name: *const c_char,
    sig: *const c_char,
) -> jni::jfieldID {
    member_id(env, FIELDS, class, name, sig, false, "java/lang/NoSuchFieldError")
}

unsafe extern "system" fn get_static_field_id(
    env: *mut jni::JNIEnv,
    class: jni::jclass,
    name: *const c_char,
    sig: *const c_char,
) -> jni::jfieldID {
    member_id(env, FIELDS, class, name, sig, true, "java/lang/NoSuchFieldError")
}

// =========================================================================
// Calls
// =========================================================================

enum Ret {
    Void,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Obj(jni::jobject),
}

unsafe fn invoke(env: *mut jni::JNIEnv, receiver: jni::jobject, method: jni::jmethodID, args: *const jni::jvalue) -> Ret {
    let Some(m) = lookup(METHODS, method) else {
        return Ret::Void;
    };
    let arg = |i: usize| *args.add(i);
    let mut st = state(env);

    match (m.class, m.name, m.sig) {
        ("java/io/PrintStream", "println", _) => {
            let line = st.string(arg(0).l).unwrap_or_else(|| "null".to_string());
            st.stdout.push(line);
            Ret::Void
        }
        ("java/lang/Object", "toString", _) => {
            let text = st.object(receiver).map(Obj::to_java_string).unwrap_or_default();
            Ret::Obj(st.local(Obj::Str(text)))
        }
        ("java/lang/Class", "getName", _) => match st.class_of_handle(receiver) {
            Some(name) => Ret::Obj(st.local(Obj::Str(name.replace('/', ".")))),
            None => Ret::Obj(ptr::null_mut()),
        },
        ("java/lang/String", "length", _) => {
            Ret::Int(st.string(receiver).map_or(0, |text| text.encode_utf16().count() as i32))
        }
        ("java/lang/Math", "abs", "(F)F") => Ret::Float(arg(0).f.abs()),
        ("java/lang/Math", "abs", _) => Ret::Double(arg(0).d.abs()),
        ("java/lang/Math", "max", _) => Ret::Int(arg(0).i.max(arg(1).i)),
        ("java/lang/Math", "addExact", _) => match arg(0).j.checked_add(arg(1).j) {
            Some(sum) => Ret::Long(sum),
            None => {
                st.throw("java/lang/ArithmeticException", "long overflow");
                Ret::Long(0)
            }
        },
        ("java/lang/Integer", "parseInt", _) => {
            let text = st.string(arg(0).l).unwrap_or_else(|| "null".to_string());
            match text.parse::<i32>() {
                Ok(n) => Ret::Int(n),
                Err(_) => {
                    st.throw("java/lang/NumberFormatException", format!("For input string: \"{text}\""));
                    Ret::Int(0)
                }
            }
        }
        ("java/lang/Character", "isDigit", _) => {
            Ret::Bool(char::from_u32(u32::from(arg(0).c)).is_some_and(|c| c.is_ascii_digit()))
        }
        ("demo/Point", "length", _) => match st.object(receiver) {
            Some(Obj::Point { x, y }) => Ret::Double(f64::from(*x).hypot(f64::from(*y))),
            _ => Ret::Double(0.0),
        },
        _ => Ret::Void,
    }
}

unsafe extern "system" fn call_void(env: *mut jni::JNIEnv, obj: jni::jobject, m: jni::jmethodID, args: *const jni::jvalue) {
    invoke(env, obj, m, args);
}

unsafe extern "system" fn call_boolean(
    env: *mut jni::JNIEnv,
    obj: jni::jobject,
    m: jni::jmethodID,
    args: *const jni::jvalue,
) -> jni::jboolean {
    match invoke(env, obj, m, args) {
        Ret::Bool(v) => v as jni::jboolean,
        _ => jni::JNI_FALSE,
    }
}

unsafe extern "system" fn call_int(
    env: *mut jni::JNIEnv,
    obj: jni::jobject,
    m: jni::jmethodID,
    args: *const jni::jvalue,
) -> jni::jint {
    match invoke(env, obj, m, args) {
        Ret::Int(v) => v,
        _ => 0,
    }
}

unsafe extern "system" fn call_long(
    env: *mut jni::JNIEnv,
    obj: jni::jobject,
    m: jni::jmethodID,
    args: *const jni::jvalue,
) -> jni::jlong {
    match invoke(env, obj, m, args) {
        Ret::Long(v) => v,
        _ => 0,
    }
}

unsafe extern "system" fn call_float(
    env: *mut jni::JNIEnv,
    obj: jni::jobject,
    m: jni::jmethodID,
    args: *const jni::jvalue,
) -> jni::jfloat {
    match invoke(env, obj, m, args) {
        Ret::Float(v) => v,
        _ => 0.0,
    }
}

unsafe extern "system" fn call_double(
    env: *mut jni::JNIEnv,
    obj: jni::jobject,
    m: jni::jmethodID,
    args: *const jni::jvalue,
) -> jni::jdouble {
    match invoke(env, obj, m, args) {
        Ret::Double(v) => v,
        _ => 0.0,
    }
}

unsafe extern "system" fn call_object(
    env: *mut jni::JNIEnv,
    obj: jni::jobject,
    m: jni::jmethodID,
    args: *const jni::jvalue,
) -> jni::jobject {
    match invoke(env, obj, m, args) {
        Ret::Obj(v) => v,
        _ => ptr::null_mut(),
    }
}

// =========================================================================
// Fields
// =========================================================================

fn field_key(field: jni::jfieldID) -> Option<(&'static str, &'static str)> {
    lookup(FIELDS, field).map(|m| (m.class, m.name))
}

unsafe extern "system" fn get_object_field(env: *mut jni::JNIEnv, _holder: jni::jobject, field: jni::jfieldID) -> jni::jobject {
    let mut st = state(env);
    match field_key(field) {
        Some(("java/lang/System", "out")) => {
            let out = st.system_out;
            st.new_ref(out, RefKind::Local)
        }
        Some(("demo/Config", "name")) => match st.config_name {
            Some(index) => st.new_ref(index, RefKind::Local),
            None => ptr::null_mut(),
        },
        _ => ptr::null_mut(),
    }
}

unsafe extern "system" fn set_object_field(
    env: *mut jni::JNIEnv,
    _holder: jni::jobject,
    field: jni::jfieldID,
    value: jni::jobject,
) {
    let mut st = state(env);
    if let Some(("demo/Config", "name")) = field_key(field) {
        st.config_name = st.target(value);
    }
}

unsafe extern "system" fn get_int_field(env: *mut jni::JNIEnv, holder: jni::jobject, field: jni::jfieldID) -> jni::jint {
    let st = state(env);
    match (field_key(field), st.object(holder)) {
        (Some(("java/lang/Integer", "MAX_VALUE")), _) => i32::MAX,
        (Some(("demo/Config", "level")), _) => st.config_level,
        (Some(("demo/Point", "x")), Some(Obj::Point { x, .. })) => *x,
        (Some(("demo/Point", "y")), Some(Obj::Point { y, .. })) => *y,
        _ => 0,
    }
}

unsafe extern "system" fn set_int_field(env: *mut jni::JNIEnv, holder: jni::jobject, field: jni::jfieldID, value: jni::jint) {
    let mut st = state(env);
    let key = field_key(field);
    if let Some(("demo/Config", "level")) = key {
        st.config_level = value;
        return;
    }
    let Some(index) = st.target(holder) else {
        return;
    };
    if let Obj::Point { x, y } = &mut st.heap[index] {
        match key {
            Some((_, "x")) => *x = value,
            Some((_, "y")) => *y = value,
            _ => {}
        }
    }
}

unsafe extern "system" fn get_double_field(_env: *mut jni::JNIEnv, _holder: jni::jobject, field: jni::jfieldID) -> jni::jdouble {
    match field_key(field) {
        Some(("java/lang/Math", "PI")) => std::f64::consts::PI,
        _ => 0.0,
    }
}

// =========================================================================
// Strings
// =========================================================================

unsafe extern "system" fn new_string_utf(env: *mut jni::JNIEnv, utf: *const c_char) -> jni::jstring {
    let mut st = state(env);
    if st.fail_allocations {
        st.throw("java/lang/OutOfMemoryError", "Java heap space");
        return ptr::null_mut();
    }
    match cesu8::from_java_cesu8(CStr::from_ptr(utf).to_bytes()) {
        Ok(text) => st.local(Obj::Str(text.into_owned())),
        Err(_) => ptr::null_mut(),
    }
}

unsafe extern "system" fn get_string_utf_chars(
    env: *mut jni::JNIEnv,
    string: jni::jstring,
    is_copy: *mut jni::jboolean,
) -> *const c_char {
    let mut st = state(env);
    let Some(text) = st.string(string) else {
        return ptr::null();
    };
    let mut bytes = cesu8::to_java_cesu8(&text).into_owned();
    bytes.push(0);
    let bytes = bytes.into_boxed_slice();
    let chars = bytes.as_ptr();
    st.utf_buffers.insert(chars as usize, bytes);
    if !is_copy.is_null() {
        *is_copy = jni::JNI_TRUE;
    }
    chars as *const c_char
}

unsafe extern "system" fn release_string_utf_chars(env: *mut jni::JNIEnv, _string: jni::jstring, chars: *const c_char) {
    state(env).utf_buffers.remove(&(chars as usize));
}
