// jni-host/src/sys/jni.rs
//
// Raw JNI (Java Native Interface) types and function tables.
//
// Layout follows jni.h (JDK 8 through 24). Slots the binding calls are typed as
// `Option<unsafe extern "system" fn(..)>`, which has the same ABI as a bare
// function pointer while letting a null slot be detected instead of called.
// Slots the binding never touches are kept as opaque pointers so every typed
// slot stays at its jni.h index. Index comments refer to that numbering.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

use std::ffi::c_void;
use std::os::raw::c_char;

// =============================================================================
// Primitive Types
// =============================================================================

pub type jint = i32;
pub type jlong = i64;
pub type jbyte = i8;
pub type jboolean = u8;
pub type jchar = u16;
pub type jshort = i16;
pub type jfloat = f32;
pub type jdouble = f64;
pub type jsize = jint;

// =============================================================================
// Reference Types (opaque pointers)
// =============================================================================

pub type jobject = *mut c_void;
pub type jclass = jobject;
pub type jstring = jobject;
pub type jthrowable = jobject;

pub type jmethodID = *mut c_void;
pub type jfieldID = *mut c_void;

#[repr(C)]
#[derive(Copy, Clone)]
pub union jvalue {
    pub z: jboolean,
    pub b: jbyte,
    pub c: jchar,
    pub s: jshort,
    pub i: jint,
    pub j: jlong,
    pub f: jfloat,
    pub d: jdouble,
    pub l: jobject,
}

// =============================================================================
// Constants
// =============================================================================

pub const JNI_OK: jint = 0;
pub const JNI_ERR: jint = -1;
pub const JNI_EDETACHED: jint = -2;
pub const JNI_EVERSION: jint = -3;
pub const JNI_ENOMEM: jint = -4;
pub const JNI_EEXIST: jint = -5;
pub const JNI_EINVAL: jint = -6;

pub const JNI_TRUE: jboolean = 1;
pub const JNI_FALSE: jboolean = 0;

pub const JNI_VERSION_1_6: jint = 0x00010006;
pub const JNI_VERSION_1_8: jint = 0x00010008;
pub const JNI_VERSION_9: jint = 0x00090000;
pub const JNI_VERSION_10: jint = 0x000a0000;
pub const JNI_VERSION_21: jint = 0x00150000;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum jobjectRefType {
    JNIInvalidRefType = 0,
    JNILocalRefType = 1,
    JNIGlobalRefType = 2,
    JNIWeakGlobalRefType = 3,
}

/// Opaque vtable slot the binding never calls.
pub type Slot = *const c_void;

// Families of "A" (jvalue array) entry points, shared by every return type.
pub type CallMethodA<R> =
    Option<unsafe extern "system" fn(env: *mut JNIEnv, obj: jobject, methodID: jmethodID, args: *const jvalue) -> R>;
pub type CallNonvirtualMethodA<R> = Option<
    unsafe extern "system" fn(
        env: *mut JNIEnv,
        obj: jobject,
        clazz: jclass,
        methodID: jmethodID,
        args: *const jvalue,
    ) -> R,
>;
pub type GetFieldFn<R> = Option<unsafe extern "system" fn(env: *mut JNIEnv, obj: jobject, fieldID: jfieldID) -> R>;
pub type SetFieldFn<T> = Option<unsafe extern "system" fn(env: *mut JNIEnv, obj: jobject, fieldID: jfieldID, val: T)>;
pub type MemberIdFn<R> =
    Option<unsafe extern "system" fn(env: *mut JNIEnv, clazz: jclass, name: *const c_char, sig: *const c_char) -> R>;

// =============================================================================
// JNINativeInterface_ - the JNIEnv function table
// =============================================================================

#[repr(C)]
pub struct JNINativeInterface_ {
    pub reserved: [Slot; 4], // 0-3

    pub GetVersion: Option<unsafe extern "system" fn(env: *mut JNIEnv) -> jint>, // 4
    pub _DefineClass: Slot,                                                       // 5
    pub FindClass: Option<unsafe extern "system" fn(env: *mut JNIEnv, name: *const c_char) -> jclass>, // 6
    pub _Reflected: [Slot; 3],                                                    // 7-9
    pub GetSuperclass: Option<unsafe extern "system" fn(env: *mut JNIEnv, sub: jclass) -> jclass>, // 10
    pub IsAssignableFrom:
        Option<unsafe extern "system" fn(env: *mut JNIEnv, sub: jclass, sup: jclass) -> jboolean>, // 11
    pub _ToReflectedField: Slot, // 12

    // 13-18: exceptions
    pub Throw: Option<unsafe extern "system" fn(env: *mut JNIEnv, obj: jthrowable) -> jint>,
    pub ThrowNew: Option<unsafe extern "system" fn(env: *mut JNIEnv, clazz: jclass, msg: *const c_char) -> jint>,
    pub ExceptionOccurred: Option<unsafe extern "system" fn(env: *mut JNIEnv) -> jthrowable>,
    pub ExceptionDescribe: Option<unsafe extern "system" fn(env: *mut JNIEnv)>,
    pub ExceptionClear: Option<unsafe extern "system" fn(env: *mut JNIEnv)>,
    pub _FatalError: Slot,

    // 19-26: frames and references
    pub PushLocalFrame: Option<unsafe extern "system" fn(env: *mut JNIEnv, capacity: jint) -> jint>,
    pub PopLocalFrame: Option<unsafe extern "system" fn(env: *mut JNIEnv, result: jobject) -> jobject>,
    pub NewGlobalRef: Option<unsafe extern "system" fn(env: *mut JNIEnv, lobj: jobject) -> jobject>,
    pub DeleteGlobalRef: Option<unsafe extern "system" fn(env: *mut JNIEnv, gref: jobject)>,
    pub DeleteLocalRef: Option<unsafe extern "system" fn(env: *mut JNIEnv, obj: jobject)>,
    pub IsSameObject: Option<unsafe extern "system" fn(env: *mut JNIEnv, obj1: jobject, obj2: jobject) -> jboolean>,
    pub NewLocalRef: Option<unsafe extern "system" fn(env: *mut JNIEnv, ref_: jobject) -> jobject>,
    pub EnsureLocalCapacity: Option<unsafe extern "system" fn(env: *mut JNIEnv, capacity: jint) -> jint>,

    // 27-32: objects
    pub AllocObject: Option<unsafe extern "system" fn(env: *mut JNIEnv, clazz: jclass) -> jobject>,
    pub _NewObject: [Slot; 2],
    pub NewObjectA: CallMethodA<jobject>,
    pub GetObjectClass: Option<unsafe extern "system" fn(env: *mut JNIEnv, obj: jobject) -> jclass>,
    pub IsInstanceOf: Option<unsafe extern "system" fn(env: *mut JNIEnv, obj: jobject, clazz: jclass) -> jboolean>,

    pub GetMethodID: MemberIdFn<jmethodID>, // 33

    // 34-63: Call<Type>Method, Call<Type>MethodV, Call<Type>MethodA
    pub _CallObjectMethod: [Slot; 2],
    pub CallObjectMethodA: CallMethodA<jobject>,
    pub _CallBooleanMethod: [Slot; 2],
    pub CallBooleanMethodA: CallMethodA<jboolean>,
    pub _CallByteMethod: [Slot; 2],
    pub CallByteMethodA: CallMethodA<jbyte>,
    pub _CallCharMethod: [Slot; 2],
    pub CallCharMethodA: CallMethodA<jchar>,
    pub _CallShortMethod: [Slot; 2],
    pub CallShortMethodA: CallMethodA<jshort>,
    pub _CallIntMethod: [Slot; 2],
    pub CallIntMethodA: CallMethodA<jint>,
    pub _CallLongMethod: [Slot; 2],
    pub CallLongMethodA: CallMethodA<jlong>,
    pub _CallFloatMethod: [Slot; 2],
    pub CallFloatMethodA: CallMethodA<jfloat>,
    pub _CallDoubleMethod: [Slot; 2],
    pub CallDoubleMethodA: CallMethodA<jdouble>,
    pub _CallVoidMethod: [Slot; 2],
    pub CallVoidMethodA: CallMethodA<()>,

    // 64-93: CallNonvirtual<Type>Method variants
    pub _CallNonvirtualObjectMethod: [Slot; 2],
    pub CallNonvirtualObjectMethodA: CallNonvirtualMethodA<jobject>,
    pub _CallNonvirtualBooleanMethod: [Slot; 2],
    pub CallNonvirtualBooleanMethodA: CallNonvirtualMethodA<jboolean>,
    pub _CallNonvirtualByteMethod: [Slot; 2],
    pub CallNonvirtualByteMethodA: CallNonvirtualMethodA<jbyte>,
    pub _CallNonvirtualCharMethod: [Slot; 2],
    pub CallNonvirtualCharMethodA: CallNonvirtualMethodA<jchar>,
    pub _CallNonvirtualShortMethod: [Slot; 2],
    pub CallNonvirtualShortMethodA: CallNonvirtualMethodA<jshort>,
    pub _CallNonvirtualIntMethod: [Slot; 2],
    pub CallNonvirtualIntMethodA: CallNonvirtualMethodA<jint>,
    pub _CallNonvirtualLongMethod: [Slot; 2],
    pub CallNonvirtualLongMethodA: CallNonvirtualMethodA<jlong>,
    pub _CallNonvirtualFloatMethod: [Slot; 2],
    pub CallNonvirtualFloatMethodA: CallNonvirtualMethodA<jfloat>,
    pub _CallNonvirtualDoubleMethod: [Slot; 2],
    pub CallNonvirtualDoubleMethodA: CallNonvirtualMethodA<jdouble>,
    pub _CallNonvirtualVoidMethod: [Slot; 2],
    pub CallNonvirtualVoidMethodA: CallNonvirtualMethodA<()>,

    pub GetFieldID: MemberIdFn<jfieldID>, // 94

    // 95-103: Get<Type>Field
    pub GetObjectField: GetFieldFn<jobject>,
    pub GetBooleanField: GetFieldFn<jboolean>,
    pub GetByteField: GetFieldFn<jbyte>,
    pub GetCharField: GetFieldFn<jchar>,
    pub GetShortField: GetFieldFn<jshort>,
    pub GetIntField: GetFieldFn<jint>,
    pub GetLongField: GetFieldFn<jlong>,
    pub GetFloatField: GetFieldFn<jfloat>,
    pub GetDoubleField: GetFieldFn<jdouble>,

    // 104-112: Set<Type>Field
    pub SetObjectField: SetFieldFn<jobject>,
    pub SetBooleanField: SetFieldFn<jboolean>,
    pub SetByteField: SetFieldFn<jbyte>,
    pub SetCharField: SetFieldFn<jchar>,
    pub SetShortField: SetFieldFn<jshort>,
    pub SetIntField: SetFieldFn<jint>,
    pub SetLongField: SetFieldFn<jlong>,
    pub SetFloatField: SetFieldFn<jfloat>,
    pub SetDoubleField: SetFieldFn<jdouble>,

    pub GetStaticMethodID: MemberIdFn<jmethodID>, // 113

    // 114-143: CallStatic<Type>Method variants
    pub _CallStaticObjectMethod: [Slot; 2],
    pub CallStaticObjectMethodA: CallMethodA<jobject>,
    pub _CallStaticBooleanMethod: [Slot; 2],
    pub CallStaticBooleanMethodA: CallMethodA<jboolean>,
    pub _CallStaticByteMethod: [Slot; 2],
    pub CallStaticByteMethodA: CallMethodA<jbyte>,
    pub _CallStaticCharMethod: [Slot; 2],
    pub CallStaticCharMethodA: CallMethodA<jchar>,
    pub _CallStaticShortMethod: [Slot; 2],
    pub CallStaticShortMethodA: CallMethodA<jshort>,
    pub _CallStaticIntMethod: [Slot; 2],
    pub CallStaticIntMethodA: CallMethodA<jint>,
    pub _CallStaticLongMethod: [Slot; 2],
    pub CallStaticLongMethodA: CallMethodA<jlong>,
    pub _CallStaticFloatMethod: [Slot; 2],
    pub CallStaticFloatMethodA: CallMethodA<jfloat>,
    pub _CallStaticDoubleMethod: [Slot; 2],
    pub CallStaticDoubleMethodA: CallMethodA<jdouble>,
    pub _CallStaticVoidMethod: [Slot; 2],
    pub CallStaticVoidMethodA: CallMethodA<()>,

    pub GetStaticFieldID: MemberIdFn<jfieldID>, // 144

    // 145-153: GetStatic<Type>Field
    pub GetStaticObjectField: GetFieldFn<jobject>,
    pub GetStaticBooleanField: GetFieldFn<jboolean>,
    pub GetStaticByteField: GetFieldFn<jbyte>,
    pub GetStaticCharField: GetFieldFn<jchar>,
    pub GetStaticShortField: GetFieldFn<jshort>,
    pub GetStaticIntField: GetFieldFn<jint>,
    pub GetStaticLongField: GetFieldFn<jlong>,
    pub GetStaticFloatField: GetFieldFn<jfloat>,
    pub GetStaticDoubleField: GetFieldFn<jdouble>,

    // 154-162: SetStatic<Type>Field
    pub SetStaticObjectField: SetFieldFn<jobject>,
    pub SetStaticBooleanField: SetFieldFn<jboolean>,
    pub SetStaticByteField: SetFieldFn<jbyte>,
    pub SetStaticCharField: SetFieldFn<jchar>,
    pub SetStaticShortField: SetFieldFn<jshort>,
    pub SetStaticIntField: SetFieldFn<jint>,
    pub SetStaticLongField: SetFieldFn<jlong>,
    pub SetStaticFloatField: SetFieldFn<jfloat>,
    pub SetStaticDoubleField: SetFieldFn<jdouble>,

    // 163-170: strings
    pub _NewString: Slot,
    pub GetStringLength: Option<unsafe extern "system" fn(env: *mut JNIEnv, str: jstring) -> jsize>,
    pub _StringChars: [Slot; 2],
    pub NewStringUTF: Option<unsafe extern "system" fn(env: *mut JNIEnv, utf: *const c_char) -> jstring>,
    pub GetStringUTFLength: Option<unsafe extern "system" fn(env: *mut JNIEnv, str: jstring) -> jsize>,
    pub GetStringUTFChars:
        Option<unsafe extern "system" fn(env: *mut JNIEnv, str: jstring, isCopy: *mut jboolean) -> *const c_char>,
    pub ReleaseStringUTFChars:
        Option<unsafe extern "system" fn(env: *mut JNIEnv, str: jstring, chars: *const c_char)>,

    // 171-214: arrays (GetArrayLength through Set<Type>ArrayRegion)
    pub _Arrays: [Slot; 44],
    // 215-218: natives registration, monitors
    pub _NativesAndMonitors: [Slot; 4],

    pub GetJavaVM: Option<unsafe extern "system" fn(env: *mut JNIEnv, vm: *mut *mut JavaVM) -> jint>, // 219

    // 220-227: string regions, critical sections, weak globals
    pub _RegionsCriticalWeak: [Slot; 8],

    pub ExceptionCheck: Option<unsafe extern "system" fn(env: *mut JNIEnv) -> jboolean>, // 228
    pub _DirectBuffers: [Slot; 3],                                                         // 229-231
    pub GetObjectRefType:
        Option<unsafe extern "system" fn(env: *mut JNIEnv, obj: jobject) -> jobjectRefType>, // 232

    // 233-235: GetModule (9), IsVirtualThread (21), GetStringUTFLengthAsLong (24).
    // Only present on newer JVMs; never read.
    pub _Newer: [Slot; 3],
}

/// C ABI: `JNIEnv` is a pointer to the function table.
pub type JNIEnv = *const JNINativeInterface_;

// =============================================================================
// JNIInvokeInterface_ - the JavaVM function table
// =============================================================================

#[repr(C)]
pub struct JNIInvokeInterface_ {
    pub reserved: [Slot; 3],

    pub DestroyJavaVM: Option<unsafe extern "system" fn(vm: *mut JavaVM) -> jint>,
    pub AttachCurrentThread:
        Option<unsafe extern "system" fn(vm: *mut JavaVM, penv: *mut *mut c_void, args: *mut c_void) -> jint>,
    pub DetachCurrentThread: Option<unsafe extern "system" fn(vm: *mut JavaVM) -> jint>,
    pub GetEnv: Option<unsafe extern "system" fn(vm: *mut JavaVM, penv: *mut *mut c_void, version: jint) -> jint>,
    pub AttachCurrentThreadAsDaemon:
        Option<unsafe extern "system" fn(vm: *mut JavaVM, penv: *mut *mut c_void, args: *mut c_void) -> jint>,
}

/// C ABI: `JavaVM` is a pointer to the invocation table.
pub type JavaVM = *const JNIInvokeInterface_;

// =============================================================================
// JNI_CreateJavaVM arguments
// =============================================================================

#[repr(C)]
pub struct JavaVMOption {
    pub optionString: *mut c_char,
    pub extraInfo: *mut c_void,
}

#[repr(C)]
pub struct JavaVMInitArgs {
    pub version: jint,
    pub nOptions: jint,
    pub options: *mut JavaVMOption,
    pub ignoreUnrecognized: jboolean,
}

#[repr(C)]
pub struct JavaVMAttachArgs {
    pub version: jint,
    pub name: *mut c_char,
    pub group: jobject,
}

/// `jint JNI_CreateJavaVM(JavaVM **pvm, void **penv, void *args)`, exported by libjvm.
pub type JNI_CreateJavaVM =
    unsafe extern "system" fn(pvm: *mut *mut JavaVM, penv: *mut *mut c_void, args: *mut c_void) -> jint;

/// `jint JNI_GetCreatedJavaVMs(JavaVM **vmBuf, jsize bufLen, jsize *nVMs)`, exported by libjvm.
pub type JNI_GetCreatedJavaVMs =
    unsafe extern "system" fn(vmBuf: *mut *mut JavaVM, bufLen: jsize, nVMs: *mut jsize) -> jint;
