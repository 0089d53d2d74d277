//! Values crossing the JNI boundary.
//!
//! [`JValue`] is the strict argument form: one variant per JNI type, checked
//! position by position against the declared descriptor with no widening.
//! [`HostValue`] is the loose form a scripting host hands over (nil, booleans,
//! 64-bit integers, doubles, strings, objects); [`crate::Env::invoke_host`]
//! narrows it explicitly to whatever the descriptor declares.
//! [`Value`] is what comes back.

use std::fmt;

use crate::error::{Error, Result};
use crate::refs::{ClassRef, LocalRef, ObjectRef};
use crate::signature::{JavaType, Primitive, ReturnType};
use crate::sys::jni;

/// The closed set of JNI return shapes. Each `Call<Type>Method` family maps to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnKind {
    Void,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Object,
}

impl ReturnKind {
    pub fn of(ret: &ReturnType) -> Self {
        match ret {
            ReturnType::Void => ReturnKind::Void,
            ReturnType::Type(ty) => ReturnKind::of_type(ty),
        }
    }

    pub fn of_type(ty: &JavaType) -> Self {
        match ty {
            JavaType::Primitive(Primitive::Boolean) => ReturnKind::Boolean,
            JavaType::Primitive(Primitive::Byte) => ReturnKind::Byte,
            JavaType::Primitive(Primitive::Char) => ReturnKind::Char,
            JavaType::Primitive(Primitive::Short) => ReturnKind::Short,
            JavaType::Primitive(Primitive::Int) => ReturnKind::Int,
            JavaType::Primitive(Primitive::Long) => ReturnKind::Long,
            JavaType::Primitive(Primitive::Float) => ReturnKind::Float,
            JavaType::Primitive(Primitive::Double) => ReturnKind::Double,
            JavaType::Object(_) | JavaType::Array(_) => ReturnKind::Object,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ReturnKind::Void => "void",
            ReturnKind::Boolean => "boolean",
            ReturnKind::Byte => "byte",
            ReturnKind::Char => "char",
            ReturnKind::Short => "short",
            ReturnKind::Int => "int",
            ReturnKind::Long => "long",
            ReturnKind::Float => "float",
            ReturnKind::Double => "double",
            ReturnKind::Object => "object",
        }
    }
}

impl fmt::Display for ReturnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A strictly typed argument or field value.
#[derive(Clone, Copy)]
pub enum JValue<'a> {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Object(&'a LocalRef<'a>),
    Null,
}

impl<'a> JValue<'a> {
    pub fn type_name(&self) -> &'static str {
        match self {
            JValue::Boolean(_) => "boolean",
            JValue::Byte(_) => "byte",
            JValue::Char(_) => "char",
            JValue::Short(_) => "short",
            JValue::Int(_) => "int",
            JValue::Long(_) => "long",
            JValue::Float(_) => "float",
            JValue::Double(_) => "double",
            JValue::Object(_) => "object",
            JValue::Null => "null",
        }
    }

    /// Converts to the raw union, requiring an exact match with `expected`.
    pub(crate) fn to_raw(&self, expected: &JavaType, env: *mut jni::JNIEnv, operation: &dyn fmt::Display) -> Result<jni::jvalue> {
        let raw = match (expected, self) {
            (JavaType::Primitive(Primitive::Boolean), JValue::Boolean(v)) => {
                jni::jvalue { z: if *v { jni::JNI_TRUE } else { jni::JNI_FALSE } }
            }
            (JavaType::Primitive(Primitive::Byte), JValue::Byte(v)) => jni::jvalue { b: *v },
            (JavaType::Primitive(Primitive::Char), JValue::Char(v)) => jni::jvalue { c: *v },
            (JavaType::Primitive(Primitive::Short), JValue::Short(v)) => jni::jvalue { s: *v },
            (JavaType::Primitive(Primitive::Int), JValue::Int(v)) => jni::jvalue { i: *v },
            (JavaType::Primitive(Primitive::Long), JValue::Long(v)) => jni::jvalue { j: *v },
            (JavaType::Primitive(Primitive::Float), JValue::Float(v)) => jni::jvalue { f: *v },
            (JavaType::Primitive(Primitive::Double), JValue::Double(v)) => jni::jvalue { d: *v },
            (ty, JValue::Object(obj)) if ty.is_reference() => jni::jvalue { l: obj.owned_by(env)? },
            (ty, JValue::Null) if ty.is_reference() => jni::jvalue { l: std::ptr::null_mut() },
            (ty, value) => return Err(Error::mismatch(operation, ty.java_name(), value.type_name())),
        };
        Ok(raw)
    }
}

impl fmt::Debug for JValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JValue::Boolean(v) => write!(f, "Boolean({v})"),
            JValue::Byte(v) => write!(f, "Byte({v})"),
            JValue::Char(v) => write!(f, "Char({v})"),
            JValue::Short(v) => write!(f, "Short({v})"),
            JValue::Int(v) => write!(f, "Int({v})"),
            JValue::Long(v) => write!(f, "Long({v})"),
            JValue::Float(v) => write!(f, "Float({v})"),
            JValue::Double(v) => write!(f, "Double({v})"),
            JValue::Object(obj) => write!(f, "Object({:p})", obj.as_raw()),
            JValue::Null => f.write_str("Null"),
        }
    }
}

macro_rules! jvalue_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for JValue<'_> {
                fn from(v: $ty) -> Self {
                    JValue::$variant(v)
                }
            }
        )*
    };
}

jvalue_from! {
    bool => Boolean,
    i8 => Byte,
    u16 => Char,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
}

impl<'a> From<&'a LocalRef<'a>> for JValue<'a> {
    fn from(obj: &'a LocalRef<'a>) -> Self {
        JValue::Object(obj)
    }
}

impl<'a> From<&'a ObjectRef<'a>> for JValue<'a> {
    fn from(obj: &'a ObjectRef<'a>) -> Self {
        JValue::Object(obj)
    }
}

impl<'a> From<&'a ClassRef<'a>> for JValue<'a> {
    fn from(class: &'a ClassRef<'a>) -> Self {
        JValue::Object(class)
    }
}

impl<'a> From<Option<&'a ObjectRef<'a>>> for JValue<'a> {
    fn from(obj: Option<&'a ObjectRef<'a>>) -> Self {
        match obj {
            Some(obj) => JValue::Object(obj),
            None => JValue::Null,
        }
    }
}

/// A dynamically typed value as a scripting host sees it.
#[derive(Clone, Copy)]
pub enum HostValue<'a> {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'a str),
    Object(&'a LocalRef<'a>),
}

impl HostValue<'_> {
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Nil => "nil",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "integer",
            HostValue::Float(_) => "float",
            HostValue::Str(_) => "string",
            HostValue::Object(_) => "object",
        }
    }
}

impl From<f64> for HostValue<'_> {
    fn from(v: f64) -> Self {
        HostValue::Float(v)
    }
}

impl From<i64> for HostValue<'_> {
    fn from(v: i64) -> Self {
        HostValue::Int(v)
    }
}

impl From<bool> for HostValue<'_> {
    fn from(v: bool) -> Self {
        HostValue::Bool(v)
    }
}

impl<'a> From<&'a str> for HostValue<'a> {
    fn from(v: &'a str) -> Self {
        HostValue::Str(v)
    }
}

impl<'a> From<&'a ObjectRef<'a>> for HostValue<'a> {
    fn from(obj: &'a ObjectRef<'a>) -> Self {
        HostValue::Object(obj)
    }
}

/// Largest integer magnitude a float (24-bit mantissa) holds exactly.
const F32_EXACT: u64 = 1 << 24;
/// Largest integer magnitude a double (53-bit mantissa) holds exactly.
const F64_EXACT: u64 = 1 << 53;

/// Host-side narrowing to a declared primitive. Reference types are handled by
/// the caller since strings need an environment to be created.
pub(crate) fn narrow_primitive(
    expected: Primitive,
    value: &HostValue<'_>,
    operation: &dyn fmt::Display,
) -> Result<jni::jvalue> {
    let mismatch = || Error::mismatch(operation, expected.java_name(), value.type_name());
    let out_of_range = |v: &dyn fmt::Display| {
        Error::mismatch(operation, expected.java_name(), format!("{} {v} (out of range)", value.type_name()))
    };

    let raw = match (expected, *value) {
        (Primitive::Boolean, HostValue::Bool(v)) => jni::jvalue { z: v as jni::jboolean },
        (Primitive::Byte, HostValue::Int(v)) => jni::jvalue { b: i8::try_from(v).map_err(|_| out_of_range(&v))? },
        (Primitive::Short, HostValue::Int(v)) => jni::jvalue { s: i16::try_from(v).map_err(|_| out_of_range(&v))? },
        (Primitive::Int, HostValue::Int(v)) => jni::jvalue { i: i32::try_from(v).map_err(|_| out_of_range(&v))? },
        (Primitive::Long, HostValue::Int(v)) => jni::jvalue { j: v },
        (Primitive::Char, HostValue::Int(v)) => jni::jvalue { c: u16::try_from(v).map_err(|_| out_of_range(&v))? },
        (Primitive::Char, HostValue::Str(s)) => {
            let mut units = s.encode_utf16();
            match (units.next(), units.next()) {
                (Some(unit), None) => jni::jvalue { c: unit },
                _ => return Err(out_of_range(&format!("{s:?}"))),
            }
        }
        (Primitive::Float, HostValue::Float(v)) => {
            if v.is_finite() && v.abs() > f32::MAX as f64 {
                return Err(out_of_range(&v));
            }
            jni::jvalue { f: v as f32 }
        }
        (Primitive::Float, HostValue::Int(v)) => {
            if v.unsigned_abs() > F32_EXACT {
                return Err(out_of_range(&v));
            }
            jni::jvalue { f: v as f32 }
        }
        (Primitive::Double, HostValue::Float(v)) => jni::jvalue { d: v },
        (Primitive::Double, HostValue::Int(v)) => {
            if v.unsigned_abs() > F64_EXACT {
                return Err(out_of_range(&v));
            }
            jni::jvalue { d: v as f64 }
        }
        _ => return Err(mismatch()),
    };
    Ok(raw)
}

/// A value returned from a call or read from a field.
#[derive(Debug)]
pub enum Value<'env> {
    Void,
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// `None` for a Java `null`.
    Object(Option<ObjectRef<'env>>),
}

impl<'env> Value<'env> {
    pub fn kind(&self) -> ReturnKind {
        match self {
            Value::Void => ReturnKind::Void,
            Value::Boolean(_) => ReturnKind::Boolean,
            Value::Byte(_) => ReturnKind::Byte,
            Value::Char(_) => ReturnKind::Char,
            Value::Short(_) => ReturnKind::Short,
            Value::Int(_) => ReturnKind::Int,
            Value::Long(_) => ReturnKind::Long,
            Value::Float(_) => ReturnKind::Float,
            Value::Double(_) => ReturnKind::Double,
            Value::Object(_) => ReturnKind::Object,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    pub fn into_object(self) -> Result<Option<ObjectRef<'env>>> {
        match self {
            Value::Object(obj) => Ok(obj),
            other => Err(Error::mismatch("Value::into_object", ReturnKind::Object, other.kind())),
        }
    }
}

macro_rules! value_try_into {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl TryFrom<Value<'_>> for $ty {
                type Error = Error;

                fn try_from(value: Value<'_>) -> Result<Self> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(Error::mismatch(
                            concat!("Value -> ", stringify!($ty)),
                            ReturnKind::$variant,
                            other.kind(),
                        )),
                    }
                }
            }
        )*
    };
}

value_try_into! {
    bool => Boolean,
    i8 => Byte,
    u16 => Char,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
}

impl TryFrom<Value<'_>> for () {
    type Error = Error;

    fn try_from(value: Value<'_>) -> Result<Self> {
        match value {
            Value::Void => Ok(()),
            other => Err(Error::mismatch("Value -> ()", ReturnKind::Void, other.kind())),
        }
    }
}
