//! JNI type descriptors.
//!
//! Field descriptors (`I`, `Ljava/lang/String;`, `[[D`) and method descriptors
//! (`(Ljava/lang/String;)V`, `(F)F`) as defined by the class file format.
//! Everything is validated before it reaches the JVM, since `GetMethodID` and
//! friends only report "not found" for a descriptor they cannot parse.
//!
//! ```
//! use jni_host::signature::{JavaType, MethodSignature, Primitive, ReturnType};
//!
//! let sig: MethodSignature = "(F)F".parse().unwrap();
//! assert_eq!(sig.params, vec![JavaType::Primitive(Primitive::Float)]);
//! assert_eq!(sig.ret, ReturnType::Type(JavaType::Primitive(Primitive::Float)));
//! assert_eq!(sig.to_string(), "(F)F");
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Maximum number of array dimensions a descriptor may carry.
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

/// The eight primitive Java types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl Primitive {
    /// The single-letter descriptor code.
    pub fn code(self) -> char {
        match self {
            Primitive::Boolean => 'Z',
            Primitive::Byte => 'B',
            Primitive::Char => 'C',
            Primitive::Short => 'S',
            Primitive::Int => 'I',
            Primitive::Long => 'J',
            Primitive::Float => 'F',
            Primitive::Double => 'D',
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            b'Z' => Primitive::Boolean,
            b'B' => Primitive::Byte,
            b'C' => Primitive::Char,
            b'S' => Primitive::Short,
            b'I' => Primitive::Int,
            b'J' => Primitive::Long,
            b'F' => Primitive::Float,
            b'D' => Primitive::Double,
            _ => return None,
        })
    }

    /// The Java source keyword (`int`, `boolean`, ...).
    pub fn java_name(self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Byte => "byte",
            Primitive::Char => "char",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
        }
    }

    fn from_java_name(name: &str) -> Option<Self> {
        Some(match name {
            "boolean" => Primitive::Boolean,
            "byte" => Primitive::Byte,
            "char" => Primitive::Char,
            "short" => Primitive::Short,
            "int" => Primitive::Int,
            "long" => Primitive::Long,
            "float" => Primitive::Float,
            "double" => Primitive::Double,
            _ => return None,
        })
    }
}

/// A field type: what may appear as a field descriptor or a method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JavaType {
    Primitive(Primitive),
    /// Binary class name with `/` separators, e.g. `java/lang/String`.
    Object(String),
    Array(Box<JavaType>),
}

impl JavaType {
    /// Parses a complete field descriptor.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let mut cursor = Cursor::new(descriptor);
        let ty = cursor.field_type().map_err(|reason| malformed(descriptor, reason))?;
        cursor.finish().map_err(|reason| malformed(descriptor, reason))?;
        Ok(ty)
    }

    /// Builds a type from its Java source spelling: `int`, `java.lang.String`,
    /// `byte[][]`, or an already slash-separated `java/util/List`.
    pub fn from_java_name(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        let mut base = trimmed;
        let mut dimensions = 0;
        while let Some(rest) = base.strip_suffix("[]") {
            base = rest.trim_end();
            dimensions += 1;
        }
        if dimensions > MAX_ARRAY_DIMENSIONS {
            return Err(malformed(name, "too many array dimensions"));
        }

        let mut ty = match Primitive::from_java_name(base) {
            Some(p) => JavaType::Primitive(p),
            None if base == "void" => return Err(malformed(name, "void is not a value type")),
            None => {
                let binary = base.replace('.', "/");
                check_binary_name(&binary).map_err(|reason| malformed(name, reason))?;
                JavaType::Object(binary)
            }
        };
        for _ in 0..dimensions {
            ty = JavaType::Array(Box::new(ty));
        }
        Ok(ty)
    }

    /// Convenience for `L<name>;`.
    pub fn object(binary_name: impl Into<String>) -> Self {
        JavaType::Object(binary_name.into())
    }

    /// Whether values of this type are passed as object references.
    pub fn is_reference(&self) -> bool {
        !matches!(self, JavaType::Primitive(_))
    }

    /// Number of leading `[`.
    pub fn array_dimensions(&self) -> usize {
        match self {
            JavaType::Array(inner) => 1 + inner.array_dimensions(),
            _ => 0,
        }
    }

    /// Java source spelling, e.g. `java.lang.String[]`.
    pub fn java_name(&self) -> String {
        match self {
            JavaType::Primitive(p) => p.java_name().to_string(),
            JavaType::Object(name) => name.replace('/', "."),
            JavaType::Array(inner) => format!("{}[]", inner.java_name()),
        }
    }
}

impl fmt::Display for JavaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JavaType::Primitive(p) => write!(f, "{}", p.code()),
            JavaType::Object(name) => write!(f, "L{name};"),
            JavaType::Array(inner) => write!(f, "[{inner}"),
        }
    }
}

impl FromStr for JavaType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        JavaType::parse(s)
    }
}

/// A method return type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReturnType {
    Void,
    Type(JavaType),
}

impl ReturnType {
    pub fn parse(descriptor: &str) -> Result<Self> {
        let mut cursor = Cursor::new(descriptor);
        let ty = cursor.return_type().map_err(|reason| malformed(descriptor, reason))?;
        cursor.finish().map_err(|reason| malformed(descriptor, reason))?;
        Ok(ty)
    }

    /// Like [`JavaType::from_java_name`], additionally accepting `void`.
    pub fn from_java_name(name: &str) -> Result<Self> {
        if name.trim() == "void" {
            Ok(ReturnType::Void)
        } else {
            JavaType::from_java_name(name).map(ReturnType::Type)
        }
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnType::Void => f.write_str("V"),
            ReturnType::Type(ty) => ty.fmt(f),
        }
    }
}

impl From<JavaType> for ReturnType {
    fn from(ty: JavaType) -> Self {
        ReturnType::Type(ty)
    }
}

/// A method descriptor: parameter types in order, then the return type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub params: Vec<JavaType>,
    pub ret: ReturnType,
}

impl MethodSignature {
    pub fn new(params: impl IntoIterator<Item = JavaType>, ret: impl Into<ReturnType>) -> Self {
        MethodSignature { params: params.into_iter().collect(), ret: ret.into() }
    }

    pub fn parse(descriptor: &str) -> Result<Self> {
        let mut cursor = Cursor::new(descriptor);
        let sig = cursor.method().map_err(|reason| malformed(descriptor, reason))?;
        cursor.finish().map_err(|reason| malformed(descriptor, reason))?;
        Ok(sig)
    }

    /// Builds a descriptor from Java source spellings:
    /// `MethodSignature::from_java_names(&["java.lang.String"], "void")`.
    pub fn from_java_names<S: AsRef<str>>(params: &[S], ret: &str) -> Result<Self> {
        let params = params
            .iter()
            .map(|p| JavaType::from_java_name(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(MethodSignature { params, ret: ReturnType::from_java_name(ret)? })
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            write!(f, "{param}")?;
        }
        write!(f, "){}", self.ret)
    }
}

impl FromStr for MethodSignature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MethodSignature::parse(s)
    }
}

/// Normalises a class name for `FindClass`.
///
/// Accepts `java/lang/System`, the descriptor form `Ljava/lang/System;`, and
/// array descriptors such as `[Ljava/lang/String;` (which `FindClass` takes
/// verbatim). Dotted names are rejected.
pub fn class_lookup_name(name: &str) -> Result<String> {
    if name.starts_with('[') {
        JavaType::parse(name)?;
        return Ok(name.to_string());
    }
    if name.starts_with('L') && name.ends_with(';') {
        return match JavaType::parse(name)? {
            JavaType::Object(binary) => Ok(binary),
            _ => Err(malformed(name, "expected an object type")),
        };
    }
    if name.contains('.') {
        return Err(malformed(name, "class names use '/' as the package separator"));
    }
    check_binary_name(name).map_err(|reason| malformed(name, reason))?;
    Ok(name.to_string())
}

fn malformed(signature: &str, reason: &str) -> Error {
    Error::MalformedSignature { signature: signature.to_string(), reason: reason.to_string() }
}

fn check_binary_name(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty class name");
    }
    for segment in name.split('/') {
        if segment.is_empty() {
            return Err("empty class name segment");
        }
        if segment.contains(['.', ';', '[']) {
            return Err("illegal character in class name");
        }
    }
    Ok(())
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn finish(&self) -> std::result::Result<(), &'static str> {
        if self.pos == self.text.len() {
            Ok(())
        } else {
            Err("trailing characters after descriptor")
        }
    }

    fn method(&mut self) -> std::result::Result<MethodSignature, &'static str> {
        if self.bump() != Some(b'(') {
            return Err("method descriptor must start with '('");
        }
        let mut params = Vec::new();
        loop {
            match self.peek() {
                Some(b')') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => params.push(self.field_type()?),
                None => return Err("unterminated parameter list"),
            }
        }
        let ret = self.return_type()?;
        Ok(MethodSignature { params, ret })
    }

    fn return_type(&mut self) -> std::result::Result<ReturnType, &'static str> {
        if self.peek() == Some(b'V') {
            self.pos += 1;
            return Ok(ReturnType::Void);
        }
        self.field_type().map(ReturnType::Type)
    }

    fn field_type(&mut self) -> std::result::Result<JavaType, &'static str> {
        let mut dimensions = 0;
        while self.peek() == Some(b'[') {
            self.pos += 1;
            dimensions += 1;
        }
        if dimensions > MAX_ARRAY_DIMENSIONS {
            return Err("too many array dimensions");
        }

        let mut ty = match self.bump() {
            None => return Err("unexpected end of descriptor"),
            Some(b'L') => {
                let rest = &self.text[self.pos..];
                let end = rest.find(';').ok_or("unterminated class name (missing ';')")?;
                let name = &rest[..end];
                check_binary_name(name)?;
                self.pos += end + 1;
                JavaType::Object(name.to_string())
            }
            Some(b'V') => return Err("'V' is only valid as a return type"),
            Some(code) => JavaType::Primitive(Primitive::from_code(code).ok_or("unknown type code")?),
        };
        for _ in 0..dimensions {
            ty = JavaType::Array(Box::new(ty));
        }
        Ok(ty)
    }
}
