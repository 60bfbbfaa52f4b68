use std::fmt;

/// Type tag for exported method signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Return type only.
    Void,
    Bool,
    Int,
    Float,
    String,
    ByteArray,
    IntArray,
    FloatArray,
    StringArray,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Void => "void",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::ByteArray => "byte[]",
            ValueType::IntArray => "int[]",
            ValueType::FloatArray => "float[]",
            ValueType::StringArray => "string[]",
        }
    }

    /// Ints widen to floats; everything else must match exactly.
    pub fn accepts(self, value: &Variant) -> bool {
        match (self, value) {
            (ValueType::Float, Variant::Int(_)) => true,
            _ => value.value_type() == self,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value crossing the legacy method boundary.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    ByteArray(Vec<u8>),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
    StringArray(Vec<String>),
}

impl Variant {
    pub fn value_type(&self) -> ValueType {
        match self {
            Variant::Nil => ValueType::Void,
            Variant::Bool(_) => ValueType::Bool,
            Variant::Int(_) => ValueType::Int,
            Variant::Float(_) => ValueType::Float,
            Variant::String(_) => ValueType::String,
            Variant::ByteArray(_) => ValueType::ByteArray,
            Variant::IntArray(_) => ValueType::IntArray,
            Variant::FloatArray(_) => ValueType::FloatArray,
            Variant::StringArray(_) => ValueType::StringArray,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Variant::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Variant::Float(v) => Some(*v),
            Variant::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Variant::Int(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Float(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_owned())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::String(v)
    }
}

/// Static declaration of one exported method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDecl {
    pub name: &'static str,
    pub return_type: ValueType,
    pub params: &'static [ValueType],
}

impl MethodDecl {
    pub const fn new(
        name: &'static str,
        return_type: ValueType,
        params: &'static [ValueType],
    ) -> Self {
        Self {
            name,
            return_type,
            params,
        }
    }

    /// Native-style signature, e.g. `int add(int, int)`.
    pub fn signature(&self) -> String {
        let params: Vec<&str> = self.params.iter().map(|p| p.as_str()).collect();
        format!("{} {}({})", self.return_type, self.name, params.join(", "))
    }
}
