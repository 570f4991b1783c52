use std::fmt;
use strum::AsRefStr;

/// The type language. Structural equality is the derived one: tags plus
/// per-variant fields, pointers and functions comparing their components
/// recursively.
#[derive(Debug, PartialEq, AsRefStr)]
pub enum Type<'a, 'src> {
  Void,
  // the atoms
  Byte,
  I8,
  I16,
  I32,
  I64,
  U8,
  U16,
  U32,
  U64,
  F16,
  F32,
  F64,
  CodePoint,
  Pointer(&'a Type<'a, 'src>),
  Slice(&'a Type<'a, 'src>),
  Array {
    element: &'a Type<'a, 'src>,
    len: u64,
  },
  Tuple(&'a [&'a Type<'a, 'src>]),
  Struct {
    // empty for the anonymous struct type expression
    name: &'src [u8],
    field_names: &'a [&'src [u8]],
    field_types: &'a [&'a Type<'a, 'src>],
  },
  Enum,
  Union,
  Function {
    parameter_types: &'a [&'a Type<'a, 'src>],
    return_type: &'a Type<'a, 'src>,
  },
  // a parse-time forward reference to a nominal type, eliminated by the
  // reference linker
  Unknown {
    name: &'src [u8],
  },
  // an omitted declaration type, filled in from the initializer
  Infer,
}

// the names the parser's builtin type table accepts
pub fn atom_from_name<'a, 'src>(name: &[u8]) -> Option<Type<'a, 'src>> {
  match name {
    b"i8" => Some(Type::I8),
    b"i16" => Some(Type::I16),
    b"i32" => Some(Type::I32),
    b"i64" => Some(Type::I64),
    b"u8" => Some(Type::U8),
    b"u16" => Some(Type::U16),
    b"u32" => Some(Type::U32),
    b"u64" => Some(Type::U64),
    b"f16" => Some(Type::F16),
    b"f32" => Some(Type::F32),
    b"f64" => Some(Type::F64),
    _ => None,
  }
}

impl fmt::Display for Type<'_, '_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Type::Void => write!(f, "void"),
      Type::Byte => write!(f, "byte"),
      Type::I8 => write!(f, "i8"),
      Type::I16 => write!(f, "i16"),
      Type::I32 => write!(f, "i32"),
      Type::I64 => write!(f, "i64"),
      Type::U8 => write!(f, "u8"),
      Type::U16 => write!(f, "u16"),
      Type::U32 => write!(f, "u32"),
      Type::U64 => write!(f, "u64"),
      Type::F16 => write!(f, "f16"),
      Type::F32 => write!(f, "f32"),
      Type::F64 => write!(f, "f64"),
      Type::CodePoint => write!(f, "codepoint"),
      Type::Pointer(t) => write!(f, "@{}", t),
      Type::Slice(t) => write!(f, "[]{}", t),
      Type::Array { element, len } => write!(f, "[{}]{}", len, element),
      Type::Tuple(ts) => {
        write!(f, "(")?;
        for (i, t) in ts.iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{}", t)?;
        }
        write!(f, ")")
      }
      Type::Struct {
        name,
        field_names,
        field_types,
      } => {
        if !name.is_empty() {
          return write!(f, "{}", String::from_utf8_lossy(name));
        }
        write!(f, "struct {{ ")?;
        for (i, (n, t)) in field_names.iter().zip(field_types.iter()).enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{}: {}", String::from_utf8_lossy(n), t)?;
        }
        write!(f, " }}")
      }
      Type::Enum => write!(f, "enum"),
      Type::Union => write!(f, "union"),
      Type::Function {
        parameter_types,
        return_type,
      } => {
        write!(f, "fn [")?;
        for (i, t) in parameter_types.iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{}", t)?;
        }
        write!(f, "] -> {}", return_type)
      }
      Type::Unknown { name } => write!(f, "{}", String::from_utf8_lossy(name)),
      Type::Infer => write!(f, "_"),
    }
  }
}
