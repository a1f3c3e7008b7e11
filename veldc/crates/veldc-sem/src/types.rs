//! The semantic type representation shared by HIR, THIR, and MIR.

use veldc_util::Symbol;

/// Width of an integer type in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
    W128,
}

impl IntWidth {
    /// Width in bits.
    pub fn bits(self) -> u32 {
        match self {
            IntWidth::W8 => 8,
            IntWidth::W16 => 16,
            IntWidth::W32 => 32,
            IntWidth::W64 => 64,
            IntWidth::W128 => 128,
        }
    }
}

/// Width of a float type in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FloatWidth {
    W32,
    W64,
}

impl FloatWidth {
    /// Width in bits.
    pub fn bits(self) -> u32 {
        match self {
            FloatWidth::W32 => 32,
            FloatWidth::W64 => 64,
        }
    }
}

/// A type in the type system.
///
/// Produced by the external type checker; the middle-end never mutates
/// types, only clones and compares them. Equality is structural except for
/// named types, which compare by name and argument list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Error type (for recovery)
    Error,
    /// Unit type ()
    Unit,
    /// Never type - diverges
    Never,
    /// Boolean type
    Bool,
    /// Character type
    Char,
    /// String type
    Str,
    /// Signed integer type
    Int(IntWidth),
    /// Unsigned integer type
    Uint(IntWidth),
    /// Float type
    Float(FloatWidth),
    /// Named type (struct, enum, or class) with resolved type arguments
    Named { name: Symbol, args: Vec<Type> },
    /// Unsubstituted generic parameter; must not survive HIR lowering
    Param(Symbol),
    /// Tuple type
    Tuple(Vec<Type>),
    /// Fixed-size array type [T; N]
    Array(Box<Type>, u64),
    /// Slice type [T]
    Slice(Box<Type>),
    /// Function or closure signature
    Fn(Vec<Type>, Box<Type>),
    /// Raw pointer type
    Ptr(Box<Type>),
    /// Reference type with mutability flag
    Ref(Box<Type>, bool),
}

impl Type {
    /// Shorthand for the default integer type.
    pub const I32: Type = Type::Int(IntWidth::W32);
    /// Shorthand for the 64-bit integer type.
    pub const I64: Type = Type::Int(IntWidth::W64);
    /// Shorthand for the default float type.
    pub const F64: Type = Type::Float(FloatWidth::W64);

    /// Create a named type without type arguments.
    pub fn named(name: Symbol) -> Type {
        Type::Named {
            name,
            args: Vec::new(),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int(_) | Type::Uint(_))
    }

    pub fn is_signed_int(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    pub fn is_unsigned_int(&self) -> bool {
        matches!(self, Type::Uint(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float(_))
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Type::Never)
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Type::Unit)
    }

    /// Returns true for pointer-shaped types (pointers and references).
    pub fn is_pointer_like(&self) -> bool {
        matches!(self, Type::Ptr(_) | Type::Ref(_, _))
    }

    /// Bit width of a numeric type, if it has one.
    pub fn bit_width(&self) -> Option<u32> {
        match self {
            Type::Int(w) | Type::Uint(w) => Some(w.bits()),
            Type::Float(w) => Some(w.bits()),
            Type::Bool => Some(1),
            Type::Char => Some(32),
            _ => None,
        }
    }

    /// Returns true for scalar primitives that never need destruction.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Type::Unit
                | Type::Never
                | Type::Bool
                | Type::Char
                | Type::Int(_)
                | Type::Uint(_)
                | Type::Float(_)
        )
    }

    /// The name of a named type, if this is one.
    pub fn named_name(&self) -> Option<Symbol> {
        match self {
            Type::Named { name, .. } => Some(*name),
            _ => None,
        }
    }

    /// Returns true if the type still mentions a generic parameter.
    pub fn mentions_param(&self) -> bool {
        match self {
            Type::Param(_) => true,
            Type::Named { args, .. } => args.iter().any(Type::mentions_param),
            Type::Tuple(tys) => tys.iter().any(Type::mentions_param),
            Type::Array(ty, _) | Type::Slice(ty) | Type::Ptr(ty) | Type::Ref(ty, _) => {
                ty.mentions_param()
            }
            Type::Fn(params, ret) => {
                params.iter().any(Type::mentions_param) || ret.mentions_param()
            }
            _ => false,
        }
    }

    /// Substitute generic parameters by name.
    pub fn substitute(&self, subst: &veldc_util::FxHashMap<Symbol, Type>) -> Type {
        match self {
            Type::Param(name) => subst.get(name).cloned().unwrap_or_else(|| self.clone()),
            Type::Named { name, args } => Type::Named {
                name: *name,
                args: args.iter().map(|a| a.substitute(subst)).collect(),
            },
            Type::Tuple(tys) => Type::Tuple(tys.iter().map(|t| t.substitute(subst)).collect()),
            Type::Array(ty, n) => Type::Array(Box::new(ty.substitute(subst)), *n),
            Type::Slice(ty) => Type::Slice(Box::new(ty.substitute(subst))),
            Type::Ptr(ty) => Type::Ptr(Box::new(ty.substitute(subst))),
            Type::Ref(ty, m) => Type::Ref(Box::new(ty.substitute(subst)), *m),
            Type::Fn(params, ret) => Type::Fn(
                params.iter().map(|p| p.substitute(subst)).collect(),
                Box::new(ret.substitute(subst)),
            ),
            _ => self.clone(),
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Error => write!(f, "{{error}}"),
            Type::Unit => write!(f, "Unit"),
            Type::Never => write!(f, "Never"),
            Type::Bool => write!(f, "Bool"),
            Type::Char => write!(f, "Char"),
            Type::Str => write!(f, "Str"),
            Type::Int(w) => write!(f, "I{}", w.bits()),
            Type::Uint(w) => write!(f, "U{}", w.bits()),
            Type::Float(w) => write!(f, "F{}", w.bits()),
            Type::Named { name, args } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "[")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    write!(f, "]")?;
                }
                Ok(())
            }
            Type::Param(name) => write!(f, "{name}"),
            Type::Tuple(tys) => {
                write!(f, "(")?;
                for (i, ty) in tys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{ty}")?;
                }
                write!(f, ")")
            }
            Type::Array(ty, n) => write!(f, "[{ty}; {n}]"),
            Type::Slice(ty) => write!(f, "[{ty}]"),
            Type::Fn(params, ret) => {
                write!(f, "func(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") -> {ret}")
            }
            Type::Ptr(ty) => write!(f, "*{ty}"),
            Type::Ref(ty, true) => write!(f, "&mut {ty}"),
            Type::Ref(ty, false) => write!(f, "&{ty}"),
        }
    }
}
