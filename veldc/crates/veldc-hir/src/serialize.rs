//! HIR binary serialization for the build cache.
//!
//! The format is a 16-byte little-endian header followed by the module body:
//!
//! ```text
//! Header:
//!   [0..4)   magic: u32 = 0x52494854 ("THIR")
//!   [4..6)   version_major: u16
//!   [6..8)   version_minor: u16
//!   [8..16)  content_hash: u64 (FNV-1a of the body)
//!
//! Body:
//!   - name: length-prefixed string
//!   - source_path: length-prefixed string
//!   - structs, enums, behaviors, impls, functions, constants:
//!     each `u32 count` + elements, in that order
//!   - imports: u32 count + strings
//! ```
//!
//! Strings are `u32 length + bytes`. Booleans are one byte. Optionals are a
//! one-byte present flag followed by the value. Expression and pattern nodes
//! are a one-byte variant tag, then the `u64` id, then the fields, then the
//! type, then the span.
//!
//! Variant tag values must remain stable across versions; new variants
//! append at the end.

use thiserror::Error;
use veldc_sem::ast::{BinOp, Lit, UnOp};
use veldc_sem::{FloatWidth, IntWidth, Type};
use veldc_util::{FileId, Span, Symbol};

use crate::decl::{
    HirBehavior, HirConst, HirEnum, HirFnSig, HirFunction, HirImpl, HirParam, HirStruct,
};
use crate::expr::{
    BindingKind, CaptureMode, HirArm, HirBlock, HirCapture, HirExpr, HirExprKind,
};
use crate::id::HirId;
use crate::module::HirModule;
use crate::pattern::{HirPattern, HirPatternKind};
use crate::stmt::HirStmt;

/// Magic number: "THIR" in little-endian byte order.
pub const HIR_MAGIC: u32 = 0x5249_4854;
/// Bumped on incompatible format changes.
pub const VERSION_MAJOR: u16 = 1;
/// Bumped on backward-compatible additions.
pub const VERSION_MINOR: u16 = 0;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a hash of a byte stream.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Deserialization failure.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("unexpected end of stream at offset {0}")]
    UnexpectedEof(usize),

    #[error("bad magic number {found:#010x}, expected {expected:#010x}")]
    BadMagic { found: u32, expected: u32 },

    #[error("unsupported format version {major}.{minor}")]
    VersionMismatch { major: u16, minor: u16 },

    #[error("content hash mismatch: header says {expected:#018x}, body hashes to {actual:#018x}")]
    HashMismatch { expected: u64, actual: u64 },

    #[error("invalid {what} tag {tag}")]
    BadTag { what: &'static str, tag: u8 },

    #[error("invalid UTF-8 in string at offset {0}")]
    InvalidUtf8(usize),
}

/// Serialize a module to its cache representation.
pub fn serialize_module(module: &HirModule) -> Vec<u8> {
    let mut w = Writer::new();
    w.module(module);
    let body = w.finish();

    let mut out = Vec::with_capacity(16 + body.len());
    out.extend_from_slice(&HIR_MAGIC.to_le_bytes());
    out.extend_from_slice(&VERSION_MAJOR.to_le_bytes());
    out.extend_from_slice(&VERSION_MINOR.to_le_bytes());
    out.extend_from_slice(&fnv1a(&body).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

/// Deserialize a module, verifying magic, version, and content hash.
pub fn deserialize_module(bytes: &[u8]) -> Result<HirModule, SerializeError> {
    if bytes.len() < 16 {
        return Err(SerializeError::UnexpectedEof(bytes.len()));
    }
    let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    if magic != HIR_MAGIC {
        return Err(SerializeError::BadMagic {
            found: magic,
            expected: HIR_MAGIC,
        });
    }
    let major = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
    let minor = u16::from_le_bytes(bytes[6..8].try_into().unwrap());
    if major != VERSION_MAJOR {
        return Err(SerializeError::VersionMismatch { major, minor });
    }
    let expected = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
    let body = &bytes[16..];
    let actual = fnv1a(body);
    if expected != actual {
        return Err(SerializeError::HashMismatch { expected, actual });
    }

    let mut r = Reader::new(body);
    r.module()
}

// ======================================================================
// Writer
// ======================================================================

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn boolean(&mut self, v: bool) {
        self.u8(u8::from(v));
    }

    fn string(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn symbol(&mut self, s: Symbol) {
        self.string(s.as_str());
    }

    fn span(&mut self, span: &Span) {
        self.u64(span.start as u64);
        self.u64(span.end as u64);
        self.u32(span.line);
        self.u32(span.column);
        self.u32(span.file_id.0 as u32);
    }

    fn opt<T>(&mut self, value: Option<&T>, mut f: impl FnMut(&mut Self, &T)) {
        match value {
            Some(v) => {
                self.u8(1);
                f(self, v);
            }
            None => self.u8(0),
        }
    }

    fn seq<T>(&mut self, items: &[T], mut f: impl FnMut(&mut Self, &T)) {
        self.u32(items.len() as u32);
        for item in items {
            f(self, item);
        }
    }

    fn ty(&mut self, ty: &Type) {
        match ty {
            Type::Error => self.u8(0),
            Type::Unit => self.u8(1),
            Type::Never => self.u8(2),
            Type::Bool => self.u8(3),
            Type::Char => self.u8(4),
            Type::Str => self.u8(5),
            Type::Int(w) => {
                self.u8(6);
                self.u8(int_width_tag(*w));
            }
            Type::Uint(w) => {
                self.u8(7);
                self.u8(int_width_tag(*w));
            }
            Type::Float(w) => {
                self.u8(8);
                self.u8(match w {
                    FloatWidth::W32 => 0,
                    FloatWidth::W64 => 1,
                });
            }
            Type::Named { name, args } => {
                self.u8(9);
                self.symbol(*name);
                self.seq(args, Self::ty);
            }
            Type::Param(name) => {
                self.u8(10);
                self.symbol(*name);
            }
            Type::Tuple(tys) => {
                self.u8(11);
                self.seq(tys, Self::ty);
            }
            Type::Array(elem, n) => {
                self.u8(12);
                self.ty(elem);
                self.u64(*n);
            }
            Type::Slice(elem) => {
                self.u8(13);
                self.ty(elem);
            }
            Type::Fn(params, ret) => {
                self.u8(14);
                self.seq(params, Self::ty);
                self.ty(ret);
            }
            Type::Ptr(inner) => {
                self.u8(15);
                self.ty(inner);
            }
            Type::Ref(inner, mutable) => {
                self.u8(16);
                self.ty(inner);
                self.boolean(*mutable);
            }
        }
    }

    fn lit(&mut self, lit: &Lit) {
        match lit {
            Lit::Int(v) => {
                self.u8(0);
                self.i64(*v);
            }
            Lit::Uint(v) => {
                self.u8(1);
                self.u64(*v);
            }
            Lit::Float(v) => {
                self.u8(2);
                self.f64(*v);
            }
            Lit::Bool(v) => {
                self.u8(3);
                self.boolean(*v);
            }
            Lit::Char(v) => {
                self.u8(4);
                self.u32(*v as u32);
            }
            Lit::Str(v) => {
                self.u8(5);
                self.symbol(*v);
            }
            Lit::Unit => self.u8(6),
        }
    }

    fn module(&mut self, m: &HirModule) {
        self.symbol(m.name);
        self.string(&m.source_path);
        self.seq(&m.structs, Self::struct_def);
        self.seq(&m.enums, Self::enum_def);
        self.seq(&m.behaviors, Self::behavior);
        self.seq(&m.impls, Self::impl_block);
        self.seq(&m.functions, Self::function);
        self.seq(&m.constants, Self::constant);
        self.seq(&m.imports, |w, s| w.symbol(*s));
    }

    fn struct_def(&mut self, s: &HirStruct) {
        self.u64(s.id.0);
        self.symbol(s.name);
        self.symbol(s.mangled_name);
        self.seq(&s.fields, |w, (name, ty)| {
            w.symbol(*name);
            w.ty(ty);
        });
        self.span(&s.span);
    }

    fn enum_def(&mut self, e: &HirEnum) {
        self.u64(e.id.0);
        self.symbol(e.name);
        self.symbol(e.mangled_name);
        self.seq(&e.variants, |w, (name, payload)| {
            w.symbol(*name);
            w.seq(payload, Self::ty);
        });
        self.span(&e.span);
    }

    fn behavior(&mut self, b: &HirBehavior) {
        self.u64(b.id.0);
        self.symbol(b.name);
        self.seq(&b.methods, |w, sig: &HirFnSig| {
            w.symbol(sig.name);
            w.seq(&sig.params, Self::ty);
            w.ty(&sig.ret);
        });
        self.span(&b.span);
    }

    fn impl_block(&mut self, i: &HirImpl) {
        self.u64(i.id.0);
        self.opt(i.behavior.as_ref(), |w, b| w.symbol(*b));
        self.ty(&i.self_ty);
        self.seq(&i.methods, Self::function);
        self.span(&i.span);
    }

    fn function(&mut self, f: &HirFunction) {
        self.u64(f.id.0);
        self.symbol(f.name);
        self.symbol(f.mangled_name);
        self.seq(&f.params, |w, p: &HirParam| {
            w.symbol(p.name);
            w.ty(&p.ty);
            w.span(&p.span);
        });
        self.ty(&f.ret);
        self.opt(f.body.as_ref(), |w, body| w.expr(body));
        self.seq(&f.attrs, |w, a| w.symbol(*a));
        self.span(&f.span);
    }

    fn constant(&mut self, c: &HirConst) {
        self.u64(c.id.0);
        self.symbol(c.name);
        self.ty(&c.ty);
        self.expr(&c.value);
        self.span(&c.span);
    }

    fn block(&mut self, b: &HirBlock) {
        self.seq(&b.stmts, Self::stmt);
        self.opt(b.tail.as_deref(), |w, t| w.expr(t));
    }

    fn stmt(&mut self, s: &HirStmt) {
        self.u8(s.tag());
        match s {
            HirStmt::Let {
                pattern,
                ty,
                init,
                span,
            } => {
                self.pattern(pattern);
                self.opt(ty.as_ref(), Self::ty);
                self.opt(init.as_ref(), Self::expr);
                self.span(span);
            }
            HirStmt::Expr(e) => self.expr(e),
        }
    }

    fn expr(&mut self, e: &HirExpr) {
        self.u8(e.kind.tag());
        self.u64(e.id.0);
        match &e.kind {
            HirExprKind::Literal(lit) => self.lit(lit),
            HirExprKind::Var { name, binding } => {
                self.symbol(*name);
                self.u8(binding_tag(*binding));
            }
            HirExprKind::Binary { op, left, right } => {
                self.u8(binop_tag(*op));
                self.expr(left);
                self.expr(right);
            }
            HirExprKind::Unary { op, operand } => {
                self.u8(unop_tag(*op));
                self.expr(operand);
            }
            HirExprKind::Call { callee, args } => {
                self.symbol(*callee);
                self.seq(args, Self::expr);
            }
            HirExprKind::MethodCall {
                receiver,
                method,
                type_args,
                args,
            } => {
                self.expr(receiver);
                self.symbol(*method);
                self.seq(type_args, Self::ty);
                self.seq(args, Self::expr);
            }
            HirExprKind::Field {
                object,
                field,
                index,
            } => {
                self.expr(object);
                self.symbol(*field);
                self.u32(*index);
            }
            HirExprKind::Index { object, index } => {
                self.expr(object);
                self.expr(index);
            }
            HirExprKind::Tuple(elems) | HirExprKind::Array(elems) => {
                self.seq(elems, Self::expr);
            }
            HirExprKind::ArrayRepeat { elem, count } => {
                self.expr(elem);
                self.u64(*count);
            }
            HirExprKind::StructInit { name, fields } => {
                self.symbol(*name);
                self.seq(fields, Self::expr);
            }
            HirExprKind::EnumInit {
                name,
                variant,
                payload,
            } => {
                self.symbol(*name);
                self.u32(*variant);
                self.seq(payload, Self::expr);
            }
            HirExprKind::Block(block) => self.block(block),
            HirExprKind::If {
                cond,
                then_expr,
                else_expr,
            } => {
                self.expr(cond);
                self.expr(then_expr);
                self.opt(else_expr.as_deref(), |w, e| w.expr(e));
            }
            HirExprKind::When { scrutinee, arms } => {
                self.expr(scrutinee);
                self.seq(arms, |w, arm: &HirArm| {
                    w.pattern(&arm.pattern);
                    w.opt(arm.guard.as_ref(), Self::expr);
                    w.expr(&arm.body);
                });
            }
            HirExprKind::Loop { body } => self.expr(body),
            HirExprKind::While { cond, body } => {
                self.expr(cond);
                self.expr(body);
            }
            HirExprKind::Return(value) => {
                self.opt(value.as_deref(), |w, v| w.expr(v));
            }
            HirExprKind::Break(value) => {
                self.opt(value.as_deref(), |w, v| w.expr(v));
            }
            HirExprKind::Continue => {}
            HirExprKind::Closure {
                params,
                captures,
                body,
            } => {
                self.seq(params, |w, p: &HirParam| {
                    w.symbol(p.name);
                    w.ty(&p.ty);
                    w.span(&p.span);
                });
                self.seq(captures, |w, c: &HirCapture| {
                    w.symbol(c.name);
                    w.ty(&c.ty);
                    w.u8(capture_tag(c.mode));
                });
                self.expr(body);
            }
            HirExprKind::Cast { operand, target } => {
                self.expr(operand);
                self.ty(target);
            }
            HirExprKind::Try { inner } => self.expr(inner),
            HirExprKind::Await { inner } => self.expr(inner),
            HirExprKind::Assign { place, value } => {
                self.expr(place);
                self.expr(value);
            }
            HirExprKind::CompoundAssign { op, place, value } => {
                self.u8(binop_tag(*op));
                self.expr(place);
                self.expr(value);
            }
            HirExprKind::Lowlevel { name, args } => {
                self.symbol(*name);
                self.seq(args, Self::expr);
            }
        }
        self.ty(&e.ty);
        self.span(&e.span);
    }

    fn pattern(&mut self, p: &HirPattern) {
        self.u8(p.tag());
        self.u64(p.id.0);
        match &p.kind {
            HirPatternKind::Wildcard => {}
            HirPatternKind::Binding { name, mutable } => {
                self.symbol(*name);
                self.boolean(*mutable);
            }
            HirPatternKind::Literal(lit) => self.lit(lit),
            HirPatternKind::Tuple(pats) | HirPatternKind::Or(pats) => {
                self.seq(pats, Self::pattern);
            }
            HirPatternKind::Struct { name, fields } => {
                self.symbol(*name);
                self.seq(fields, |w, (index, pat)| {
                    w.u32(*index);
                    w.pattern(pat);
                });
            }
            HirPatternKind::Enum {
                enum_name,
                variant,
                payload,
            } => {
                self.symbol(*enum_name);
                self.u32(*variant);
                self.seq(payload, Self::pattern);
            }
            HirPatternKind::Range {
                start,
                end,
                inclusive,
            } => {
                self.lit(start);
                self.lit(end);
                self.boolean(*inclusive);
            }
            HirPatternKind::Array {
                prefix,
                has_rest,
                suffix,
            } => {
                self.seq(prefix, Self::pattern);
                self.boolean(*has_rest);
                self.seq(suffix, Self::pattern);
            }
        }
        self.ty(&p.ty);
        self.span(&p.span);
    }
}

// ======================================================================
// Reader
// ======================================================================

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SerializeError> {
        if self.pos + n > self.bytes.len() {
            return Err(SerializeError::UnexpectedEof(self.pos));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, SerializeError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, SerializeError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, SerializeError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn i64(&mut self) -> Result<i64, SerializeError> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f64(&mut self) -> Result<f64, SerializeError> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn boolean(&mut self) -> Result<bool, SerializeError> {
        Ok(self.u8()? != 0)
    }

    fn string(&mut self) -> Result<String, SerializeError> {
        let len = self.u32()? as usize;
        let start = self.pos;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| SerializeError::InvalidUtf8(start))
    }

    fn symbol(&mut self) -> Result<Symbol, SerializeError> {
        Ok(Symbol::intern(&self.string()?))
    }

    fn span(&mut self) -> Result<Span, SerializeError> {
        let start = self.u64()? as usize;
        let end = self.u64()? as usize;
        let line = self.u32()?;
        let column = self.u32()?;
        let file_id = FileId(self.u32()? as usize);
        Ok(Span {
            start,
            end,
            line,
            column,
            file_id,
        })
    }

    fn opt<T>(
        &mut self,
        mut f: impl FnMut(&mut Self) -> Result<T, SerializeError>,
    ) -> Result<Option<T>, SerializeError> {
        if self.boolean()? {
            Ok(Some(f(self)?))
        } else {
            Ok(None)
        }
    }

    fn seq<T>(
        &mut self,
        mut f: impl FnMut(&mut Self) -> Result<T, SerializeError>,
    ) -> Result<Vec<T>, SerializeError> {
        let count = self.u32()? as usize;
        let mut items = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            items.push(f(self)?);
        }
        Ok(items)
    }

    fn ty(&mut self) -> Result<Type, SerializeError> {
        let tag = self.u8()?;
        Ok(match tag {
            0 => Type::Error,
            1 => Type::Unit,
            2 => Type::Never,
            3 => Type::Bool,
            4 => Type::Char,
            5 => Type::Str,
            6 => Type::Int(self.int_width()?),
            7 => Type::Uint(self.int_width()?),
            8 => {
                let w = self.u8()?;
                Type::Float(match w {
                    0 => FloatWidth::W32,
                    1 => FloatWidth::W64,
                    _ => return Err(SerializeError::BadTag { what: "float width", tag: w }),
                })
            }
            9 => {
                let name = self.symbol()?;
                let args = self.seq(Self::ty)?;
                Type::Named { name, args }
            }
            10 => Type::Param(self.symbol()?),
            11 => Type::Tuple(self.seq(Self::ty)?),
            12 => {
                let elem = self.ty()?;
                let n = self.u64()?;
                Type::Array(Box::new(elem), n)
            }
            13 => Type::Slice(Box::new(self.ty()?)),
            14 => {
                let params = self.seq(Self::ty)?;
                let ret = self.ty()?;
                Type::Fn(params, Box::new(ret))
            }
            15 => Type::Ptr(Box::new(self.ty()?)),
            16 => {
                let inner = self.ty()?;
                let mutable = self.boolean()?;
                Type::Ref(Box::new(inner), mutable)
            }
            _ => return Err(SerializeError::BadTag { what: "type", tag }),
        })
    }

    fn int_width(&mut self) -> Result<IntWidth, SerializeError> {
        let tag = self.u8()?;
        Ok(match tag {
            0 => IntWidth::W8,
            1 => IntWidth::W16,
            2 => IntWidth::W32,
            3 => IntWidth::W64,
            4 => IntWidth::W128,
            _ => return Err(SerializeError::BadTag { what: "int width", tag }),
        })
    }

    fn lit(&mut self) -> Result<Lit, SerializeError> {
        let tag = self.u8()?;
        Ok(match tag {
            0 => Lit::Int(self.i64()?),
            1 => Lit::Uint(self.u64()?),
            2 => Lit::Float(self.f64()?),
            3 => Lit::Bool(self.boolean()?),
            4 => {
                let code = self.u32()?;
                Lit::Char(char::from_u32(code).ok_or(SerializeError::BadTag {
                    what: "char literal",
                    tag: 4,
                })?)
            }
            5 => Lit::Str(self.symbol()?),
            6 => Lit::Unit,
            _ => return Err(SerializeError::BadTag { what: "literal", tag }),
        })
    }

    fn module(&mut self) -> Result<HirModule, SerializeError> {
        Ok(HirModule {
            name: self.symbol()?,
            source_path: self.string()?,
            structs: self.seq(Self::struct_def)?,
            enums: self.seq(Self::enum_def)?,
            behaviors: self.seq(Self::behavior)?,
            impls: self.seq(Self::impl_block)?,
            functions: self.seq(Self::function)?,
            constants: self.seq(Self::constant)?,
            imports: self.seq(Self::symbol)?,
        })
    }

    fn struct_def(&mut self) -> Result<HirStruct, SerializeError> {
        Ok(HirStruct {
            id: HirId(self.u64()?),
            name: self.symbol()?,
            mangled_name: self.symbol()?,
            fields: self.seq(|r| {
                let name = r.symbol()?;
                let ty = r.ty()?;
                Ok((name, ty))
            })?,
            span: self.span()?,
        })
    }

    fn enum_def(&mut self) -> Result<HirEnum, SerializeError> {
        Ok(HirEnum {
            id: HirId(self.u64()?),
            name: self.symbol()?,
            mangled_name: self.symbol()?,
            variants: self.seq(|r| {
                let name = r.symbol()?;
                let payload = r.seq(Self::ty)?;
                Ok((name, payload))
            })?,
            span: self.span()?,
        })
    }

    fn behavior(&mut self) -> Result<HirBehavior, SerializeError> {
        Ok(HirBehavior {
            id: HirId(self.u64()?),
            name: self.symbol()?,
            methods: self.seq(|r| {
                Ok(HirFnSig {
                    name: r.symbol()?,
                    params: r.seq(Self::ty)?,
                    ret: r.ty()?,
                })
            })?,
            span: self.span()?,
        })
    }

    fn impl_block(&mut self) -> Result<HirImpl, SerializeError> {
        Ok(HirImpl {
            id: HirId(self.u64()?),
            behavior: self.opt(Self::symbol)?,
            self_ty: self.ty()?,
            methods: self.seq(Self::function)?,
            span: self.span()?,
        })
    }

    fn function(&mut self) -> Result<HirFunction, SerializeError> {
        Ok(HirFunction {
            id: HirId(self.u64()?),
            name: self.symbol()?,
            mangled_name: self.symbol()?,
            params: self.seq(Self::param)?,
            ret: self.ty()?,
            body: self.opt(Self::expr)?,
            attrs: self.seq(Self::symbol)?,
            span: self.span()?,
        })
    }

    fn param(&mut self) -> Result<HirParam, SerializeError> {
        Ok(HirParam {
            name: self.symbol()?,
            ty: self.ty()?,
            span: self.span()?,
        })
    }

    fn constant(&mut self) -> Result<HirConst, SerializeError> {
        Ok(HirConst {
            id: HirId(self.u64()?),
            name: self.symbol()?,
            ty: self.ty()?,
            value: self.expr()?,
            span: self.span()?,
        })
    }

    fn block(&mut self) -> Result<HirBlock, SerializeError> {
        Ok(HirBlock {
            stmts: self.seq(Self::stmt)?,
            tail: self.opt(Self::expr)?.map(Box::new),
        })
    }

    fn stmt(&mut self) -> Result<HirStmt, SerializeError> {
        let tag = self.u8()?;
        Ok(match tag {
            0 => HirStmt::Let {
                pattern: self.pattern()?,
                ty: self.opt(Self::ty)?,
                init: self.opt(Self::expr)?,
                span: self.span()?,
            },
            1 => HirStmt::Expr(self.expr()?),
            _ => return Err(SerializeError::BadTag { what: "statement", tag }),
        })
    }

    fn expr(&mut self) -> Result<HirExpr, SerializeError> {
        let tag = self.u8()?;
        let id = HirId(self.u64()?);
        let kind = match tag {
            0 => HirExprKind::Literal(self.lit()?),
            1 => HirExprKind::Var {
                name: self.symbol()?,
                binding: self.binding_kind()?,
            },
            2 => HirExprKind::Binary {
                op: self.binop()?,
                left: Box::new(self.expr()?),
                right: Box::new(self.expr()?),
            },
            3 => HirExprKind::Unary {
                op: self.unop()?,
                operand: Box::new(self.expr()?),
            },
            4 => HirExprKind::Call {
                callee: self.symbol()?,
                args: self.seq(Self::expr)?,
            },
            5 => HirExprKind::MethodCall {
                receiver: Box::new(self.expr()?),
                method: self.symbol()?,
                type_args: self.seq(Self::ty)?,
                args: self.seq(Self::expr)?,
            },
            6 => HirExprKind::Field {
                object: Box::new(self.expr()?),
                field: self.symbol()?,
                index: self.u32()?,
            },
            7 => HirExprKind::Index {
                object: Box::new(self.expr()?),
                index: Box::new(self.expr()?),
            },
            8 => HirExprKind::Tuple(self.seq(Self::expr)?),
            9 => HirExprKind::Array(self.seq(Self::expr)?),
            10 => HirExprKind::ArrayRepeat {
                elem: Box::new(self.expr()?),
                count: self.u64()?,
            },
            11 => HirExprKind::StructInit {
                name: self.symbol()?,
                fields: self.seq(Self::expr)?,
            },
            12 => HirExprKind::EnumInit {
                name: self.symbol()?,
                variant: self.u32()?,
                payload: self.seq(Self::expr)?,
            },
            13 => HirExprKind::Block(self.block()?),
            14 => HirExprKind::If {
                cond: Box::new(self.expr()?),
                then_expr: Box::new(self.expr()?),
                else_expr: self.opt(Self::expr)?.map(Box::new),
            },
            15 => HirExprKind::When {
                scrutinee: Box::new(self.expr()?),
                arms: self.seq(|r| {
                    Ok(HirArm {
                        pattern: r.pattern()?,
                        guard: r.opt(Self::expr)?,
                        body: r.expr()?,
                    })
                })?,
            },
            16 => HirExprKind::Loop {
                body: Box::new(self.expr()?),
            },
            17 => HirExprKind::While {
                cond: Box::new(self.expr()?),
                body: Box::new(self.expr()?),
            },
            18 => HirExprKind::Return(self.opt(Self::expr)?.map(Box::new)),
            19 => HirExprKind::Break(self.opt(Self::expr)?.map(Box::new)),
            20 => HirExprKind::Continue,
            21 => HirExprKind::Closure {
                params: self.seq(Self::param)?,
                captures: self.seq(|r| {
                    Ok(HirCapture {
                        name: r.symbol()?,
                        ty: r.ty()?,
                        mode: r.capture_mode()?,
                    })
                })?,
                body: Box::new(self.expr()?),
            },
            22 => HirExprKind::Cast {
                operand: Box::new(self.expr()?),
                target: self.ty()?,
            },
            23 => HirExprKind::Try {
                inner: Box::new(self.expr()?),
            },
            24 => HirExprKind::Await {
                inner: Box::new(self.expr()?),
            },
            25 => HirExprKind::Assign {
                place: Box::new(self.expr()?),
                value: Box::new(self.expr()?),
            },
            26 => HirExprKind::CompoundAssign {
                op: self.binop()?,
                place: Box::new(self.expr()?),
                value: Box::new(self.expr()?),
            },
            27 => HirExprKind::Lowlevel {
                name: self.symbol()?,
                args: self.seq(Self::expr)?,
            },
            _ => return Err(SerializeError::BadTag { what: "expression", tag }),
        };
        let ty = self.ty()?;
        let span = self.span()?;
        Ok(HirExpr { id, ty, span, kind })
    }

    fn pattern(&mut self) -> Result<HirPattern, SerializeError> {
        let tag = self.u8()?;
        let id = HirId(self.u64()?);
        let kind = match tag {
            0 => HirPatternKind::Wildcard,
            1 => HirPatternKind::Binding {
                name: self.symbol()?,
                mutable: self.boolean()?,
            },
            2 => HirPatternKind::Literal(self.lit()?),
            3 => HirPatternKind::Tuple(self.seq(Self::pattern)?),
            4 => HirPatternKind::Struct {
                name: self.symbol()?,
                fields: self.seq(|r| {
                    let index = r.u32()?;
                    let pat = r.pattern()?;
                    Ok((index, pat))
                })?,
            },
            5 => HirPatternKind::Enum {
                enum_name: self.symbol()?,
                variant: self.u32()?,
                payload: self.seq(Self::pattern)?,
            },
            6 => HirPatternKind::Or(self.seq(Self::pattern)?),
            7 => HirPatternKind::Range {
                start: self.lit()?,
                end: self.lit()?,
                inclusive: self.boolean()?,
            },
            8 => HirPatternKind::Array {
                prefix: self.seq(Self::pattern)?,
                has_rest: self.boolean()?,
                suffix: self.seq(Self::pattern)?,
            },
            _ => return Err(SerializeError::BadTag { what: "pattern", tag }),
        };
        let ty = self.ty()?;
        let span = self.span()?;
        Ok(HirPattern { id, ty, span, kind })
    }

    fn binding_kind(&mut self) -> Result<BindingKind, SerializeError> {
        let tag = self.u8()?;
        Ok(match tag {
            0 => BindingKind::Local,
            1 => BindingKind::Param,
            2 => BindingKind::Const,
            3 => BindingKind::Func,
            _ => return Err(SerializeError::BadTag { what: "binding kind", tag }),
        })
    }

    fn capture_mode(&mut self) -> Result<CaptureMode, SerializeError> {
        let tag = self.u8()?;
        Ok(match tag {
            0 => CaptureMode::ByValue,
            1 => CaptureMode::ByRef,
            2 => CaptureMode::ByMutRef,
            _ => return Err(SerializeError::BadTag { what: "capture mode", tag }),
        })
    }

    fn binop(&mut self) -> Result<BinOp, SerializeError> {
        let tag = self.u8()?;
        Ok(match tag {
            0 => BinOp::Add,
            1 => BinOp::Sub,
            2 => BinOp::Mul,
            3 => BinOp::Div,
            4 => BinOp::Mod,
            5 => BinOp::Eq,
            6 => BinOp::Ne,
            7 => BinOp::Lt,
            8 => BinOp::Le,
            9 => BinOp::Gt,
            10 => BinOp::Ge,
            11 => BinOp::And,
            12 => BinOp::Or,
            13 => BinOp::BitAnd,
            14 => BinOp::BitOr,
            15 => BinOp::BitXor,
            16 => BinOp::Shl,
            17 => BinOp::Shr,
            _ => return Err(SerializeError::BadTag { what: "binary op", tag }),
        })
    }

    fn unop(&mut self) -> Result<UnOp, SerializeError> {
        let tag = self.u8()?;
        Ok(match tag {
            0 => UnOp::Neg,
            1 => UnOp::Not,
            2 => UnOp::BitNot,
            _ => return Err(SerializeError::BadTag { what: "unary op", tag }),
        })
    }
}

fn int_width_tag(w: IntWidth) -> u8 {
    match w {
        IntWidth::W8 => 0,
        IntWidth::W16 => 1,
        IntWidth::W32 => 2,
        IntWidth::W64 => 3,
        IntWidth::W128 => 4,
    }
}

fn binding_tag(b: BindingKind) -> u8 {
    match b {
        BindingKind::Local => 0,
        BindingKind::Param => 1,
        BindingKind::Const => 2,
        BindingKind::Func => 3,
    }
}

fn capture_tag(m: CaptureMode) -> u8 {
    match m {
        CaptureMode::ByValue => 0,
        CaptureMode::ByRef => 1,
        CaptureMode::ByMutRef => 2,
    }
}

fn binop_tag(op: BinOp) -> u8 {
    match op {
        BinOp::Add => 0,
        BinOp::Sub => 1,
        BinOp::Mul => 2,
        BinOp::Div => 3,
        BinOp::Mod => 4,
        BinOp::Eq => 5,
        BinOp::Ne => 6,
        BinOp::Lt => 7,
        BinOp::Le => 8,
        BinOp::Gt => 9,
        BinOp::Ge => 10,
        BinOp::And => 11,
        BinOp::Or => 12,
        BinOp::BitAnd => 13,
        BinOp::BitOr => 14,
        BinOp::BitXor => 15,
        BinOp::Shl => 16,
        BinOp::Shr => 17,
    }
}

fn unop_tag(op: UnOp) -> u8 {
    match op {
        UnOp::Neg => 0,
        UnOp::Not => 1,
        UnOp::BitNot => 2,
    }
}
