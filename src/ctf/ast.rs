//! The TSDL abstract syntax tree (spec §4.5 "TSDL language").
//!
//! original_source builds a generic `struct ctf_node` tree and discriminates
//! on a `NODE_*` tag checked by every subsequent pass (`ctf-parser.y`,
//! `ctf-ast.h`). Here each block/type shape gets its own Rust variant, so the
//! parent-linking pass spec §4.5 calls out separately falls out for free:
//! a node's parent is just whoever owns the `Vec`/`Box` it lives in.

use smol_str::SmolStr;

/// A literal or bare identifier appearing on the right of `key = ...;`
/// (spec §4.5: "key/value expressions `k = <unary-expr>`").
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(SmolStr),
    /// A bare identifier or dotted path, e.g. `le`, `clock.monotonic.value`.
    Ident(SmolStr),
}

/// The length suffix of a declarator (spec §3: "static-array (fixed
/// length...)" / "dynamic-array (length field path...)").
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayLen {
    Static(u64),
    /// A dotted field-path expression, resolved against enclosing scopes
    /// during IR construction (spec §4.5 pass 3).
    Dynamic(SmolStr),
}

/// A named field: a type expression plus a declarator (spec §4.5: "nested
/// type declarations").
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub ty: TypeExpr,
    pub name: SmolStr,
    pub array_lens: Vec<ArrayLen>,
}

/// One entry inside a `struct`/`variant` body: either a field, or a nested
/// `typedef` that introduces no field of its own but extends the
/// declaration scope for the rest of the body (spec §4.5: "two symbol
/// scopes are maintained: a declaration scope ... chained to enclosing
/// blocks").
#[derive(Debug, Clone, PartialEq)]
pub enum StructMember {
    Field(FieldDecl),
    Typedef {
        ty: TypeExpr,
        name: SmolStr,
        array_lens: Vec<ArrayLen>,
    },
}

/// One `label [= value [... value]]` entry inside an `enum { }` body (spec
/// §3: "enumeration ... label -> range map"; original_source's enumerator
/// grammar allows an implicit, auto-incrementing value when none is given).
#[derive(Debug, Clone, PartialEq)]
pub struct EnumeratorAst {
    pub label: SmolStr,
    pub explicit_range: Option<(i64, i64)>,
}

/// A type expression: either a primitive/compound type literal or a
/// reference to a name introduced by `typedef`/`typealias` (spec §4.5:
/// "`typedef` and `typealias`").
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Integer(Vec<(SmolStr, Literal)>),
    FloatingPoint(Vec<(SmolStr, Literal)>),
    String(Vec<(SmolStr, Literal)>),
    Struct {
        members: Vec<StructMember>,
        align: Option<u32>,
    },
    Variant {
        tag: SmolStr,
        members: Vec<StructMember>,
    },
    Enum {
        base: Box<TypeExpr>,
        enumerators: Vec<EnumeratorAst>,
    },
    /// A name bound by an enclosing `typedef`/`typealias` (spec §4.5 "two
    /// symbol scopes ... a declaration scope").
    Named(SmolStr),
}

/// One entry inside a block body (spec §4.5: "Each block contains key/value
/// expressions ... and nested type declarations").
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// `key = value;`
    Assign { key: SmolStr, value: Literal },
    /// `key := type-expr;` (e.g. `fields := struct { ... };`).
    TypeAssign { key: SmolStr, ty: TypeExpr },
    /// A field declaration inside a `struct`/`variant` body, or (when it
    /// appears directly inside a `trace`/`stream`/`event` block body) a
    /// bare `type-expr declarator;` using a previously named type.
    Field(FieldDecl),
    Typedef {
        ty: TypeExpr,
        name: SmolStr,
        array_lens: Vec<ArrayLen>,
    },
    Typealias {
        ty: TypeExpr,
        name: SmolStr,
    },
}

/// A top-level declaration (spec §4.5: "top-level blocks `trace { }`, `env
/// { }`, `clock { }`, `stream { }`, `event { }`, `callsite { }`, plus
/// `typedef` and `typealias`").
#[derive(Debug, Clone, PartialEq)]
pub enum TopDecl {
    Trace(Vec<Entry>),
    Env(Vec<Entry>),
    Clock(Vec<Entry>),
    Stream(Vec<Entry>),
    Event(Vec<Entry>),
    /// Parsed and placement-validated, then dropped (SPEC_FULL §4: out of
    /// scope per spec §1's DWARF/ELF exclusion).
    Callsite(Vec<Entry>),
    Typedef {
        ty: TypeExpr,
        name: SmolStr,
        array_lens: Vec<ArrayLen>,
    },
    Typealias {
        ty: TypeExpr,
        name: SmolStr,
    },
}
