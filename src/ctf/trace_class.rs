//! The CTF trace IR (spec §3: "Trace class (CTF)").
//!
//! Built by [`super::ir`]'s third decoder pass. One `TraceClass` per
//! metadata stream, owning a tree of stream classes, event classes and
//! field classes, plus the clock classes they may reference by name.

use crate::value::Value;
use byteordered::Endianness;
use smol_str::SmolStr;
use uuid::Uuid;

/// The scopes a field path can resolve into, in the fixed lookup order spec
/// §3 specifies: "packet header, packet context, event header, event stream
/// context, event context, event payload".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    PacketHeader,
    PacketContext,
    EventHeader,
    EventStreamContext,
    EventContext,
    EventPayload,
}

impl Scope {
    pub const LOOKUP_ORDER: [Scope; 6] = [
        Scope::PacketHeader,
        Scope::PacketContext,
        Scope::EventHeader,
        Scope::EventStreamContext,
        Scope::EventContext,
        Scope::EventPayload,
    ];
}

/// An ordered path into a field tree: a scope plus a sequence of member
/// indices, used by variant selectors and dynamic-array lengths (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    pub scope: Scope,
    pub indices: Vec<usize>,
}

impl FieldPath {
    pub fn new(scope: Scope, indices: Vec<usize>) -> Self {
        FieldPath { scope, indices }
    }
}

/// The integer display base (spec §4.5's lexer accepts `0b`/`0`/`0x`
/// literals; the base an integer field class is declared with controls how
/// a pretty-printer would render its values, not how it's stored).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerBase {
    Binary,
    Octal,
    Decimal,
    Hexadecimal,
}

/// One inclusive range mapped to an enumerator label (spec §3:
/// "enumeration ... label -> range map"). original_source allows more than
/// one range per label (e.g. `A = 0, 5...7`); this is kept instead of
/// collapsing to a single range, since the distilled spec's "map" wording
/// doesn't rule it out and original_source's AST clearly supports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumRange {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumerator {
    pub label: SmolStr,
    pub ranges: Vec<EnumRange>,
}

/// A field class variant (spec §3: "Field class variants").
#[derive(Debug, Clone, PartialEq)]
pub enum FieldClass {
    UnsignedInteger {
        bits: u32,
        alignment: u32,
        byte_order: Endianness,
        base: IntegerBase,
        mapped_clock: Option<SmolStr>,
    },
    SignedInteger {
        bits: u32,
        alignment: u32,
        byte_order: Endianness,
        base: IntegerBase,
    },
    FloatingPoint {
        exp_bits: u32,
        mantissa_bits: u32,
        alignment: u32,
        byte_order: Endianness,
    },
    /// NUL-terminated UTF-8 (spec §3).
    String,
    Structure {
        alignment: u32,
        members: Vec<(SmolStr, FieldClass)>,
    },
    StaticArray {
        length: u64,
        element: Box<FieldClass>,
    },
    DynamicArray {
        length_path: FieldPath,
        element: Box<FieldClass>,
    },
    Variant {
        selector_path: FieldPath,
        options: Vec<(SmolStr, FieldClass)>,
    },
    Enumeration {
        /// The underlying integer representation (spec §3: "underlying
        /// integer class"); enumerations are always unsigned in CTF 1.8.
        bits: u32,
        alignment: u32,
        byte_order: Endianness,
        base: IntegerBase,
        enumerators: Vec<Enumerator>,
    },
}

impl FieldClass {
    /// Find a direct or nested member by path indices, used when resolving
    /// a [`FieldPath`] against the scope it names (spec §4.5 pass 3).
    pub fn member_at(&self, indices: &[usize]) -> Option<&FieldClass> {
        let Some((&first, rest)) = indices.split_first() else {
            return Some(self);
        };
        match self {
            FieldClass::Structure { members, .. } => {
                members.get(first).map(|(_, fc)| fc).and_then(|fc| fc.member_at(rest))
            }
            FieldClass::Variant { options, .. } => {
                options.get(first).map(|(_, fc)| fc).and_then(|fc| fc.member_at(rest))
            }
            _ => None,
        }
    }

    /// Whether this field class is an integer, which is the only legal
    /// target of a dynamic-array length or variant selector path (spec §3:
    /// "refers to an integer field").
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldClass::UnsignedInteger { .. }
                | FieldClass::SignedInteger { .. }
                | FieldClass::Enumeration { .. }
        )
    }
}

/// A clock source a stream's event timestamps may be mapped through (spec
/// §3: "Clock class").
#[derive(Debug, Clone, PartialEq)]
pub struct ClockClass {
    pub name: SmolStr,
    pub frequency: u64,
    pub offset_seconds: i64,
    pub offset_cycles: u64,
    pub precision: u64,
    pub uuid: Option<Uuid>,
    /// Present on original_source's clock class, silent in the distilled
    /// spec's field list (SPEC_FULL §4).
    pub absolute: bool,
    pub description: Option<SmolStr>,
}

/// One event type within a stream class (spec §3: "Event class").
#[derive(Debug, Clone, PartialEq)]
pub struct EventClass {
    pub id: u64,
    pub name: SmolStr,
    pub context: Option<FieldClass>,
    pub payload: Option<FieldClass>,
}

/// One stream type within a trace class (spec §3: "Stream class").
#[derive(Debug, Clone, PartialEq)]
pub struct StreamClass {
    pub id: u64,
    pub name: Option<SmolStr>,
    pub event_header: Option<FieldClass>,
    pub event_context: Option<FieldClass>,
    pub packet_context: Option<FieldClass>,
    pub event_classes: Vec<EventClass>,
}

impl StreamClass {
    pub fn event_class(&self, id: u64) -> Option<&EventClass> {
        self.event_classes.iter().find(|ec| ec.id == id)
    }
}

/// The root of the CTF IR produced by the decoder (spec §3, §4.5).
#[derive(Debug, Clone)]
pub struct TraceClass {
    pub uuid: Option<Uuid>,
    /// The trace's `env { }` block, kept as a value map for informational
    /// display (SPEC_FULL §4), never consulted by the type system.
    pub env: Value,
    pub clock_classes: Vec<ClockClass>,
    pub stream_classes: Vec<StreamClass>,
}

impl TraceClass {
    pub fn clock_class(&self, name: &str) -> Option<&ClockClass> {
        self.clock_classes.iter().find(|c| c.name == name)
    }

    pub fn stream_class(&self, id: u64) -> Option<&StreamClass> {
        self.stream_classes.iter().find(|s| s.id == id)
    }
}
