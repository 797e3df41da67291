//! The graph validator (spec §4.4, §8).
//!
//! Given a candidate connection list and the three populated component
//! sets, runs the five ordered checks spec §4.4 names and stops at the
//! first failure. Every error keeps the connection's original textual
//! argument so a caller can point the user at the exact `--connect` flag
//! that is wrong.

use crate::component::ComponentKind;
use crate::connect::Connection;
use smol_str::SmolStr;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("connection {original:?} references unknown component {name:?}")]
    UnknownComponent { name: SmolStr, original: String },
    #[error(
        "connection {original:?} is not allowed: a {upstream_kind} cannot connect to a {downstream_kind}"
    )]
    IllegalDirection {
        upstream_kind: ComponentKind,
        downstream_kind: ComponentKind,
        original: String,
    },
    #[error("component {name:?} is not the endpoint of any connection")]
    Unconnected { name: SmolStr },
    #[error("duplicate connection {original:?}")]
    DuplicateConnection { original: String },
    #[error("connection graph has a cycle through component {name:?} (via {original:?})")]
    Cycle { name: SmolStr, original: String },
}

/// The three populated component sets the validator checks against (spec
/// §4.4: "the populated component sets (sources, filters, sinks)").
pub struct ComponentSets<'a> {
    pub sources: &'a [SmolStr],
    pub filters: &'a [SmolStr],
    pub sinks: &'a [SmolStr],
}

impl ComponentSets<'_> {
    fn kind_of(&self, name: &str) -> Option<ComponentKind> {
        if self.sources.iter().any(|n| n == name) {
            Some(ComponentKind::Source)
        } else if self.filters.iter().any(|n| n == name) {
            Some(ComponentKind::Filter)
        } else if self.sinks.iter().any(|n| n == name) {
            Some(ComponentKind::Sink)
        } else {
            None
        }
    }

    fn all_names(&self) -> impl Iterator<Item = &SmolStr> {
        self.sources.iter().chain(self.filters.iter()).chain(self.sinks.iter())
    }
}

/// Allowed `(upstream, downstream)` kind pairs (spec §3: "A source may
/// connect only to a filter or a sink; a filter only to a filter or a sink;
/// a sink cannot be an upstream").
fn direction_allowed(upstream: ComponentKind, downstream: ComponentKind) -> bool {
    matches!(
        (upstream, downstream),
        (ComponentKind::Source, ComponentKind::Filter)
            | (ComponentKind::Source, ComponentKind::Sink)
            | (ComponentKind::Filter, ComponentKind::Filter)
            | (ComponentKind::Filter, ComponentKind::Sink)
    )
}

/// Run the five ordered checks and return the first failure, if any.
pub fn validate(
    connections: &[Connection],
    components: &ComponentSets<'_>,
) -> Result<(), ValidationError> {
    // 1. Endpoints exist.
    for c in connections {
        if components.kind_of(&c.upstream).is_none() {
            return Err(ValidationError::UnknownComponent {
                name: c.upstream.as_str().into(),
                original: c.original.clone(),
            });
        }
        if components.kind_of(&c.downstream).is_none() {
            return Err(ValidationError::UnknownComponent {
                name: c.downstream.as_str().into(),
                original: c.original.clone(),
            });
        }
    }

    // 2. Directions legal.
    for c in connections {
        let up_kind = components.kind_of(&c.upstream).expect("checked above");
        let down_kind = components.kind_of(&c.downstream).expect("checked above");
        if !direction_allowed(up_kind, down_kind) {
            return Err(ValidationError::IllegalDirection {
                upstream_kind: up_kind,
                downstream_kind: down_kind,
                original: c.original.clone(),
            });
        }
    }

    // 3. All components connected.
    let mut referenced: HashSet<&str> = HashSet::new();
    for c in connections {
        referenced.insert(c.upstream.as_str());
        referenced.insert(c.downstream.as_str());
    }
    for name in components.all_names() {
        if !referenced.contains(name.as_str()) {
            return Err(ValidationError::Unconnected { name: name.clone() });
        }
    }

    // 4. No duplicate, hashed as up|0x01|upglob|0x01|down|0x01|downglob.
    let mut seen: HashSet<String> = HashSet::new();
    for c in connections {
        let key = format!(
            "{}\u{1}{}\u{1}{}\u{1}{}",
            c.upstream, c.upstream_glob, c.downstream, c.downstream_glob
        );
        if !seen.insert(key) {
            return Err(ValidationError::DuplicateConnection { original: c.original.clone() });
        }
    }

    // 5. No cycle: DFS from each connection's upstream along matching
    // upstream endpoints, treating the current path as a stack of names.
    let mut edges: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
    for c in connections {
        edges.entry(c.upstream.as_str()).or_default().push((c.downstream.as_str(), &c.original));
    }
    for start in components.all_names() {
        let mut stack: Vec<&str> = Vec::new();
        if let Some(err) = detect_cycle(start.as_str(), &edges, &mut stack) {
            return Err(err);
        }
    }

    Ok(())
}

fn detect_cycle<'a>(
    node: &'a str,
    edges: &HashMap<&'a str, Vec<(&'a str, &'a str)>>,
    stack: &mut Vec<&'a str>,
) -> Option<ValidationError> {
    if stack.contains(&node) {
        return None;
    }
    stack.push(node);
    if let Some(outgoing) = edges.get(node) {
        for (next, original) in outgoing {
            if stack.contains(next) {
                return Some(ValidationError::Cycle {
                    name: (*next).into(),
                    original: (*original).to_string(),
                });
            }
            if let Some(err) = detect_cycle(next, edges, stack) {
                return Some(err);
            }
        }
    }
    stack.pop();
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect::parse;

    fn names(xs: &[&str]) -> Vec<SmolStr> {
        xs.iter().map(|s| SmolStr::from(*s)).collect()
    }

    #[test]
    fn simple_source_to_sink_accepted() {
        let conns = vec![parse("S:K").unwrap()];
        let sources = names(&["S"]);
        let sinks = names(&["K"]);
        let sets = ComponentSets { sources: &sources, filters: &[], sinks: &sinks };
        assert!(validate(&conns, &sets).is_ok());
    }

    #[test]
    fn source_filter_sink_accepted() {
        let conns = vec![parse("S:F").unwrap(), parse("F:K").unwrap()];
        let sources = names(&["S"]);
        let filters = names(&["F"]);
        let sinks = names(&["K"]);
        let sets = ComponentSets { sources: &sources, filters: &filters, sinks: &sinks };
        assert!(validate(&conns, &sets).is_ok());
    }

    #[test]
    fn duplicate_connection_rejected() {
        let conns = vec![parse("S:K").unwrap(), parse("S:K").unwrap()];
        let sources = names(&["S"]);
        let sinks = names(&["K"]);
        let sets = ComponentSets { sources: &sources, filters: &[], sinks: &sinks };
        assert!(matches!(
            validate(&conns, &sets),
            Err(ValidationError::DuplicateConnection { .. })
        ));
    }

    #[test]
    fn sink_as_upstream_rejected() {
        let conns = vec![parse("K:S").unwrap()];
        let sources = names(&["S"]);
        let sinks = names(&["K"]);
        let sets = ComponentSets { sources: &sources, filters: &[], sinks: &sinks };
        assert!(matches!(
            validate(&conns, &sets),
            Err(ValidationError::IllegalDirection { .. })
        ));
    }

    #[test]
    fn cycle_between_filters_rejected() {
        let conns = vec![parse("S:F1").unwrap(), parse("F1:F2").unwrap(), parse("F2:F1").unwrap(), parse("F1:K").unwrap()];
        let sources = names(&["S"]);
        let filters = names(&["F1", "F2"]);
        let sinks = names(&["K"]);
        let sets = ComponentSets { sources: &sources, filters: &filters, sinks: &sinks };
        assert!(matches!(validate(&conns, &sets), Err(ValidationError::Cycle { .. })));
    }

    #[test]
    fn unconnected_source_rejected() {
        let conns: Vec<Connection> = vec![];
        let sources = names(&["S"]);
        let sets = ComponentSets { sources: &sources, filters: &[], sinks: &[] };
        assert!(matches!(validate(&conns, &sets), Err(ValidationError::Unconnected { .. })));
    }
}
