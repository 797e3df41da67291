//! The component model: source, filter and sink traits, their shared
//! instance/class wrappers, and the construction-parameter contract.
//!
//! Component classes are split three ways because a source may only own
//! output ports, a sink only input ports, and a filter both — the split is
//! enforced at the type level instead of by a runtime kind check.
//! Components here are driven by a single cooperative thread, so none of
//! these traits need `Send`/`Sync`.

use crate::error::{Error, ErrorKind, Result};
use crate::message::Message;
use crate::value::Value;
use smol_str::SmolStr;
use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Input => "input",
            Direction::Output => "output",
        })
    }
}

/// A named endpoint attached to exactly one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub name: SmolStr,
    pub direction: Direction,
}

impl Port {
    pub fn input(name: impl Into<SmolStr>) -> Self {
        Port { name: name.into(), direction: Direction::Input }
    }
    pub fn output(name: impl Into<SmolStr>) -> Self {
        Port { name: name.into(), direction: Direction::Output }
    }
}

/// The result of asking a component to produce its next message on some
/// output: a message, `AGAIN`, or end-of-stream.
#[derive(Debug, Clone)]
pub enum ConsumeResult {
    Message(Message),
    Again,
    End,
}

/// Passed to [`FilterComponent::consume`] and [`SinkComponent::consume`] so
/// the component can pull from whatever is connected to one of its own
/// input ports. The scheduler implements this by recursively walking the
/// connection graph, letting sinks pull messages through their upstream
/// chain.
pub trait Upstream {
    fn pull(&mut self, input_port: &str) -> Result<ConsumeResult>;
}

/// Documents one recognised construction parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
}

/// A source component: owns output ports only.
#[allow(unused_variables)]
pub trait SourceComponent: 'static {
    fn output_ports(&self) -> Vec<Port>;
    fn next(&mut self, output_port: &str) -> Result<ConsumeResult>;
    fn finalize(&mut self) {}
}

/// A filter component: owns both input and output ports.
#[allow(unused_variables)]
pub trait FilterComponent: 'static {
    fn input_ports(&self) -> Vec<Port>;
    fn output_ports(&self) -> Vec<Port>;
    fn consume(&mut self, output_port: &str, upstream: &mut dyn Upstream) -> Result<ConsumeResult>;
    fn finalize(&mut self) {}
}

/// A sink component: owns input ports only.
#[allow(unused_variables)]
pub trait SinkComponent: 'static {
    fn input_ports(&self) -> Vec<Port>;
    fn consume(&mut self, upstream: &mut dyn Upstream) -> Result<ConsumeResult>;
    fn finalize(&mut self) {}
}

/// Which of the three component kinds a [`ComponentClass`] builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Source,
    Filter,
    Sink,
}

impl Display for ComponentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComponentKind::Source => "source",
            ComponentKind::Filter => "filter",
            ComponentKind::Sink => "sink",
        })
    }
}

type SourceFactory = Box<dyn Fn(&str, &Value) -> Result<Box<dyn SourceComponent>>>;
type FilterFactory = Box<dyn Fn(&str, &Value) -> Result<Box<dyn FilterComponent>>>;
type SinkFactory = Box<dyn Fn(&str, &Value) -> Result<Box<dyn SinkComponent>>>;

/// The per-kind factory a [`ComponentClass`] wraps: given an instance name
/// and a parameter map, it produces a component instance.
pub enum Factory {
    Source(SourceFactory),
    Filter(FilterFactory),
    Sink(SinkFactory),
}

/// An instantiated component, tagged by kind so the scheduler can place it
/// into the right one of its three instance sets.
pub enum ComponentInstance {
    Source(Box<dyn SourceComponent>),
    Filter(Box<dyn FilterComponent>),
    Sink(Box<dyn SinkComponent>),
}

impl ComponentInstance {
    pub fn kind(&self) -> ComponentKind {
        match self {
            ComponentInstance::Source(_) => ComponentKind::Source,
            ComponentInstance::Filter(_) => ComponentKind::Filter,
            ComponentInstance::Sink(_) => ComponentKind::Sink,
        }
    }

    pub fn output_ports(&self) -> Vec<Port> {
        match self {
            ComponentInstance::Source(c) => c.output_ports(),
            ComponentInstance::Filter(c) => c.output_ports(),
            ComponentInstance::Sink(_) => Vec::new(),
        }
    }

    pub fn input_ports(&self) -> Vec<Port> {
        match self {
            ComponentInstance::Source(_) => Vec::new(),
            ComponentInstance::Filter(c) => c.input_ports(),
            ComponentInstance::Sink(c) => c.input_ports(),
        }
    }

    pub fn finalize(&mut self) {
        match self {
            ComponentInstance::Source(c) => c.finalize(),
            ComponentInstance::Filter(c) => c.finalize(),
            ComponentInstance::Sink(c) => c.finalize(),
        }
    }
}

/// A `(kind, plugin name, class name)` descriptor plus its factory.
pub struct ComponentClass {
    pub kind: ComponentKind,
    pub plugin_name: SmolStr,
    pub class_name: SmolStr,
    pub description: &'static str,
    pub help: &'static str,
    factory: Factory,
    /// Non-empty iff this class opts into rejecting unrecognised
    /// construction parameters; empty means permissive, treating the ABI as
    /// opaque by default.
    recognised_params: &'static [ParamSpec],
    query_fn: Option<Box<dyn Fn(&str, &Value) -> Result<Value>>>,
}

impl ComponentClass {
    pub fn new(
        kind: ComponentKind,
        plugin_name: impl Into<SmolStr>,
        class_name: impl Into<SmolStr>,
        description: &'static str,
        help: &'static str,
        factory: Factory,
    ) -> Self {
        ComponentClass {
            kind,
            plugin_name: plugin_name.into(),
            class_name: class_name.into(),
            description,
            help,
            factory,
            recognised_params: &[],
            query_fn: None,
        }
    }

    pub fn with_recognised_params(mut self, params: &'static [ParamSpec]) -> Self {
        self.recognised_params = params;
        self
    }

    pub fn with_query(
        mut self,
        query: impl Fn(&str, &Value) -> Result<Value> + 'static,
    ) -> Self {
        self.query_fn = Some(Box::new(query));
        self
    }

    pub fn recognised_params(&self) -> &'static [ParamSpec] {
        self.recognised_params
    }

    /// Reject construction parameters not named in [`recognised_params`]
    /// when the class has opted in by providing a non-empty list.
    pub fn check_params(&self, params: &Value) -> Result<()> {
        if self.recognised_params.is_empty() {
            return Ok(());
        }
        for (key, _) in params.map_iter().unwrap_or_default() {
            if !self.recognised_params.iter().any(|p| p.name == key.as_ref()) {
                return Err(Error::new(
                    ErrorKind::Component,
                    "component-class",
                    format!(
                        "{}.{} doesn't recognise parameter {key:?}",
                        self.plugin_name, self.class_name
                    ),
                ));
            }
        }
        Ok(())
    }

    pub fn query(&self, object: &str, params: &Value) -> Result<Value> {
        match &self.query_fn {
            Some(f) => f(object, params),
            None => Err(Error::new(
                ErrorKind::NotFound,
                "component-class",
                format!(
                    "{}.{} does not support queries (object {object:?})",
                    self.plugin_name, self.class_name
                ),
            )),
        }
    }

    /// Build a fresh instance, validating parameters first.
    pub fn build(&self, instance_name: &str, params: &Value) -> Result<ComponentInstance> {
        self.check_params(params)?;
        match &self.factory {
            Factory::Source(f) if self.kind == ComponentKind::Source => {
                f(instance_name, params).map(ComponentInstance::Source)
            }
            Factory::Filter(f) if self.kind == ComponentKind::Filter => {
                f(instance_name, params).map(ComponentInstance::Filter)
            }
            Factory::Sink(f) if self.kind == ComponentKind::Sink => {
                f(instance_name, params).map(ComponentInstance::Sink)
            }
            _ => unreachable!("ComponentClass::factory kind must match ComponentClass::kind"),
        }
    }
}
