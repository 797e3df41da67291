//! The graph scheduler (spec §4.6, §5, §8 "Scheduler").
//!
//! Component creation, port resolution (static and dynamic), and the
//! `run`/`AGAIN`/`END`/error execution loop described in spec §4.6. The
//! scheduler is single-threaded and cooperative (spec §5): a single call to
//! [`Graph::run`] performs one round-robin pass over the sink set and
//! returns; the caller (typically the `bt2` binary, spec §6) loops on that
//! until it sees a terminal [`RunStatus`], sleeping in short slices on
//! `AGAIN` so the interrupter stays responsive (spec §5: "poll ... at a
//! granularity finer than 100 ms").

use crate::component::{
    ComponentInstance, ComponentKind, ConsumeResult, Port, Upstream,
};
use crate::connect::Connection;
use crate::error::{Error, ErrorKind, Result};
use crate::graph::interrupter::Interrupter;
use crate::registry::PluginRegistry;
use crate::value::Value;
use smol_str::SmolStr;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error as ThisError;

/// Default `retry_duration_us` (spec §4.6: "sleep for `retry_duration_us`
/// (default 100 000 µs)").
pub const DEFAULT_RETRY_DURATION_US: u64 = 100_000;

/// The interrupter must be polled "at a granularity finer than 100 ms"
/// (spec §5) during the `AGAIN` backoff sleep.
const RETRY_POLL_GRANULARITY: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum GraphError {
    #[error("unknown component class {plugin:?}.{class:?} for instance {instance:?}")]
    UnknownClass {
        plugin: SmolStr,
        class: SmolStr,
        instance: SmolStr,
    },
    #[error("duplicate instance name {0:?}")]
    DuplicateInstanceName(SmolStr),
    #[error("output port {port:?} of {component:?} has no unconnected downstream input port on {downstream:?} matching {glob:?}")]
    NoMatchingInputPort {
        component: SmolStr,
        port: SmolStr,
        downstream: SmolStr,
        glob: SmolStr,
    },
    #[error(transparent)]
    Validation(#[from] super::validator::ValidationError),
}

impl From<GraphError> for Error {
    fn from(err: GraphError) -> Self {
        Error::new(ErrorKind::Validation, "graph-scheduler", err.to_string())
    }
}

/// One requested component in a [`GraphConfig`] (spec §4.6 "Component
/// creation": "three ordered lists of `(class, instance-name, params)`").
pub struct ComponentRequest {
    pub plugin_name: SmolStr,
    pub class_name: SmolStr,
    pub instance_name: SmolStr,
    pub params: Value,
}

impl ComponentRequest {
    pub fn new(
        plugin_name: impl Into<SmolStr>,
        class_name: impl Into<SmolStr>,
        instance_name: impl Into<SmolStr>,
        params: Value,
    ) -> Self {
        ComponentRequest {
            plugin_name: plugin_name.into(),
            class_name: class_name.into(),
            instance_name: instance_name.into(),
            params,
        }
    }
}

/// A validated configuration ready to be turned into a running [`Graph`]
/// (spec §4.6 "Component creation").
pub struct GraphConfig {
    pub sources: Vec<ComponentRequest>,
    pub filters: Vec<ComponentRequest>,
    pub sinks: Vec<ComponentRequest>,
    pub connections: Vec<Connection>,
    pub retry_duration_us: u64,
}

impl GraphConfig {
    pub fn new() -> Self {
        GraphConfig {
            sources: Vec::new(),
            filters: Vec::new(),
            sinks: Vec::new(),
            connections: Vec::new(),
            retry_duration_us: DEFAULT_RETRY_DURATION_US,
        }
    }

    /// Run the validator (spec §4.4) against this configuration's component
    /// names and connections before any component is created.
    pub fn validate(&self) -> std::result::Result<(), super::validator::ValidationError> {
        let sources: Vec<SmolStr> = self.sources.iter().map(|r| r.instance_name.clone()).collect();
        let filters: Vec<SmolStr> = self.filters.iter().map(|r| r.instance_name.clone()).collect();
        let sinks: Vec<SmolStr> = self.sinks.iter().map(|r| r.instance_name.clone()).collect();
        let sets = super::validator::ComponentSets {
            sources: &sources,
            filters: &filters,
            sinks: &sinks,
        };
        super::validator::validate(&self.connections, &sets)
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The terminal or suspension status of one [`Graph::run`] call (spec
/// §4.6 "Execution loop").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Progress was made; the caller should call `run` again immediately.
    Ok,
    /// The graph is done.
    End,
    /// No component could progress; the caller should sleep for
    /// `retry_duration_us` then retry.
    Again,
}

/// One resolved link from an upstream `(component, port)` to a downstream
/// `(component, port)` (spec §3 "Connection", minus the glob — already
/// resolved to concrete port names).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PortKey {
    component: SmolStr,
    port: SmolStr,
}

struct ComponentSlot {
    instance: RefCell<ComponentInstance>,
    finished: Cell<bool>,
    /// Output port names this component has exposed so far, used to detect
    /// dynamically added ports (spec §4.6 "Dynamic ports").
    known_output_ports: RefCell<HashSet<SmolStr>>,
    /// Input ports already carrying a connection (spec §3: a port carries
    /// at most one connection at a time).
    connected_inputs: RefCell<HashSet<SmolStr>>,
}

/// The live, instantiated component graph (spec §2 layer 5, §4.6).
pub struct Graph {
    components: HashMap<SmolStr, ComponentSlot>,
    /// Creation order, so teardown can run in reverse (spec §3
    /// "Lifecycle").
    creation_order: Vec<SmolStr>,
    sink_order: Vec<SmolStr>,
    next_sink: Cell<usize>,
    /// Resolved upstream for each `(component, input port)` (spec §5
    /// "Shared resources": "a connection holds weak back-references to its
    /// two ports (resolvable by name, never by raw address)").
    links: RefCell<HashMap<PortKey, PortKey>>,
    connections: Vec<Connection>,
    interrupter: Interrupter,
    retry_duration_us: u64,
}

impl Graph {
    /// Instantiate every requested component and resolve the initial port
    /// connections (spec §4.6 "Component creation", "Port connection").
    ///
    /// Failure at any instantiation tears down all previously created
    /// instances in reverse order (spec §4.6).
    pub fn build(
        registry: &PluginRegistry,
        config: GraphConfig,
        interrupter: Interrupter,
    ) -> Result<Graph> {
        config.validate().map_err(GraphError::from)?;

        let mut components: HashMap<SmolStr, ComponentSlot> = HashMap::new();
        let mut creation_order: Vec<SmolStr> = Vec::new();
        let mut sink_order: Vec<SmolStr> = Vec::new();

        let all_requests = config
            .sources
            .iter()
            .map(|r| (r, ComponentKind::Source))
            .chain(config.filters.iter().map(|r| (r, ComponentKind::Filter)))
            .chain(config.sinks.iter().map(|r| (r, ComponentKind::Sink)));

        for (request, kind) in all_requests {
            if components.contains_key(&request.instance_name) {
                Self::teardown(&components, &creation_order);
                return Err(
                    GraphError::DuplicateInstanceName(request.instance_name.clone()).into(),
                );
            }
            let instance = match registry.with_class(
                &request.plugin_name,
                &request.class_name,
                |class| class.build(&request.instance_name, &request.params),
            ) {
                Ok(Ok(instance)) => instance,
                Ok(Err(err)) | Err(err) => {
                    Self::teardown(&components, &creation_order);
                    return Err(err);
                }
            };
            let slot = ComponentSlot {
                instance: RefCell::new(instance),
                finished: Cell::new(false),
                known_output_ports: RefCell::new(HashSet::new()),
                connected_inputs: RefCell::new(HashSet::new()),
            };
            creation_order.push(request.instance_name.clone());
            if kind == ComponentKind::Sink {
                sink_order.push(request.instance_name.clone());
            }
            components.insert(request.instance_name.clone(), slot);
        }

        let mut graph = Graph {
            components,
            creation_order,
            sink_order,
            next_sink: Cell::new(0),
            links: RefCell::new(HashMap::new()),
            connections: config.connections,
            interrupter,
            retry_duration_us: config.retry_duration_us,
        };

        if let Err(err) = graph.connect_new_ports() {
            graph.teardown_self();
            return Err(err);
        }

        Ok(graph)
    }

    fn teardown(components: &HashMap<SmolStr, ComponentSlot>, order: &[SmolStr]) {
        for name in order.iter().rev() {
            if let Some(slot) = components.get(name) {
                slot.instance.borrow_mut().finalize();
            }
        }
    }

    /// Destroy every component in reverse dependency (creation) order (spec
    /// §3 "Lifecycle": "destroyed in reverse dependency order when the
    /// graph tears down").
    pub fn teardown_self(&mut self) {
        Self::teardown(&self.components, &self.creation_order);
    }

    fn output_ports_of(&self, name: &str) -> Vec<Port> {
        self.components
            .get(name)
            .map(|s| s.instance.borrow().output_ports())
            .unwrap_or_default()
    }

    fn input_ports_of(&self, name: &str) -> Vec<Port> {
        self.components
            .get(name)
            .map(|s| s.instance.borrow().input_ports())
            .unwrap_or_default()
    }

    /// For every component's currently-known output ports, find ones not
    /// yet seen, and attempt to connect each of them (spec §4.6 "Port
    /// connection", "Dynamic ports": the scheduler "installs ... a
    /// port-added listener" and "attempts the same match-and-connect
    /// procedure"; here ports are polled rather than pushed, since our
    /// component traits expose the current port list rather than emitting
    /// discrete add events, but the observable behaviour is identical).
    fn connect_new_ports(&mut self) -> Result<()> {
        for name in self.creation_order.clone() {
            let ports = self.output_ports_of(&name);
            let new_ports: Vec<Port> = {
                let slot = &self.components[&name];
                let mut known = slot.known_output_ports.borrow_mut();
                let fresh: Vec<Port> = ports
                    .into_iter()
                    .filter(|p| !known.contains(&p.name))
                    .collect();
                for p in &fresh {
                    known.insert(p.name.clone());
                }
                fresh
            };
            for port in new_ports {
                self.connect_output_port(&name, &port.name)?;
            }
        }
        Ok(())
    }

    /// Connect one output port, if a validated connection claims it and a
    /// matching, unconnected downstream input port exists (spec §4.6 "Port
    /// connection").
    fn connect_output_port(&self, component: &str, port_name: &str) -> Result<()> {
        let Some(conn) = self
            .connections
            .iter()
            .find(|c| c.upstream == component && c.upstream_port_matches(port_name))
        else {
            // No connection claims this port; that's legal (e.g. spec §4.4
            // only requires component-level connectivity).
            return Ok(());
        };

        let downstream_ports = self.input_ports_of(&conn.downstream);
        let downstream_slot = self.components.get(conn.downstream.as_str());
        let target = downstream_ports.into_iter().find(|p| {
            conn.downstream_port_matches(&p.name)
                && downstream_slot
                    .map(|s| !s.connected_inputs.borrow().contains(&p.name))
                    .unwrap_or(false)
        });

        match target {
            Some(port) => {
                self.links.borrow_mut().insert(
                    PortKey {
                        component: conn.downstream.clone(),
                        port: port.name.clone(),
                    },
                    PortKey {
                        component: component.into(),
                        port: port_name.into(),
                    },
                );
                if let Some(slot) = downstream_slot {
                    slot.connected_inputs.borrow_mut().insert(port.name.clone());
                }
                Ok(())
            }
            None => Err(GraphError::NoMatchingInputPort {
                component: component.into(),
                port: port_name.into(),
                downstream: conn.downstream.clone(),
                glob: conn.downstream_glob.as_str().into(),
            }
            .into()),
        }
    }

    /// Run one round-robin pass over the sink set (spec §4.6 "Execution
    /// loop", "Within `run`, the scheduler polls sinks round-robin").
    pub fn run(&mut self) -> Result<RunStatus> {
        if self.interrupter.is_set() {
            return Err(Error::new(ErrorKind::Interrupted, "graph-scheduler", "interrupted"));
        }

        // New output ports may have appeared since the last pass (e.g. a
        // source discovering a new stream, spec §3 "Lifecycle").
        self.connect_new_ports()?;

        if self.sink_order.is_empty() {
            return Ok(RunStatus::End);
        }

        let n = self.sink_order.len();
        let mut made_progress = false;
        let mut all_finished = true;

        for i in 0..n {
            let idx = (self.next_sink.get() + i) % n;
            let name = self.sink_order[idx].clone();
            let slot = &self.components[&name];
            if slot.finished.get() {
                continue;
            }
            all_finished = false;

            if self.interrupter.is_set() {
                return Err(Error::new(ErrorKind::Interrupted, "graph-scheduler", "interrupted"));
            }

            let mut cursor = GraphCursor { graph: self, component: name.clone() };
            let result = {
                let mut instance = slot.instance.borrow_mut();
                match &mut *instance {
                    ComponentInstance::Sink(sink) => sink.consume(&mut cursor),
                    _ => unreachable!("sink_order only contains sink instances"),
                }
            };

            match result {
                Ok(ConsumeResult::Message(_)) => {
                    made_progress = true;
                    self.next_sink.set((idx + 1) % n);
                    break;
                }
                Ok(ConsumeResult::End) => {
                    slot.finished.set(true);
                    slot.instance.borrow_mut().finalize();
                    made_progress = true;
                }
                Ok(ConsumeResult::Again) => {}
                Err(err) => return Err(err),
            }
        }

        if all_finished {
            Ok(RunStatus::End)
        } else if made_progress {
            Ok(RunStatus::Ok)
        } else {
            Ok(RunStatus::Again)
        }
    }

    /// Drive the graph to completion (spec §4.6 "Execution loop"): call
    /// [`Graph::run`] until it returns `END`, interrupted, or an error,
    /// sleeping in short interrupter-aware slices on `AGAIN`.
    pub fn run_to_completion(&mut self) -> Result<()> {
        loop {
            match self.run()? {
                RunStatus::Ok => continue,
                RunStatus::End => return Ok(()),
                RunStatus::Again => {
                    if !self.sleep_retry() {
                        return Err(Error::new(
                            ErrorKind::Interrupted,
                            "graph-scheduler",
                            "interrupted while waiting to retry",
                        ));
                    }
                }
            }
        }
    }

    /// Sleep for `retry_duration_us`, polling the interrupter at
    /// [`RETRY_POLL_GRANULARITY`] (spec §5: "Sleep must be cancelable by an
    /// external interrupter ... at a granularity finer than 100 ms").
    /// Returns `false` if interrupted mid-sleep.
    fn sleep_retry(&self) -> bool {
        let mut remaining = Duration::from_micros(self.retry_duration_us);
        while remaining > Duration::ZERO {
            if self.interrupter.is_set() {
                return false;
            }
            let slice = remaining.min(RETRY_POLL_GRANULARITY);
            std::thread::sleep(slice);
            remaining -= slice;
        }
        !self.interrupter.is_set()
    }
}

/// [`Upstream`] implementation handed to a filter or sink's `consume`
/// method, scoped to one component's resolved input links (spec §4.6:
/// "sinks pull messages through their upstream chain").
struct GraphCursor<'g> {
    graph: &'g Graph,
    component: SmolStr,
}

impl Upstream for GraphCursor<'_> {
    fn pull(&mut self, input_port: &str) -> Result<ConsumeResult> {
        let key = PortKey {
            component: self.component.clone(),
            port: input_port.into(),
        };
        let Some(upstream) = self.graph.links.borrow().get(&key).cloned() else {
            return Err(Error::new(
                ErrorKind::Validation,
                "graph-scheduler",
                format!("input port {input_port:?} of {:?} has no upstream connection", self.component),
            ));
        };
        let slot = self.graph.components.get(upstream.component.as_str()).ok_or_else(|| {
            Error::new(
                ErrorKind::Validation,
                "graph-scheduler",
                format!("upstream component {:?} no longer exists", upstream.component),
            )
        })?;
        if slot.finished.get() {
            return Ok(ConsumeResult::End);
        }
        let mut instance = slot.instance.borrow_mut();
        match &mut *instance {
            ComponentInstance::Source(source) => source.next(&upstream.port),
            ComponentInstance::Filter(filter) => {
                let mut cursor = GraphCursor { graph: self.graph, component: upstream.component.clone() };
                filter.consume(&upstream.port, &mut cursor)
            }
            ComponentInstance::Sink(_) => Err(Error::new(
                ErrorKind::Validation,
                "graph-scheduler",
                "a sink cannot be an upstream",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Direction, Factory, FilterComponent, SourceComponent};
    use crate::connect::parse as parse_connection;

    struct CountingSource {
        remaining: u32,
        emitted: u32,
    }
    impl SourceComponent for CountingSource {
        fn output_ports(&self) -> Vec<Port> {
            vec![Port { name: "out".into(), direction: Direction::Output }]
        }
        fn next(&mut self, _output_port: &str) -> Result<ConsumeResult> {
            if self.remaining == 0 {
                return Ok(ConsumeResult::End);
            }
            self.remaining -= 1;
            self.emitted += 1;
            Ok(ConsumeResult::Message(crate::message::Message::Inactivity { clock: None }))
        }
    }

    struct CountingSink {
        count: std::rc::Rc<std::cell::Cell<u32>>,
    }
    impl crate::component::SinkComponent for CountingSink {
        fn input_ports(&self) -> Vec<Port> {
            vec![Port { name: "in".into(), direction: Direction::Input }]
        }
        fn consume(&mut self, upstream: &mut dyn Upstream) -> Result<ConsumeResult> {
            match upstream.pull("in")? {
                ConsumeResult::Message(m) => {
                    self.count.set(self.count.get() + 1);
                    Ok(ConsumeResult::Message(m))
                }
                other => Ok(other),
            }
        }
    }

    struct AgainForeverSource;
    impl SourceComponent for AgainForeverSource {
        fn output_ports(&self) -> Vec<Port> {
            vec![Port { name: "out".into(), direction: Direction::Output }]
        }
        fn next(&mut self, _output_port: &str) -> Result<ConsumeResult> {
            Ok(ConsumeResult::Again)
        }
    }

    struct AgainForeverSink;
    impl crate::component::SinkComponent for AgainForeverSink {
        fn input_ports(&self) -> Vec<Port> {
            vec![Port { name: "in".into(), direction: Direction::Input }]
        }
        fn consume(&mut self, upstream: &mut dyn Upstream) -> Result<ConsumeResult> {
            upstream.pull("in")
        }
    }

    struct LateBloomSource {
        bloomed: bool,
    }
    impl SourceComponent for LateBloomSource {
        fn output_ports(&self) -> Vec<Port> {
            let mut ports = vec![Port { name: "out".into(), direction: Direction::Output }];
            if self.bloomed {
                ports.push(Port { name: "late".into(), direction: Direction::Output });
            }
            ports
        }
        fn next(&mut self, output_port: &str) -> Result<ConsumeResult> {
            if output_port == "out" {
                self.bloomed = true;
                Ok(ConsumeResult::End)
            } else {
                Ok(ConsumeResult::End)
            }
        }
    }

    fn registry_with(classes: Vec<crate::component::ComponentClass>) -> PluginRegistry {
        let registry = PluginRegistry::new();
        let mut plugin = crate::registry::Plugin::new("test", "", "", "", "");
        for class in classes {
            plugin = plugin.with_class(class);
        }
        registry.register(plugin).unwrap();
        registry
    }

    #[test]
    fn source_to_sink_counts_every_event_then_ends() {
        use crate::component::ComponentKind;
        let registry = registry_with(vec![
            crate::component::ComponentClass::new(
                ComponentKind::Source,
                "test",
                "counting",
                "",
                "",
                Factory::Source(Box::new(|_n, _p| {
                    Ok(Box::new(CountingSource { remaining: 5, emitted: 0 }) as Box<dyn SourceComponent>)
                })),
            ),
            crate::component::ComponentClass::new(
                ComponentKind::Sink,
                "test",
                "counting",
                "",
                "",
                Factory::Sink(Box::new(|_n, _p| {
                    Ok(Box::new(CountingSink { count: Default::default() }) as Box<dyn crate::component::SinkComponent>)
                })),
            ),
        ]);

        let mut config = GraphConfig::new();
        config.sources.push(ComponentRequest::new("test", "counting", "S", Value::map()));
        config.sinks.push(ComponentRequest::new("test", "counting", "K", Value::map()));
        config.connections.push(parse_connection("S:K").unwrap());

        let mut graph = Graph::build(&registry, config, Interrupter::new()).unwrap();
        let mut events = 0;
        loop {
            match graph.run().unwrap() {
                RunStatus::Ok => events += 1,
                RunStatus::End => break,
                RunStatus::Again => panic!("should not need to retry in this test"),
            }
        }
        assert_eq!(events, 5);
    }

    #[test]
    fn interrupted_source_stops_the_retry_loop() {
        use crate::component::ComponentKind;
        let registry = registry_with(vec![
            crate::component::ComponentClass::new(
                ComponentKind::Source,
                "test",
                "again",
                "",
                "",
                Factory::Source(Box::new(|_n, _p| Ok(Box::new(AgainForeverSource) as Box<dyn SourceComponent>))),
            ),
            crate::component::ComponentClass::new(
                ComponentKind::Sink,
                "test",
                "again",
                "",
                "",
                Factory::Sink(Box::new(|_n, _p| Ok(Box::new(AgainForeverSink) as Box<dyn crate::component::SinkComponent>))),
            ),
        ]);

        let mut config = GraphConfig::new();
        config.sources.push(ComponentRequest::new("test", "again", "S", Value::map()));
        config.sinks.push(ComponentRequest::new("test", "again", "K", Value::map()));
        config.connections.push(parse_connection("S:K").unwrap());
        config.retry_duration_us = 1_000;

        let interrupter = Interrupter::new();
        let mut graph = Graph::build(&registry, config, interrupter.clone()).unwrap();
        assert_eq!(graph.run().unwrap(), RunStatus::Again);
        interrupter.set();
        assert!(graph.run_to_completion().is_err());
    }

    #[test]
    fn filter_chain_propagates_messages_to_sink() {
        struct PassThroughFilter;
        impl FilterComponent for PassThroughFilter {
            fn input_ports(&self) -> Vec<Port> {
                vec![Port { name: "in".into(), direction: Direction::Input }]
            }
            fn output_ports(&self) -> Vec<Port> {
                vec![Port { name: "out".into(), direction: Direction::Output }]
            }
            fn consume(&mut self, _output_port: &str, upstream: &mut dyn Upstream) -> Result<ConsumeResult> {
                upstream.pull("in")
            }
        }

        use crate::component::ComponentKind;
        let registry = registry_with(vec![
            crate::component::ComponentClass::new(
                ComponentKind::Source,
                "test",
                "counting",
                "",
                "",
                Factory::Source(Box::new(|_n, _p| {
                    Ok(Box::new(CountingSource { remaining: 3, emitted: 0 }) as Box<dyn SourceComponent>)
                })),
            ),
            crate::component::ComponentClass::new(
                ComponentKind::Filter,
                "test",
                "passthrough",
                "",
                "",
                Factory::Filter(Box::new(|_n, _p| Ok(Box::new(PassThroughFilter) as Box<dyn FilterComponent>))),
            ),
            crate::component::ComponentClass::new(
                ComponentKind::Sink,
                "test",
                "counting",
                "",
                "",
                Factory::Sink(Box::new(|_n, _p| {
                    Ok(Box::new(CountingSink { count: Default::default() }) as Box<dyn crate::component::SinkComponent>)
                })),
            ),
        ]);

        let mut config = GraphConfig::new();
        config.sources.push(ComponentRequest::new("test", "counting", "S", Value::map()));
        config.filters.push(ComponentRequest::new("test", "passthrough", "F", Value::map()));
        config.sinks.push(ComponentRequest::new("test", "counting", "K", Value::map()));
        config.connections.push(parse_connection("S:F").unwrap());
        config.connections.push(parse_connection("F:K").unwrap());

        let mut graph = Graph::build(&registry, config, Interrupter::new()).unwrap();
        let mut events = 0;
        loop {
            match graph.run().unwrap() {
                RunStatus::Ok => events += 1,
                RunStatus::End => break,
                RunStatus::Again => panic!("should not need to retry in this test"),
            }
        }
        assert_eq!(events, 3);
    }

    #[test]
    fn late_blooming_output_port_auto_connects() {
        // A source whose `output_ports()` grows after its first port is
        // pulled must have the new port noticed and matched against a
        // connection on the next `run` pass (spec §4.6 "Dynamic ports").
        struct EndingSink;
        impl crate::component::SinkComponent for EndingSink {
            fn input_ports(&self) -> Vec<Port> {
                vec![Port { name: "in".into(), direction: Direction::Input }]
            }
            fn consume(&mut self, upstream: &mut dyn Upstream) -> Result<ConsumeResult> {
                upstream.pull("in")
            }
        }

        use crate::component::ComponentKind;
        let registry = registry_with(vec![
            crate::component::ComponentClass::new(
                ComponentKind::Source,
                "test",
                "late",
                "",
                "",
                Factory::Source(Box::new(|_n, _p| {
                    Ok(Box::new(LateBloomSource { bloomed: false }) as Box<dyn SourceComponent>)
                })),
            ),
            crate::component::ComponentClass::new(
                ComponentKind::Sink,
                "test",
                "ending",
                "",
                "",
                Factory::Sink(Box::new(|_n, _p| Ok(Box::new(EndingSink) as Box<dyn crate::component::SinkComponent>))),
            ),
        ]);

        let mut config = GraphConfig::new();
        config.sources.push(ComponentRequest::new("test", "late", "S", Value::map()));
        config.sinks.push(ComponentRequest::new("test", "ending", "K1", Value::map()));
        config.sinks.push(ComponentRequest::new("test", "ending", "K2", Value::map()));
        config.connections.push(parse_connection("S.out:K1").unwrap());
        config.connections.push(parse_connection("S.late:K2").unwrap());

        let mut graph = Graph::build(&registry, config, Interrupter::new()).unwrap();
        // Only `out` exists so far; `late` hasn't bloomed yet.
        assert_eq!(graph.links.borrow().len(), 1);

        assert_eq!(graph.run().unwrap(), RunStatus::Ok);
        assert!(graph.components.get("K1").unwrap().finished.get());
        assert!(!graph.components.get("K2").unwrap().finished.get());

        // The first pull of `out` bloomed `late`; it should now be linked.
        assert_eq!(graph.links.borrow().len(), 2);
        assert_eq!(graph.run().unwrap(), RunStatus::End);
        assert!(graph.components.get("K2").unwrap().finished.get());
    }
}
