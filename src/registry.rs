//! The plugin ABI surface (spec §6) and the process-wide registry of loaded
//! component classes.
//!
//! In the spirit of the teacher's `registry.rs` *concept* — a name-keyed
//! table of constructors looked up by string — but without its
//! `erased_serde`/thread-local machinery, which solves a different problem
//! (tagged deserialization of arbitrary nested config) this crate doesn't
//! have. spec §6 says "the core treats the ABI as opaque and never relies
//! on a specific language or calling convention"; in a single-process Rust
//! rewrite that collapses to a `HashMap` of boxed factories, frozen after
//! startup (spec §5: "The loaded-plugin registry is process-wide and
//! effectively read-only after initialisation").

use crate::component::ComponentClass;
use crate::error::{Error, ErrorKind, Result};
use smol_str::SmolStr;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::OnceLock;

/// A loadable unit exposing component classes (spec §6: "A plugin is a
/// loadable unit exposing: name, description, author, license, version, and
/// an iterable set of component classes").
pub struct Plugin {
    pub name: SmolStr,
    pub description: &'static str,
    pub author: &'static str,
    pub license: &'static str,
    pub version: &'static str,
    classes: Vec<ComponentClass>,
}

impl Plugin {
    pub fn new(
        name: impl Into<SmolStr>,
        description: &'static str,
        author: &'static str,
        license: &'static str,
        version: &'static str,
    ) -> Self {
        Plugin {
            name: name.into(),
            description,
            author,
            license,
            version,
            classes: Vec::new(),
        }
    }

    pub fn with_class(mut self, class: ComponentClass) -> Self {
        self.classes.push(class);
        self
    }

    pub fn classes(&self) -> &[ComponentClass] {
        &self.classes
    }
}

/// The process-wide table of loaded plugins, keyed by plugin name and then
/// class name (spec §6). This crate has no dynamic loader (spec §1: plugin
/// discovery/filesystem lookup is an external collaborator); callers
/// register [`Plugin`]s directly, typically once at process startup.
///
/// The table lives behind a `RefCell` rather than requiring `&mut self` for
/// registration, so it can sit inside a `OnceLock` and be reached through a
/// shared `&'static` reference once installed (spec §9: "the process-wide
/// plugin registry ... loaded once at startup, frozen, and exposed as
/// read-only views").
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RefCell<HashMap<SmolStr, Plugin>>,
    frozen: Cell<bool>,
}

/// All registration happens from a single thread before [`install_global`]
/// publishes the registry; every access after that is a shared, read-only
/// lookup. The `RefCell` is never borrowed mutably once `freeze` has run.
unsafe impl Sync for PluginRegistry {}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. Returns an error if the registry has already been
    /// [`frozen`](Self::freeze) or a plugin of that name is already present.
    pub fn register(&self, plugin: Plugin) -> Result<()> {
        if self.frozen.get() {
            return Err(Error::new(
                ErrorKind::Validation,
                "plugin-registry",
                "cannot register a plugin after the registry is frozen",
            ));
        }
        let mut plugins = self.plugins.borrow_mut();
        if plugins.contains_key(&plugin.name) {
            return Err(Error::new(
                ErrorKind::Validation,
                "plugin-registry",
                format!("plugin {:?} is already registered", plugin.name),
            ));
        }
        plugins.insert(plugin.name.clone(), plugin);
        Ok(())
    }

    /// Mark the registry read-only (spec §5). No-op if already frozen.
    pub fn freeze(&self) {
        self.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    pub fn plugin_names(&self) -> Vec<SmolStr> {
        self.plugins.borrow().keys().cloned().collect()
    }

    /// List the class names exposed by one plugin (used by [`crate::autodisc`]
    /// to enumerate source classes to query).
    pub fn class_names(&self, plugin_name: &str) -> Result<Vec<SmolStr>> {
        let plugins = self.plugins.borrow();
        let plugin = plugins.get(plugin_name).ok_or_else(|| {
            Error::new(
                ErrorKind::NotFound,
                "plugin-registry",
                format!("no such plugin {plugin_name:?}"),
            )
        })?;
        Ok(plugin.classes.iter().map(|c| c.class_name.clone()).collect())
    }

    /// Look up a component class by `(plugin name, class name)` (spec §3's
    /// `(kind, plugin name, class name)` triple, minus the kind, which the
    /// class itself carries), applying `f` to it under the borrow.
    pub fn with_class<R>(
        &self,
        plugin_name: &str,
        class_name: &str,
        f: impl FnOnce(&ComponentClass) -> R,
    ) -> Result<R> {
        let plugins = self.plugins.borrow();
        let plugin = plugins.get(plugin_name).ok_or_else(|| {
            Error::new(
                ErrorKind::NotFound,
                "plugin-registry",
                format!("no such plugin {plugin_name:?}"),
            )
        })?;
        let class = plugin
            .classes
            .iter()
            .find(|c| c.class_name == class_name)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::NotFound,
                    "plugin-registry",
                    format!("plugin {plugin_name:?} has no class {class_name:?}"),
                )
            })?;
        Ok(f(class))
    }
}

static GLOBAL: OnceLock<PluginRegistry> = OnceLock::new();

/// Install the process-wide registry, consuming and freezing it. Panics if
/// called more than once — the registry is meant to be assembled once at
/// startup by the `bt2` binary (or equivalent embedder) before any graph is
/// built (spec §5: "loaded once at startup, frozen").
pub fn install_global(registry: PluginRegistry) {
    registry.freeze();
    GLOBAL
        .set(registry)
        .unwrap_or_else(|_| panic!("PluginRegistry::install_global called more than once"));
}

/// Borrow the process-wide registry installed by [`install_global`]. Panics
/// if none has been installed yet.
pub fn global() -> &'static PluginRegistry {
    GLOBAL.get().expect("PluginRegistry::install_global was never called")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentKind, Factory, SinkComponent, Upstream};
    use crate::error::Result as CoreResult;
    use crate::component::ConsumeResult;
    use crate::value::Value;

    struct NullSink;
    impl SinkComponent for NullSink {
        fn input_ports(&self) -> Vec<crate::component::Port> {
            vec![]
        }
        fn consume(&mut self, _upstream: &mut dyn Upstream) -> CoreResult<ConsumeResult> {
            Ok(ConsumeResult::End)
        }
    }

    fn make_plugin() -> Plugin {
        Plugin::new("test", "test plugin", "nobody", "MIT", "0.1").with_class(ComponentClass::new(
            ComponentKind::Sink,
            "test",
            "null",
            "discards everything",
            "",
            Factory::Sink(Box::new(|_name, _params: &Value| Ok(Box::new(NullSink)))),
        ))
    }

    #[test]
    fn register_then_lookup() {
        let registry = PluginRegistry::new();
        registry.register(make_plugin()).unwrap();
        registry
            .with_class("test", "null", |class| assert_eq!(class.kind, ComponentKind::Sink))
            .unwrap();
    }

    #[test]
    fn duplicate_plugin_rejected() {
        let registry = PluginRegistry::new();
        registry.register(make_plugin()).unwrap();
        assert!(registry.register(make_plugin()).is_err());
    }

    #[test]
    fn frozen_registry_rejects_registration() {
        let registry = PluginRegistry::new();
        registry.freeze();
        assert!(registry.register(make_plugin()).is_err());
    }

    #[test]
    fn unknown_class_not_found() {
        let registry = PluginRegistry::new();
        registry.register(make_plugin()).unwrap();
        assert!(registry.with_class("test", "missing", |_| ()).is_err());
        assert!(registry.with_class("missing", "null", |_| ()).is_err());
    }
}
