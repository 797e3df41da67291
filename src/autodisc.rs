//! Source auto-discovery (spec §4.7, an optional front-end helper).
//!
//! Given textual inputs (paths, URLs, whatever a user passed on the command
//! line) and the set of loaded source plugins, queries each source class
//! with the well-known `babeltrace.support-info` query object and the
//! candidate value, collects a weight in `[0.0, 1.0]` and an optional group
//! key, and groups inputs by winning class and group. Grounded in
//! original_source's `src/autodisc/autodisc.c`; the filesystem fallback
//! walk uses `std::fs::read_dir` the same way, logging permission errors
//! with `tracing::warn!` rather than treating them as fatal (spec §4.7:
//! "Directory read errors due to permissions are logged and skipped, not
//! fatal").

use crate::component::ComponentKind;
use crate::error::{Error, ErrorKind, Result};
use crate::registry::PluginRegistry;
use crate::value::Value;
use smol_str::SmolStr;
use std::path::{Path, PathBuf};

/// The well-known query object name every source class may answer (spec
/// §4.7).
pub const SUPPORT_INFO_QUERY_OBJECT: &str = "babeltrace.support-info";

/// One source class's verdict on a candidate input.
#[derive(Debug, Clone)]
pub struct SupportInfo {
    pub plugin_name: SmolStr,
    pub class_name: SmolStr,
    pub weight: f64,
    pub group: Option<SmolStr>,
}

/// One input, grouped under the source class that claimed it (and,
/// optionally, the group key that class reported).
#[derive(Debug, Clone)]
pub struct DiscoveredGroup {
    pub plugin_name: SmolStr,
    pub class_name: SmolStr,
    pub group: Option<SmolStr>,
    pub inputs: Vec<String>,
}

fn query_support_info(registry: &PluginRegistry, candidate: &str) -> Vec<SupportInfo> {
    let mut out = Vec::new();
    for plugin_name in registry.plugin_names() {
        let Ok(class_names) = registry.class_names(&plugin_name) else {
            continue;
        };
        for class_name in class_names {
            let is_source = registry
                .with_class(&plugin_name, &class_name, |class| class.kind == ComponentKind::Source)
                .unwrap_or(false);
            if !is_source {
                continue;
            }
            let params = Value::string(candidate);
            let verdict = registry
                .with_class(&plugin_name, &class_name, |class| {
                    class.query(SUPPORT_INFO_QUERY_OBJECT, &params)
                })
                .and_then(|r| r);
            if let Ok(value) = verdict {
                let weight = value.map_get("weight").and_then(|v| v.as_float()).unwrap_or(0.0);
                if weight > 0.0 {
                    let group = value.map_get("group").and_then(|v| v.as_str().map(SmolStr::from));
                    out.push(SupportInfo {
                        plugin_name: plugin_name.clone(),
                        class_name,
                        weight,
                        group,
                    });
                }
            }
        }
    }
    out
}

fn best(mut verdicts: Vec<SupportInfo>) -> Option<SupportInfo> {
    verdicts.sort_by(|a, b| a.weight.partial_cmp(&b.weight).unwrap_or(std::cmp::Ordering::Equal));
    verdicts.pop()
}

/// Group `inputs` by the winning source class (spec §4.7). Strings are
/// tried first; any string no source claims is retried as a filesystem
/// path — a directory is offered to sources whole, and if still unclaimed,
/// its entries are recursed into.
pub fn discover(registry: &PluginRegistry, inputs: &[String]) -> Result<Vec<DiscoveredGroup>> {
    let mut groups: Vec<DiscoveredGroup> = Vec::new();
    for input in inputs {
        discover_one(registry, input, &mut groups)?;
    }
    Ok(groups)
}

fn push_winner(groups: &mut Vec<DiscoveredGroup>, winner: SupportInfo, input: String) {
    if let Some(existing) = groups.iter_mut().find(|g| {
        g.plugin_name == winner.plugin_name && g.class_name == winner.class_name && g.group == winner.group
    }) {
        existing.inputs.push(input);
    } else {
        groups.push(DiscoveredGroup {
            plugin_name: winner.plugin_name,
            class_name: winner.class_name,
            group: winner.group,
            inputs: vec![input],
        });
    }
}

fn discover_one(registry: &PluginRegistry, input: &str, groups: &mut Vec<DiscoveredGroup>) -> Result<()> {
    let verdicts = query_support_info(registry, input);
    if let Some(winner) = best(verdicts) {
        push_winner(groups, winner, input.to_string());
        return Ok(());
    }

    // No source claimed the string as-is; retry as a filesystem path.
    let path = Path::new(input);
    if path.is_dir() {
        let dir_verdicts = query_support_info(registry, input);
        if let Some(winner) = best(dir_verdicts) {
            push_winner(groups, winner, input.to_string());
            return Ok(());
        }
        recurse_into_directory(registry, path, groups);
        Ok(())
    } else if path.exists() {
        // A plain file that no source claimed; nothing more to try.
        Ok(())
    } else {
        Err(Error::new(
            ErrorKind::NotFound,
            "autodisc",
            format!("no source plugin claims {input:?}, and it is not a filesystem path"),
        ))
    }
}

fn recurse_into_directory(registry: &PluginRegistry, dir: &Path, groups: &mut Vec<DiscoveredGroup>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "could not read directory during source auto-discovery");
            return;
        }
    };
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "could not read a directory entry during source auto-discovery");
                continue;
            }
        };
        let path: PathBuf = entry.path();
        let Some(path_str) = path.to_str() else {
            tracing::warn!(path = %path.display(), "skipping non-UTF-8 path during source auto-discovery");
            continue;
        };
        if let Err(err) = discover_one(registry, path_str, groups) {
            tracing::debug!(path = %path_str, error = %err, "no source claimed directory entry");
        }
    }
}
