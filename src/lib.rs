//! A single-process, single-threaded trace-conversion and -processing core.
//!
//! Plugins expose component classes through [`registry`]; a user-facing
//! front end (see `src/bin/bt2.rs`) parses `--component`/`--connect`
//! arguments with [`connect`], validates the resulting wiring with
//! [`graph::validator`], and drives it to completion with
//! [`graph::scheduler`]. [`value`] is the dynamically-typed tree config and
//! query parameters are built from; [`ini`] turns the CLI's flat
//! `key=value` parameter syntax into one. [`ctf`] decodes CTF/TSDL trace
//! metadata into a [`ctf::trace_class::TraceClass`] that source components
//! can use to interpret raw event streams. [`autodisc`] is the optional
//! source-auto-discovery helper built on top of the registry.

pub mod autodisc;
pub mod component;
pub mod connect;
pub mod ctf;
pub mod error;
pub mod glob;
pub mod graph;
pub mod ini;
pub mod message;
pub mod registry;
pub mod value;
