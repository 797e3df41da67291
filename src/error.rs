//! A cause-chain error type shared across every layer of the core.
//!
//! Every subsystem (value tree, parameter parser, connection parser/validator,
//! CTF decoder, scheduler) defines its own `thiserror` leaf error enum. When a
//! layer reports failure up to its caller, it appends one [`Frame`] describing
//! itself; frames are never mutated once appended, only printed at the process
//! boundary.

use std::fmt::{self, Display, Formatter};

/// One layer's contribution to an error's cause chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Name of the layer that produced this frame (e.g. `"ctf-decoder"`, `"graph-validator"`).
    pub layer: &'static str,
    /// Human-readable description of what went wrong at this layer.
    pub message: String,
    /// Source location, if the layer can identify one (byte offset, line, packet index, ...).
    pub location: Option<String>,
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.layer, self.message)?;
        if let Some(loc) = &self.location {
            write!(f, " (at {loc})")?;
        }
        Ok(())
    }
}

/// The kinds of failure the core can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    OutOfMemory,
    Parse,
    Validation,
    Decoder,
    Component,
    Interrupted,
    NotFound,
    Io,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OutOfMemory => "out of memory",
            Self::Parse => "parse error",
            Self::Validation => "validation error",
            Self::Decoder => "decoder error",
            Self::Component => "component error",
            Self::Interrupted => "interrupted",
            Self::NotFound => "not found",
            Self::Io => "I/O error",
        };
        f.write_str(s)
    }
}

/// A core error: a [`ErrorKind`] plus an ordered chain of [`Frame`]s, innermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    frames: Vec<Frame>,
}

impl Error {
    pub fn new(kind: ErrorKind, layer: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            frames: vec![Frame {
                layer,
                message: message.into(),
                location: None,
            }],
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        if let Some(frame) = self.frames.last_mut() {
            frame.location = Some(location.into());
        }
        self
    }

    /// Append a frame from an outer layer that is propagating this error.
    #[must_use]
    pub fn layer(mut self, layer: &'static str, message: impl Into<String>) -> Self {
        self.frames.push(Frame {
            layer,
            message: message.into(),
            location: None,
        });
        self
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for frame in self.frames.iter().rev() {
            write!(f, "\n  caused by {frame}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, "io", err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
