use std::{fmt, io};

use serde_derive::Serialize;
use thiserror::Error;

/// Errors raised while decoding, packing or writing Cobra files.
#[derive(Error, Debug)]
pub enum Error {
    /// The stream ended before a complete value could be read
    #[error("Unexpected end of input at offset {offset:#x}")]
    TruncatedInput { offset: u64 },

    /// A header field, count or cross-reference is out of range
    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    /// A model slated for writing has no geometry
    #[error("Model {index} has no vertices or triangles; refusing to write")]
    IncompleteModel { index: usize },

    #[error("Mesh '{mesh}' has {} unweighted vertices: {vertices:?}", vertices.len())]
    UnweightedVertex { mesh: String, vertices: Vec<usize> },

    #[error("Mesh '{mesh}' needs more than {limit} vertices; reduce UV seams and try again")]
    VertexBudgetExceeded { mesh: String, limit: usize },

    /// Missing geometry, wrong layer counts, or a face that is not a triangle
    #[error("Mesh '{mesh}': {reason}")]
    StructuralMesh { mesh: String, reason: String },

    #[error("Write of {requested} bytes exceeds buffer capacity of {capacity} bytes")]
    CapacityExceeded { capacity: usize, requested: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedContainer(message.into())
    }

    pub(crate) fn structural(mesh: &str, reason: impl Into<String>) -> Self {
        Self::StructuralMesh { mesh: mesh.to_string(), reason: reason.into() }
    }
}

impl From<binrw::Error> for Error {
    fn from(err: binrw::Error) -> Self {
        if err.is_eof() {
            return Self::TruncatedInput { offset: error_position(&err) };
        }
        match err {
            binrw::Error::Io(e) => Self::Io(e),
            binrw::Error::BadMagic { pos, .. } => {
                Self::MalformedContainer(format!("Bad magic at offset {pos:#x}"))
            }
            e => Self::MalformedContainer(e.to_string()),
        }
    }
}

fn error_position(err: &binrw::Error) -> u64 {
    match err {
        binrw::Error::BadMagic { pos, .. }
        | binrw::Error::AssertFail { pos, .. }
        | binrw::Error::Custom { pos, .. }
        | binrw::Error::NoVariantMatch { pos }
        | binrw::Error::EnumErrors { pos, .. } => *pos,
        binrw::Error::Backtrace(bt) => error_position(&bt.error),
        _ => 0,
    }
}

/// A vertex group that could not be resolved to a bone. Reported, never fatal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MappingWarning {
    pub mesh: String,
    pub vertex: usize,
    pub group: String,
}

impl fmt::Display for MappingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Mesh '{}': vertex {} has group '{}' with no matching bone",
            self.mesh, self.vertex, self.group
        )
    }
}
