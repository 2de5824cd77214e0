use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the planning pipeline.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    MeshIo(#[from] MeshIoError),

    #[error(transparent)]
    External(#[from] ExternalToolError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Violations of the tagged-mesh invariants.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("retag {old} -> {new}: {before} nodes carried tag {old}, {after} nodes carry tag {new}")]
    RetagMismatch {
        old: i32,
        new: i32,
        before: usize,
        after: usize,
    },

    #[error("tag {tag} still present on {count} elements")]
    TagRetained { tag: i32, count: usize },

    #[error("element {element} references node {node}, but the mesh has {node_count} nodes")]
    DanglingNode {
        element: usize,
        node: usize,
        node_count: usize,
    },

    #[error("no elements carry any of the tags {0:?}")]
    EmptySelection(Vec<i32>),
}

/// Errors related to geometric computations.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("zero-length vector")]
    ZeroVector,

    #[error("orientation {orientation:?} is parallel to the surface normal {normal:?}")]
    ParallelOrientation {
        orientation: [f64; 3],
        normal: [f64; 3],
    },

    #[error("degenerate footprint: only {hull_points} hull points left for diagonal {diagonal}")]
    DegenerateFootprint { hull_points: usize, diagonal: usize },

    #[error("degenerate geometry: {0}")]
    Degenerate(String),
}

/// Errors reading or writing mesh files.
#[derive(Debug, Error)]
pub enum MeshIoError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("invalid content at line {line}: {message}")]
    InvalidContent { line: usize, message: String },

    #[error("unsupported format: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MeshIoError {
    /// Creates an `InvalidContent` error for the given (1-based) line.
    #[must_use]
    pub fn invalid(line: usize, message: impl Into<String>) -> Self {
        Self::InvalidContent {
            line,
            message: message.into(),
        }
    }
}

/// Failures of external meshing, boolean, placement and solver tools.
#[derive(Debug, Error)]
pub enum ExternalToolError {
    #[error("no command configured for tool `{0}`")]
    NotConfigured(&'static str),

    #[error("failed to launch `{program}` for {tool}: {source}")]
    Launch {
        tool: &'static str,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: &'static str,
        status: String,
        stderr: String,
    },

    #[error("{tool} did not produce {path}")]
    MissingOutput { tool: &'static str, path: PathBuf },

    #[error("{tool} returned an unusable result: {message}")]
    InvalidOutput { tool: &'static str, message: String },
}

/// Solver input-contract violations.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("{currents} currents given for {electrodes} electrode surfaces")]
    CurrentCountMismatch { currents: usize, electrodes: usize },

    #[error("currents must sum to zero, got {sum:e}")]
    CurrentSumNonZero { sum: f64 },

    #[error("no conductivity assigned to volume tag {0}")]
    MissingConductivity(i32),

    #[error("potential field has {got} values for {expected} nodes")]
    FieldSize { expected: usize, got: usize },
}

/// Errors loading or validating the simulation configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Convenience type alias for results using [`PlannerError`].
pub type Result<T> = std::result::Result<T, PlannerError>;

impl PlannerError {
    /// Wraps a filesystem error with the path it occurred on.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
