//! Planning of transcranial electrical stimulation on tagged head meshes.

pub mod config;
pub mod error;
pub mod external;
pub mod io;
pub mod math;
pub mod mesh;
pub mod operations;
pub mod pipeline;
pub mod placement;
pub mod solver;

pub use error::{PlannerError, Result};
