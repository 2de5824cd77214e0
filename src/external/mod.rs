//! Collaborators the pipeline delegates to.
//!
//! Refinement, electrode mounting, extrusion, surface booleans, volume
//! meshing and the FEM solve are performed by external tools. The pipeline
//! only sees these traits; [`CommandBackend`] implements all of them by
//! running configured programs, tests use in-process mocks.

mod command;

pub use command::CommandBackend;

use crate::error::Result;
use crate::mesh::TaggedMesh;
use crate::placement::{ElectrodeSpec, Extrusion, OutlineSource};
use crate::solver::{PotentialField, SolverRequest};

/// Refines a tagged mesh, keeping its tags.
pub trait MeshRefiner {
    /// # Errors
    ///
    /// Returns an error if the refinement fails.
    fn refine(&self, mesh: &TaggedMesh) -> Result<TaggedMesh>;
}

/// Electrodes to mount onto a head mesh.
#[derive(Debug, Clone, Copy)]
pub struct MountRequest<'a> {
    pub mesh: &'a TaggedMesh,
    pub electrodes: &'a [ElectrodeSpec],
}

/// Head mesh with the electrodes mounted on its surface.
#[derive(Debug, Clone)]
pub struct MountedElectrodes {
    pub mesh: TaggedMesh,
    /// Contact surface tag of each mounted electrode, in request order.
    pub contact_surfaces: Vec<i32>,
}

/// Places electrode volumes on a head surface.
///
/// Electrode `c` comes back with volume tag `500 + c`, surface tag
/// `1500 + c` and contact tag `2100 + c`.
pub trait ElectrodeMounter {
    /// # Errors
    ///
    /// Returns an error if an electrode cannot be placed.
    fn mount(&self, request: &MountRequest<'_>) -> Result<MountedElectrodes>;
}

/// One surface to extrude into a closed volume.
#[derive(Debug, Clone, Copy)]
pub struct ExtrudeRequest<'a> {
    pub surface: &'a TaggedMesh,
    pub extrusion: Extrusion,
    pub volume_tag: i32,
}

/// Sweeps a surface along a vector into a layered volume.
pub trait SurfaceExtruder {
    /// Returns the extruded mesh; its tetrahedra carry `volume_tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if the extrusion fails.
    fn extrude(&self, request: &ExtrudeRequest<'_>) -> Result<TaggedMesh>;
}

/// Boolean operations on closed triangle surfaces.
pub trait BooleanEngine {
    /// Surface of `solid` minus `tool`, repaired to a closed manifold.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation or the repair fails.
    fn subtract(&self, solid: &TaggedMesh, tool: &TaggedMesh) -> Result<TaggedMesh>;
}

/// A closed surface to fill with tetrahedra.
#[derive(Debug, Clone, Copy)]
pub struct VolumeMeshRequest<'a> {
    pub surface: &'a TaggedMesh,
    pub surface_tag: i32,
    pub volume_tag: i32,
    /// Target element size.
    pub size: f64,
}

/// Tetrahedralises closed surfaces.
pub trait VolumeMesher {
    /// Returns the boundary triangles tagged `surface_tag` followed by the
    /// tetrahedra tagged `volume_tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface cannot be meshed.
    fn mesh_volume(&self, request: &VolumeMeshRequest<'_>) -> Result<TaggedMesh>;
}

/// Finite element solver for the electric potential.
pub trait FemSolver {
    /// # Errors
    ///
    /// Returns an error if the solve fails or yields no potential.
    fn solve(&self, request: &SolverRequest) -> Result<PotentialField>;
}

/// The set of collaborators one pipeline run uses.
#[derive(Clone, Copy)]
pub struct Toolchain<'a> {
    pub refiner: &'a dyn MeshRefiner,
    pub mounter: &'a dyn ElectrodeMounter,
    pub extruder: &'a dyn SurfaceExtruder,
    pub booleans: &'a dyn BooleanEngine,
    pub mesher: &'a dyn VolumeMesher,
    pub solver: &'a dyn FemSolver,
    pub outline: &'a dyn OutlineSource,
}

impl<'a> Toolchain<'a> {
    /// Every collaborator served by one backend.
    #[must_use]
    pub fn uniform<T>(backend: &'a T, outline: &'a dyn OutlineSource) -> Self
    where
        T: MeshRefiner + ElectrodeMounter + SurfaceExtruder + BooleanEngine + VolumeMesher + FemSolver,
    {
        Self {
            refiner: backend,
            mounter: backend,
            extruder: backend,
            booleans: backend,
            mesher: backend,
            solver: backend,
            outline,
        }
    }
}
