//! The planning run.
//!
//! A run walks through the [`Stage`]s in a fixed order. Data only flows
//! forward; every stage gets the products of the earlier ones and hands its
//! own to the next. External work goes through the [`Toolchain`].

mod report;
mod workspace;

pub use report::{param_info, write_param_info, ElectrodeStatus, RunStatus, PARAM_INFO};
pub use workspace::{
    is_final_output, is_prepared_mesh, locate_head_mesh, Workspace, EDITED_MESH, PREPARED_MESHES, RESULT_MARKER,
};

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, error, info, info_span, warn};

use crate::config::SimulationConfig;
use crate::error::{ExternalToolError, MeshError, Result};
use crate::external::{ExtrudeRequest, MountRequest, Toolchain, VolumeMeshRequest};
use crate::io::{read_msh, write_msh, write_msh_with_potential};
use crate::math::{Point2, Point3, Vector3};
use crate::mesh::tags::{
    electrode_contact, electrode_surface, electrode_tags, electrode_volume, interface_pairs, Tissue,
    ELECTRODE_RUBBER, ISOLATION_CONTACT, ISOLATION_SURFACE, ISOLATION_VOLUME, SCRATCH_SURFACE,
};
use crate::mesh::TaggedMesh;
use crate::operations::{
    compact_bone_back, compact_bone_to_skin, peripheral_anchors, retag_all, swap_skin_and_bone, AlignInterface,
    JoinAndConnect, RemoveDisconnectedNodes,
};
use crate::placement::{
    anchor_layout, electrode_normal, final_layout, normalize_outline, ElectrodeFrame, Extrusion, LocateFrame,
};
use crate::solver::{ConductivityMap, SolverRequest};

/// Steps of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ExtractTissues,
    RefineSkull,
    LocatePeripheralAnchors,
    PlaceElectrodes,
    ExtrudeVolumes,
    SubtractIsolationFromSkin,
    SubtractElectrodesFromIsolation,
    AlignInterfaces,
    AssembleFinalVolume,
    RetagForSolver,
    InvokeSolver,
    Cleanup,
}

impl Stage {
    pub const ALL: [Stage; 12] = [
        Stage::ExtractTissues,
        Stage::RefineSkull,
        Stage::LocatePeripheralAnchors,
        Stage::PlaceElectrodes,
        Stage::ExtrudeVolumes,
        Stage::SubtractIsolationFromSkin,
        Stage::SubtractElectrodesFromIsolation,
        Stage::AlignInterfaces,
        Stage::AssembleFinalVolume,
        Stage::RetagForSolver,
        Stage::InvokeSolver,
        Stage::Cleanup,
    ];

    /// The stage that follows this one, `None` after [`Stage::Cleanup`].
    #[must_use]
    pub fn next(self) -> Option<Stage> {
        let i = Self::ALL.iter().position(|&s| s == self)?;
        Self::ALL.get(i + 1).copied()
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Stage::ExtractTissues => "extract_tissues",
            Stage::RefineSkull => "refine_skull",
            Stage::LocatePeripheralAnchors => "locate_peripheral_anchors",
            Stage::PlaceElectrodes => "place_electrodes",
            Stage::ExtrudeVolumes => "extrude_volumes",
            Stage::SubtractIsolationFromSkin => "subtract_isolation_from_skin",
            Stage::SubtractElectrodesFromIsolation => "subtract_electrodes_from_isolation",
            Stage::AlignInterfaces => "align_interfaces",
            Stage::AssembleFinalVolume => "assemble_final_volume",
            Stage::RetagForSolver => "retag_for_solver",
            Stage::InvokeSolver => "invoke_solver",
            Stage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_dir: PathBuf,
    pub edited_mesh: PathBuf,
    pub potential_mesh: PathBuf,
    pub completed: Vec<Stage>,
    /// Whether the refined skull came from the cache.
    pub refinement_cached: bool,
    pub peripheral_anchors: [Point3; 4],
    /// Shared node count per interface label.
    pub shared_nodes: Vec<(String, usize)>,
    pub potential_range: Option<(f64, f64)>,
}

/// Head split for editing.
struct Tissues {
    skin: TaggedMesh,
    /// Compact bone, carrying the skin tags.
    skull: TaggedMesh,
    rest: TaggedMesh,
}

struct Anchoring {
    frame: ElectrodeFrame,
    anchors: [Point3; 4],
    outline: Vec<Point2>,
    skull: TaggedMesh,
}

struct Placement {
    mounted: TaggedMesh,
    contact_surfaces: Vec<i32>,
    centres: Vec<Point3>,
}

struct Extruded {
    isolation: TaggedMesh,
    electrodes: TaggedMesh,
}

struct Parts {
    skull: TaggedMesh,
    isolation: TaggedMesh,
    electrodes: TaggedMesh,
    skin: TaggedMesh,
}

/// Records completed stages and wraps each one in a tracing span.
struct Progress {
    completed: Vec<Stage>,
}

impl Progress {
    fn stage<T>(&mut self, stage: Stage, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let expected = self.completed.last().map_or(Some(Stage::ALL[0]), |s| s.next());
        debug_assert_eq!(expected, Some(stage), "stages out of order");

        let span = info_span!("stage", name = stage.name());
        let _guard = span.enter();
        let start = Instant::now();
        info!("started");
        match f() {
            Ok(value) => {
                info!(elapsed_s = start.elapsed().as_secs_f64(), "finished");
                self.completed.push(stage);
                Ok(value)
            }
            Err(e) => {
                error!(error = %e, "failed");
                Err(e)
            }
        }
    }
}

/// One planning run over a head mesh.
pub struct Pipeline<'a> {
    config: &'a SimulationConfig,
    tools: Toolchain<'a>,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub fn new(config: &'a SimulationConfig, tools: Toolchain<'a>) -> Self {
        Self { config, tools }
    }

    /// Runs every stage.
    ///
    /// # Errors
    ///
    /// Returns the first error of any stage; the run directory is left as
    /// it was at that point.
    pub fn run(&self) -> Result<RunSummary> {
        let config = self.config;
        let started = Instant::now();
        let head_path = locate_head_mesh(&config.files)?;
        let ws = Workspace::create(&config.files.results_root())?;
        let mut progress = Progress { completed: Vec::new() };

        let tissues = progress.stage(Stage::ExtractTissues, || {
            let head = read_msh(&head_path)?;
            self.extract_tissues(&head)
        })?;
        let (skull, refinement_cached) =
            progress.stage(Stage::RefineSkull, || self.refine_skull(&ws, &tissues.skull))?;
        let anchoring = progress.stage(Stage::LocatePeripheralAnchors, || self.locate_anchors(skull))?;
        let anchors = anchoring.anchors;
        let placement = progress.stage(Stage::PlaceElectrodes, || self.place_electrodes(anchoring))?;
        let extruded = progress.stage(Stage::ExtrudeVolumes, || self.extrude_volumes(&placement))?;
        let skin = progress.stage(Stage::SubtractIsolationFromSkin, || {
            self.subtract_isolation_from_skin(&tissues.skin, &extruded.isolation)
        })?;
        let isolation = progress.stage(Stage::SubtractElectrodesFromIsolation, || {
            self.subtract_electrodes_from_isolation(&placement.mounted, &extruded.electrodes)
        })?;
        let parts = progress.stage(Stage::AlignInterfaces, || {
            let parts = self.align_interfaces(&tissues.rest, &placement.mounted, skin, isolation)?;
            self.write_prepared(&ws, &tissues.rest, &placement.mounted, &parts)?;
            ws.cleanup(is_prepared_mesh);
            Ok(parts)
        })?;
        let (mut stacked, shared_nodes) =
            progress.stage(Stage::AssembleFinalVolume, || Ok(self.assemble(&tissues.rest, parts)))?;
        progress.stage(Stage::RetagForSolver, || retag_for_solver(&mut stacked))?;
        let (edited_mesh, potential_mesh, potential_range) = progress.stage(Stage::InvokeSolver, || {
            self.invoke_solver(&ws, stacked, placement.contact_surfaces.clone())
        })?;
        progress.stage(Stage::Cleanup, || {
            let deleted = ws.cleanup(is_final_output);
            debug!(deleted, "removed intermediate files");
            write_param_info(config, &head_path, ws.run_dir())
        })?;

        info!(
            run_dir = %ws.run_dir().display(),
            elapsed_s = started.elapsed().as_secs_f64(),
            "run finished"
        );
        Ok(RunSummary {
            run_dir: ws.run_dir().to_path_buf(),
            edited_mesh,
            potential_mesh,
            completed: progress.completed,
            refinement_cached,
            peripheral_anchors: anchors,
            shared_nodes,
            potential_range,
        })
    }

    fn joiner(&self) -> JoinAndConnect {
        JoinAndConnect::new(self.config.meshing.join_epsilon)
    }

    fn electrode_count(&self) -> usize {
        self.config.electrodes.count()
    }

    fn extract_tissues(&self, head: &TaggedMesh) -> Result<Tissues> {
        let skin_tags = [Tissue::Skin.volume_tag(), Tissue::Skin.surface_tag()];
        let bone_tags = [Tissue::CompactBone.volume_tag(), Tissue::CompactBone.surface_tag()];

        let skin = head.crop(&skin_tags);
        if skin.tetrahedra().is_empty() {
            return Err(MeshError::EmptySelection(skin_tags.to_vec()).into());
        }
        let mut skull = head.crop(&bone_tags);
        if skull.tetrahedra().is_empty() {
            return Err(MeshError::EmptySelection(bone_tags.to_vec()).into());
        }
        let removed: Vec<i32> = skin_tags.iter().chain(&bone_tags).copied().collect();
        let rest = head.remove_tags(&removed)?;
        compact_bone_to_skin(&mut skull)?;

        info!(
            skin = skin.element_count(),
            skull = skull.element_count(),
            rest = rest.element_count(),
            "extracted tissues"
        );
        Ok(Tissues { skin, skull, rest })
    }

    fn refine_skull(&self, ws: &Workspace, skull: &TaggedMesh) -> Result<(TaggedMesh, bool)> {
        let cache = ws.refinement_cache(&self.config.files.mesh_name);
        if cache.is_file() {
            info!(path = %cache.display(), "reusing refined skull");
            return Ok((read_msh(&cache)?, true));
        }

        let mut refined = self.tools.refiner.refine(skull)?;
        let removed = RemoveDisconnectedNodes::new().execute(&mut refined);
        if removed > 0 {
            warn!(removed, "refinement left disconnected nodes");
        }
        write_msh(&cache, &refined)?;
        info!(
            nodes = refined.node_count(),
            elements = refined.element_count(),
            path = %cache.display(),
            "refined skull"
        );
        Ok((refined, false))
    }

    fn locate_anchors(&self, skull: TaggedMesh) -> Result<Anchoring> {
        let config = self.config;
        let electrodes = &config.electrodes;

        let surface = skull.crop(&[Tissue::Skin.surface_tag()]);
        let frame = LocateFrame::new(
            Point3::from(electrodes.pos_centre),
            Vector3::from(electrodes.orientation),
            electrodes.theta_deg,
        )
        .execute(&surface)?;
        debug!(centre = ?frame.centre, y_dir = ?frame.y_dir, z_dir = ?frame.z_dir, "pad frame");

        let outline = normalize_outline(
            &self.tools.outline.points()?,
            config.geometry.pad_half_extent(),
            config.files.outline_rotation_deg,
        )?;

        let probe = anchor_layout(&frame, &outline, &config.geometry);
        let mounted = self.tools.mounter.mount(&MountRequest {
            mesh: &skull,
            electrodes: &probe,
        })?;
        let contact_tag = mounted
            .contact_surfaces
            .first()
            .copied()
            .unwrap_or_else(|| electrode_contact(1));
        let contact = mounted.mesh.crop(&[contact_tag]);
        let anchors = peripheral_anchors(contact.nodes())?;
        info!(?anchors, "peripheral electrode centres");

        let skull = mounted.mesh.remove_tags(&electrode_tags(probe.len()))?;
        Ok(Anchoring {
            frame,
            anchors,
            outline,
            skull,
        })
    }

    fn place_electrodes(&self, anchoring: Anchoring) -> Result<Placement> {
        let config = self.config;
        let n = self.electrode_count();
        let specs = final_layout(
            &anchoring.frame,
            &anchoring.anchors,
            &anchoring.outline,
            &config.electrodes,
            &config.geometry,
        );
        let mounted = self.tools.mounter.mount(&MountRequest {
            mesh: &anchoring.skull,
            electrodes: &specs,
        })?;

        let contact_surfaces = mounted
            .contact_surfaces
            .get(..n)
            .ok_or_else(|| ExternalToolError::InvalidOutput {
                tool: "mount",
                message: format!("{} contact surfaces for {n} electrodes", mounted.contact_surfaces.len()),
            })?
            .to_vec();
        let centres = specs.iter().take(n).map(|s| s.centre).collect();
        info!(electrodes = n, ?contact_surfaces, "placed electrodes and isolation");
        Ok(Placement {
            mounted: mounted.mesh,
            contact_surfaces,
            centres,
        })
    }

    /// Extrudes `surface` and returns the volume part tagged `volume_tag`.
    fn extrude(&self, surface: &TaggedMesh, extrusion: Extrusion, volume_tag: i32) -> Result<TaggedMesh> {
        if surface.is_empty() {
            return Err(MeshError::EmptySelection(vec![volume_tag + 1000]).into());
        }
        let mut extruded = self.tools.extruder.extrude(&ExtrudeRequest {
            surface,
            extrusion,
            volume_tag,
        })?;
        extruded.copy_tag1_to_tag2();
        let volume = extruded.crop(&[volume_tag]);
        if volume.tetrahedra().is_empty() {
            return Err(ExternalToolError::InvalidOutput {
                tool: "extrude",
                message: format!("no tetrahedra tagged {volume_tag}"),
            }
            .into());
        }
        Ok(volume)
    }

    fn extrude_volumes(&self, placement: &Placement) -> Result<Extruded> {
        let meshing = &self.config.meshing;
        let length = self.config.geometry.h_silicon + meshing.extrusion_extra;

        let extrusions = placement
            .centres
            .iter()
            .enumerate()
            .map(|(i, centre)| {
                let normal = electrode_normal(&placement.mounted, i + 1, centre)?;
                Extrusion::along(&normal, length, meshing.layers_per_unit)
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(?extrusions, "extrusion vectors");
        let Some(&pad_extrusion) = extrusions.first() else {
            return Err(MeshError::EmptySelection(electrode_tags(1)).into());
        };

        let pad_top = placement.mounted.crop(&[ISOLATION_SURFACE]);
        let isolation = self
            .extrude(&pad_top, pad_extrusion, ISOLATION_VOLUME)?
            .outer_surface(SCRATCH_SURFACE);
        info!(triangles = isolation.element_count(), "extruded isolation");

        let joiner = self.joiner();
        let mut electrodes = TaggedMesh::default();
        for (i, extrusion) in extrusions.iter().enumerate() {
            let channel = i + 1;
            let top = placement.mounted.crop(&[electrode_surface(channel)]);
            let surface = self
                .extrude(&top, *extrusion, electrode_volume(channel))?
                .outer_surface(electrode_surface(channel));
            electrodes = joiner.execute(&electrodes, &surface);
            debug!(channel, "extruded electrode");
        }
        Ok(Extruded { isolation, electrodes })
    }

    /// Meshes a closed surface and returns the tetrahedra tagged `volume_tag`.
    fn mesh_volume(&self, surface: &TaggedMesh, surface_tag: i32, volume_tag: i32) -> Result<TaggedMesh> {
        let mut meshed = self.tools.mesher.mesh_volume(&VolumeMeshRequest {
            surface,
            surface_tag,
            volume_tag,
            size: self.config.meshing.volume_mesh_size,
        })?;
        meshed.copy_tag1_to_tag2();
        let volume = meshed.crop(&[volume_tag]);
        if volume.is_empty() {
            return Err(ExternalToolError::InvalidOutput {
                tool: "volume_mesh",
                message: format!("no tetrahedra tagged {volume_tag}"),
            }
            .into());
        }
        Ok(volume)
    }

    fn subtract_isolation_from_skin(&self, skin: &TaggedMesh, isolation: &TaggedMesh) -> Result<TaggedMesh> {
        let skin_tag = Tissue::Skin.volume_tag();
        let outer = skin.crop(&[skin_tag]).outer_surface(SCRATCH_SURFACE);
        let difference = self.tools.booleans.subtract(&outer, isolation)?;
        let volume = self.mesh_volume(&difference, Tissue::Skin.surface_tag(), skin_tag)?;
        info!(elements = volume.element_count(), "skin without isolation");
        Ok(volume)
    }

    fn subtract_electrodes_from_isolation(&self, mounted: &TaggedMesh, electrodes: &TaggedMesh) -> Result<TaggedMesh> {
        let outer = mounted.crop(&[ISOLATION_VOLUME]).outer_surface(SCRATCH_SURFACE);
        let difference = self.tools.booleans.subtract(&outer, electrodes)?;
        let volume = self.mesh_volume(&difference, ISOLATION_SURFACE, ISOLATION_VOLUME)?;
        info!(elements = volume.element_count(), "isolation without electrodes");
        Ok(volume)
    }

    fn align_interfaces(
        &self,
        rest: &TaggedMesh,
        mounted: &TaggedMesh,
        mut skin: TaggedMesh,
        mut isolation: TaggedMesh,
    ) -> Result<Parts> {
        let meshing = &self.config.meshing;
        let aligner = AlignInterface::new(meshing.align_tolerance, meshing.align_decimals);

        let reference = mounted.remove_tags(&[ISOLATION_VOLUME, ISOLATION_SURFACE, ISOLATION_CONTACT])?;
        let moved = aligner.execute(&mut isolation, &reference);
        info!(moved, "isolation aligned to skull and electrodes");

        let mut skull = mounted.crop(&[Tissue::Skin.volume_tag(), Tissue::Skin.surface_tag()]);
        compact_bone_back(&mut skull)?;
        let electrodes = mounted.crop(&electrode_tags(self.electrode_count()));

        let joiner = self.joiner();
        let everything_but_skin = [&skull, &isolation, &electrodes]
            .into_iter()
            .fold(rest.clone(), |acc, part| joiner.execute(&acc, part));
        let moved = aligner.execute(&mut skin, &everything_but_skin);
        info!(moved, "skin aligned to all other parts");

        Ok(Parts {
            skull,
            isolation,
            electrodes,
            skin,
        })
    }

    fn write_prepared(&self, ws: &Workspace, rest: &TaggedMesh, mounted: &TaggedMesh, parts: &Parts) -> Result<()> {
        let [rest_name, mounted_name, skin_name, isolation_name] = PREPARED_MESHES;
        write_msh(&ws.file(rest_name), rest)?;
        write_msh(&ws.file(mounted_name), mounted)?;
        write_msh(&ws.file(skin_name), &parts.skin)?;
        write_msh(&ws.file(isolation_name), &parts.isolation)
    }

    fn assemble(&self, rest: &TaggedMesh, parts: Parts) -> (TaggedMesh, Vec<(String, usize)>) {
        let Parts {
            skull,
            mut isolation,
            electrodes,
            mut skin,
        } = parts;
        isolation.copy_tag1_to_tag2();
        skin.copy_tag1_to_tag2();

        let joiner = self.joiner();
        let mut stacked = rest.clone();
        for part in [&skull, &isolation, &electrodes, &skin] {
            let (joined, shared) = joiner.execute_counted(&stacked, part);
            debug!(shared, "joined part");
            stacked = joined;
        }

        let shared_nodes: Vec<(String, usize)> = interface_pairs(self.electrode_count())
            .into_iter()
            .map(|(a, b, label)| {
                let count = stacked.shared_node_count(a, b);
                info!(interface = %label, shared = count, "shared nodes");
                (label, count)
            })
            .collect();
        info!(
            nodes = stacked.node_count(),
            elements = stacked.element_count(),
            "assembled head model"
        );
        (stacked, shared_nodes)
    }

    fn invoke_solver(
        &self,
        ws: &Workspace,
        stacked: TaggedMesh,
        contact_surfaces: Vec<i32>,
    ) -> Result<(PathBuf, PathBuf, Option<(f64, f64)>)> {
        let config = self.config;
        let edited = ws.file(EDITED_MESH);
        write_msh(&edited, &stacked)?;

        let conductivities = ConductivityMap::for_solver(&config.conductivity, self.electrode_count());
        let request = SolverRequest::new(
            stacked,
            conductivities,
            contact_surfaces,
            config.electrodes.currents.clone(),
        )?
        .with_fields(config.electrodes.fields.clone());
        info!(currents = ?request.currents(), surfaces = ?request.electrode_surfaces(), "starting simulation");

        let field = self.tools.solver.solve(&request)?;
        let potential = ws.file(&format!("{}_{RESULT_MARKER}_scalar.msh", config.files.mesh_stem()));
        write_msh_with_potential(&potential, request.mesh(), field.values())?;
        let range = field.range();
        info!(?range, path = %potential.display(), "wrote potential");
        Ok((edited, potential, range))
    }
}

/// Converts the assembled head to the solver's tag convention: skin and
/// compact bone swap tags and the isolation becomes electrode rubber.
///
/// # Errors
///
/// Returns an error if a retag check fails.
pub fn retag_for_solver(mesh: &mut TaggedMesh) -> Result<()> {
    swap_skin_and_bone(mesh)?;
    retag_all(
        mesh,
        &[
            (ISOLATION_SURFACE, SCRATCH_SURFACE),
            (ISOLATION_VOLUME, ELECTRODE_RUBBER),
        ],
    )
}
