use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::config::FileConfig;
use crate::error::{MeshIoError, PlannerError, Result};

/// Name of the assembled mesh handed to the solver.
pub const EDITED_MESH: &str = "edited_mesh.msh";

/// Marker in the names of solver result files.
pub const RESULT_MARKER: &str = "TDCS_1";

/// Files kept in the run directory after mesh preparation.
pub const PREPARED_MESHES: [&str; 4] = [
    "mesh_without_skull_and_skin.msh",
    "skull_ref_with_elec_and_isolation.msh",
    "mesh_skin_with_hole_fixed_for_everything.msh",
    "isolation_with_hole_fixed_for_electrodes_and_skull.msh",
];

/// Output directories of one run.
///
/// `results_root` holds every `Simulation_<n>` run directory of a head mesh
/// and the refinement cache shared between runs.
#[derive(Debug, Clone)]
pub struct Workspace {
    results_root: PathBuf,
    run_dir: PathBuf,
}

impl Workspace {
    /// Creates `<results_root>/Simulation_<n>` with the first unused `n`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create(results_root: &Path) -> Result<Self> {
        std::fs::create_dir_all(results_root).map_err(|e| PlannerError::io(results_root, e))?;
        let mut n = 0usize;
        let run_dir = loop {
            let candidate = results_root.join(format!("Simulation_{n}"));
            match std::fs::create_dir(&candidate) {
                Ok(()) => break candidate,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(PlannerError::io(&candidate, e)),
            }
        };
        info!(run_dir = %run_dir.display(), "created run directory");
        Ok(Self {
            results_root: results_root.to_path_buf(),
            run_dir,
        })
    }

    #[must_use]
    pub fn results_root(&self) -> &Path {
        &self.results_root
    }

    #[must_use]
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Path of a file in the run directory.
    #[must_use]
    pub fn file(&self, name: &str) -> PathBuf {
        self.run_dir.join(name)
    }

    /// Refined skull of `mesh_name`.
    ///
    /// Keyed by the mesh file name only: a different mesh with the same name
    /// reuses a stale refinement.
    #[must_use]
    pub fn refinement_cache(&self, mesh_name: &str) -> PathBuf {
        self.results_root.join(format!("skull_surf_refined_{mesh_name}"))
    }

    /// Deletes every file of the run directory for which `keep` is false.
    ///
    /// Failures are logged and skipped. Returns the number of deleted files.
    pub fn cleanup(&self, keep: impl Fn(&str) -> bool) -> usize {
        let entries = match std::fs::read_dir(&self.run_dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!(run_dir = %self.run_dir.display(), error = %e, "cannot list run directory");
                return 0;
            }
        };

        let mut deleted = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if keep(&name) {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => deleted.push(name),
                Err(e) => error!(path = %path.display(), error = %e, "error while deleting file"),
            }
        }
        deleted.sort();
        debug!(?deleted, "deleted intermediate files");
        deleted.len()
    }
}

/// Keep rule after mesh preparation.
#[must_use]
pub fn is_prepared_mesh(name: &str) -> bool {
    PREPARED_MESHES.contains(&name)
}

/// Keep rule after the solve.
#[must_use]
pub fn is_final_output(name: &str) -> bool {
    name.contains(RESULT_MARKER) || name.contains(EDITED_MESH)
}

/// Resolves the head mesh: the configured path, otherwise the last file
/// named `mesh_name` found under `data_dir`.
///
/// # Errors
///
/// Returns [`MeshIoError::FileNotFound`] if no such file exists.
pub fn locate_head_mesh(files: &FileConfig) -> Result<PathBuf> {
    if let Some(path) = &files.head_mesh {
        if path.is_file() {
            return Ok(path.clone());
        }
        return Err(MeshIoError::FileNotFound { path: path.clone() }.into());
    }

    let mut found = Vec::new();
    find_named(&files.data_dir, &files.mesh_name, &mut found);
    found.sort();
    match found.pop() {
        Some(path) => {
            info!(path = %path.display(), "found head mesh");
            Ok(path)
        }
        None => {
            error!(mesh = %files.mesh_name, data_dir = %files.data_dir.display(), "unable to locate head mesh");
            Err(MeshIoError::FileNotFound {
                path: files.data_dir.join(&files.mesh_name),
            }
            .into())
        }
    }
}

fn find_named(dir: &Path, name: &str, found: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            find_named(&path, name, found);
        } else if entry.file_name() == name {
            found.push(path);
        }
    }
}
