//! Run configuration.
//!
//! Everything a run needs is carried in [`SimulationConfig`] and handed to
//! the components that use it. Files are TOML; every field has a default, so
//! a file only lists what it changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::mesh::tags::{MAX_ELECTRODES, Tissue};

/// Complete configuration of one planning run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub files: FileConfig,
    pub electrodes: ElectrodeConfig,
    pub geometry: GeometryConfig,
    pub conductivity: ConductivityConfig,
    pub meshing: MeshingConfig,
    pub tools: ToolsConfig,
}

/// Input and output locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Head mesh to load; when unset, `mesh_name` is searched under `data_dir`.
    pub head_mesh: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub mesh_name: String,
    pub ensemble_name: String,
    pub electrode_name: String,
    /// Parent of the `Simulation_<n>` run directories.
    ///
    /// Defaults to `<data_dir>/<ensemble>/<electrode>/results/<mesh stem>`.
    pub output_root: Option<PathBuf>,
    /// Isolation pad outline (plain point list).
    pub outline: Option<PathBuf>,
    pub outline_rotation_deg: f64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            head_mesh: None,
            data_dir: PathBuf::from("data"),
            mesh_name: "head.msh".to_owned(),
            ensemble_name: "ensemble".to_owned(),
            electrode_name: "electrode".to_owned(),
            output_root: None,
            outline: None,
            outline_rotation_deg: 0.0,
        }
    }
}

impl FileConfig {
    /// Mesh name without its extension.
    #[must_use]
    pub fn mesh_stem(&self) -> &str {
        Path::new(&self.mesh_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.mesh_name)
    }

    /// Directory holding the `Simulation_<n>` run directories.
    #[must_use]
    pub fn results_root(&self) -> PathBuf {
        self.output_root.clone().unwrap_or_else(|| {
            self.data_dir
                .join(&self.ensemble_name)
                .join(&self.electrode_name)
                .join("results")
                .join(self.mesh_stem())
        })
    }

    /// Location of the run status file.
    #[must_use]
    pub fn status_file(&self) -> PathBuf {
        self.data_dir
            .join(&self.ensemble_name)
            .join(format!("sim_info_{}.json", self.electrode_name))
    }
}

/// Electrode set, stimulation currents and pad placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectrodeConfig {
    /// One name per electrode; the first one is the central electrode.
    pub names: Vec<String>,
    /// Current per electrode in amperes; must sum to zero.
    pub currents: Vec<f64>,
    /// Target point of the central electrode.
    pub pos_centre: [f64; 3],
    /// Pad y direction before rotation.
    pub orientation: [f64; 3],
    pub theta_deg: f64,
    /// Fields requested from the solver (`v`, `e`, `E`, `j`, `J`).
    pub fields: String,
}

impl Default for ElectrodeConfig {
    fn default() -> Self {
        Self {
            names: vec![
                "center".to_owned(),
                "lateral_1".to_owned(),
                "lateral_2".to_owned(),
                "lateral_3".to_owned(),
                "lateral_4".to_owned(),
            ],
            currents: vec![0.001, -0.000_25, -0.000_25, -0.000_25, -0.000_25],
            pos_centre: [0.0, 0.0, 0.0],
            orientation: [0.0, 0.0, 100.0],
            theta_deg: 45.0,
            fields: "veE".to_owned(),
        }
    }
}

impl ElectrodeConfig {
    #[must_use]
    pub fn count(&self) -> usize {
        self.names.len()
    }
}

/// Electrode and pad dimensions in millimetres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub h_silicon: f64,
    pub h_electrode: f64,
    pub d_int_elec: f64,
    pub d_center_compl: f64,
    pub d_center_act: f64,
    pub d_outer_compl: f64,
    pub d_outer_act: f64,
    pub d_border: f64,
    /// Side of the square whose corners carry the peripheral electrodes.
    pub d_rect: f64,
    pub phi_deg: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            h_silicon: 1.0,
            h_electrode: 0.12,
            d_int_elec: 23.0,
            d_center_compl: 20.0,
            d_center_act: 15.0,
            d_outer_compl: 13.0,
            d_outer_act: 10.0,
            d_border: 6.0,
            d_rect: 32.5,
            phi_deg: 45.0,
        }
    }
}

impl GeometryConfig {
    /// Half extent of the isolation pad outline.
    #[must_use]
    pub fn pad_half_extent(&self) -> f64 {
        self.d_rect / 2.0 + self.d_outer_act / 2.0 + self.d_border
    }

    fn dimensions(&self) -> [(&'static str, f64); 10] {
        [
            ("h_silicon", self.h_silicon),
            ("h_electrode", self.h_electrode),
            ("d_int_elec", self.d_int_elec),
            ("d_center_compl", self.d_center_compl),
            ("d_center_act", self.d_center_act),
            ("d_outer_compl", self.d_outer_compl),
            ("d_outer_act", self.d_outer_act),
            ("d_border", self.d_border),
            ("d_rect", self.d_rect),
            ("phi_deg", self.phi_deg),
        ]
    }
}

/// Conductivities in S/m.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductivityConfig {
    pub white_matter: f64,
    pub grey_matter: f64,
    pub csf: f64,
    pub compact_bone: f64,
    pub spongy_bone: f64,
    pub skin: f64,
    pub eyeballs: f64,
    pub blood: f64,
    pub muscle: f64,
    /// Must stay above zero.
    pub electrode_rubber: f64,
    pub electrode: f64,
}

impl Default for ConductivityConfig {
    fn default() -> Self {
        Self {
            white_matter: 0.3746,
            grey_matter: 0.3746,
            csf: 1.71,
            compact_bone: 0.0046,
            spongy_bone: 0.0497,
            skin: 0.4137,
            eyeballs: 0.5,
            blood: 0.5737,
            muscle: 0.3243,
            electrode_rubber: 1e-6,
            electrode: 9.5e6,
        }
    }
}

impl ConductivityConfig {
    #[must_use]
    pub fn tissue(&self, tissue: Tissue) -> f64 {
        match tissue {
            Tissue::WhiteMatter => self.white_matter,
            Tissue::GreyMatter => self.grey_matter,
            Tissue::Csf => self.csf,
            Tissue::Skin => self.skin,
            Tissue::Eyeballs => self.eyeballs,
            Tissue::CompactBone => self.compact_bone,
            Tissue::SpongyBone => self.spongy_bone,
            Tissue::Blood => self.blood,
            Tissue::Muscle => self.muscle,
        }
    }
}

/// Tolerances and sizes of the mesh editing steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshingConfig {
    pub join_epsilon: f64,
    pub align_tolerance: f64,
    pub align_decimals: u32,
    pub volume_mesh_size: f64,
    /// Added to `h_silicon` for the extrusion length.
    pub extrusion_extra: f64,
    pub layers_per_unit: f64,
}

impl Default for MeshingConfig {
    fn default() -> Self {
        Self {
            join_epsilon: 1e-8,
            align_tolerance: 0.1,
            align_decimals: 4,
            volume_mesh_size: 5.0,
            extrusion_extra: 1.0,
            layers_per_unit: 5.0,
        }
    }
}

/// An external program and its argument template.
///
/// Arguments may contain `{input}`, `{input_b}`, `{output}` and `{request}`,
/// which are replaced by file paths for each call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Command lines of the external collaborators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub refine: Option<ToolCommand>,
    pub mount: Option<ToolCommand>,
    pub extrude: Option<ToolCommand>,
    pub subtract: Option<ToolCommand>,
    pub volume_mesh: Option<ToolCommand>,
    pub solve: Option<ToolCommand>,
    /// Scratch directory for tool exchange files; the system temp dir if unset.
    pub scratch_dir: Option<PathBuf>,
}

impl SimulationConfig {
    /// Loads and validates a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed or validated.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values that would otherwise fail deep inside a run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let electrodes = &self.electrodes;
        if electrodes.names.is_empty() {
            return invalid("at least one electrode is required");
        }
        if electrodes.count() > MAX_ELECTRODES {
            return invalid(format!(
                "{} electrodes configured, at most {MAX_ELECTRODES} are supported",
                electrodes.count()
            ));
        }
        if electrodes.currents.len() != electrodes.count() {
            return invalid(format!(
                "{} currents for {} electrodes",
                electrodes.currents.len(),
                electrodes.count()
            ));
        }
        if electrodes.orientation.iter().all(|c| *c == 0.0) {
            return invalid("orientation must not be the zero vector");
        }
        for (name, value) in self.geometry.dimensions() {
            if value.is_nan() || value <= 0.0 {
                return invalid(format!("{name} must be positive, got {value}"));
            }
        }
        let meshing = &self.meshing;
        for (name, value) in [
            ("join_epsilon", meshing.join_epsilon),
            ("align_tolerance", meshing.align_tolerance),
            ("volume_mesh_size", meshing.volume_mesh_size),
            ("layers_per_unit", meshing.layers_per_unit),
            ("electrode_rubber", self.conductivity.electrode_rubber),
        ] {
            if value.is_nan() || value <= 0.0 {
                return invalid(format!("{name} must be positive, got {value}"));
            }
        }
        Ok(())
    }
}

fn invalid<T>(message: impl Into<String>) -> Result<T> {
    Err(ConfigError::Invalid(message.into()).into())
}
