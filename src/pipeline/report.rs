use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::config::SimulationConfig;
use crate::error::{PlannerError, Result};
use crate::mesh::tags::Tissue;

/// Name of the run parameter summary.
pub const PARAM_INFO: &str = "param.infofile";

/// Renders the parameter summary written next to the results.
#[must_use]
pub fn param_info(config: &SimulationConfig, head_mesh: &Path, run_dir: &Path) -> String {
    ParamInfo {
        config,
        head_mesh,
        run_dir,
    }
    .to_string()
}

struct ParamInfo<'a> {
    config: &'a SimulationConfig,
    head_mesh: &'a Path,
    run_dir: &'a Path,
}

impl fmt::Display for ParamInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.config;
        let files = &config.files;
        let electrodes = &config.electrodes;
        let geometry = &config.geometry;

        let conductivities: Vec<String> = Tissue::ALL
            .iter()
            .map(|&t| format!("{}={}", t.volume_tag(), config.conductivity.tissue(t)))
            .chain([
                format!("rubber={}", config.conductivity.electrode_rubber),
                format!("electrode={}", config.conductivity.electrode),
            ])
            .collect();

        writeln!(f, "== Filenames:")?;
        writeln!(f, "onamehead = {}", self.head_mesh.display())?;
        writeln!(f, "fnamehead = {}", super::workspace::EDITED_MESH)?;
        writeln!(f, "pathfem = {}", self.run_dir.display())?;
        writeln!(f, "infofile = {PARAM_INFO}")?;
        writeln!(f, "mesh_name = {}", files.mesh_name)?;
        write!(f, "\n\n")?;

        writeln!(f, "== Simulation Parameters:")?;
        writeln!(f, "n_electrodes = {}", electrodes.count())?;
        writeln!(f, "currents = {:?}", electrodes.currents)?;
        writeln!(f, "names = {:?}", electrodes.names)?;
        writeln!(f, "theta = {}", electrodes.theta_deg)?;
        writeln!(f, "fields = {}", electrodes.fields)?;
        writeln!(f, "cond = [{}]", conductivities.join(", "))?;
        write!(f, "\n\n")?;

        writeln!(f, "== Positioning Parameters:")?;
        writeln!(f, "d_intElec = {}", geometry.d_int_elec)?;
        writeln!(f, "d_centerCompl = {}", geometry.d_center_compl)?;
        writeln!(f, "d_centerAct = {}", geometry.d_center_act)?;
        writeln!(f, "d_outerCompl = {}", geometry.d_outer_compl)?;
        writeln!(f, "d_outerAct = {}", geometry.d_outer_act)?;
        writeln!(f, "d_border = {}", geometry.d_border)?;
        writeln!(f, "d_rect = {}", geometry.d_rect)?;
        writeln!(f, "h_silicon = {}", geometry.h_silicon)?;
        writeln!(f, "h_electrode = {}", geometry.h_electrode)?;
        writeln!(f, "pos_centre = {:?}", electrodes.pos_centre)?;
        writeln!(f, "orientation = {:?}", electrodes.orientation)?;
        write!(f, "\n\n")
    }
}

/// Writes [`param_info`] to `run_dir/param.infofile`.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_param_info(config: &SimulationConfig, head_mesh: &Path, run_dir: &Path) -> Result<PathBuf> {
    let path = run_dir.join(PARAM_INFO);
    std::fs::write(&path, param_info(config, head_mesh, run_dir)).map_err(|e| PlannerError::io(&path, e))?;
    Ok(path)
}

/// Run status polled by the job controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatus {
    pub ensemble_name: String,
    pub path: String,
    pub running: bool,
    pub success: bool,
    #[serde(rename = "Electrode")]
    pub electrode: ElectrodeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElectrodeStatus {
    pub name: String,
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
    #[serde(rename = "Z")]
    pub z: f64,
}

impl RunStatus {
    #[must_use]
    pub fn new(config: &SimulationConfig, running: bool, success: bool) -> Self {
        let files = &config.files;
        let [x, y, z] = config.electrodes.pos_centre;
        Self {
            ensemble_name: files.ensemble_name.clone(),
            path: files.data_dir.display().to_string(),
            running,
            success,
            electrode: ElectrodeStatus {
                name: files.electrode_name.clone(),
                x,
                y,
                z,
            },
        }
    }

    /// Writes the status to the configured `sim_info_<electrode>.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, config: &SimulationConfig) -> Result<PathBuf> {
        let path = config.files.status_file();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PlannerError::io(parent, e))?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| PlannerError::io(&path, std::io::Error::other(e)))?;
        std::fs::write(&path, text).map_err(|e| PlannerError::io(&path, e))?;
        info!(path = %path.display(), running = self.running, success = self.success, "saved run status");
        Ok(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn info_file_has_all_sections() {
        let config = SimulationConfig::default();
        let text = param_info(&config, Path::new("data/head.msh"), Path::new("out/Simulation_0"));
        let sections: Vec<&str> = text.lines().filter(|l| l.starts_with("== ")).collect();
        assert_eq!(
            sections,
            ["== Filenames:", "== Simulation Parameters:", "== Positioning Parameters:"]
        );
        assert!(text.contains("n_electrodes = 5\n"));
        assert!(text.contains("d_rect = 32.5\n"));
        assert!(text.contains("fnamehead = edited_mesh.msh\n"));
    }

    #[test]
    fn status_json_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SimulationConfig::default();
        config.files.data_dir = dir.path().to_path_buf();
        config.files.ensemble_name = "ens".to_owned();
        config.files.electrode_name = "e7".to_owned();
        config.electrodes.pos_centre = [1.5, -2.0, 80.0];

        let path = RunStatus::new(&config, true, false).write(&config).unwrap();
        assert!(path.ends_with("ens/sim_info_e7.json"));

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["ensemble_name"], "ens");
        assert_eq!(value["running"], true);
        assert_eq!(value["success"], false);
        assert_eq!(value["Electrode"]["name"], "e7");
        assert_eq!(value["Electrode"]["Z"], 80.0);
    }
}
