use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::{ToolCommand, ToolsConfig};
use crate::error::{ExternalToolError, PlannerError, Result};
use crate::io::{read_msh, read_stl, write_msh, write_stl};
use crate::mesh::tags::{electrode_contact, SCRATCH_SURFACE};
use crate::mesh::TaggedMesh;
use crate::placement::{ElectrodeShape, ElectrodeSpec};
use crate::solver::{PotentialField, SolverRequest};

use super::{
    BooleanEngine, ElectrodeMounter, ExtrudeRequest, FemSolver, MeshRefiner, MountRequest, MountedElectrodes,
    SurfaceExtruder, VolumeMeshRequest, VolumeMesher,
};

/// Runs every collaborator as an external program.
///
/// Each call gets its own directory under the scratch directory holding the
/// exchange files; it is removed once the call returns, whether or not the
/// tool succeeded. A scratch directory created by the backend itself is
/// removed when the backend is dropped. Placeholders in the configured arguments are replaced by
/// their paths:
///
/// | placeholder | content                                  |
/// |-------------|------------------------------------------|
/// | `{input}`   | mesh (`.msh`) or surface (`.stl`) input  |
/// | `{input_b}` | second surface of a boolean (`.stl`)     |
/// | `{output}`  | file the tool must create                |
/// | `{request}` | JSON parameters of the call              |
#[derive(Debug)]
pub struct CommandBackend {
    tools: ToolsConfig,
    scratch: PathBuf,
    owns_scratch: bool,
    calls: AtomicUsize,
}

/// Exchange files of one call, deleted on drop.
struct Exchange {
    dir: PathBuf,
    input: PathBuf,
    input_b: PathBuf,
    output: PathBuf,
    request: PathBuf,
}

impl Exchange {
    fn path_for(&self, placeholder: &str) -> Option<&Path> {
        match placeholder {
            "input" => Some(&self.input),
            "input_b" => Some(&self.input_b),
            "output" => Some(&self.output),
            "request" => Some(&self.request),
            _ => None,
        }
    }

    fn expand(&self, arg: &str) -> String {
        let mut out = arg.to_owned();
        for name in ["input_b", "input", "output", "request"] {
            let pattern = format!("{{{name}}}");
            if out.contains(&pattern) {
                if let Some(path) = self.path_for(name) {
                    out = out.replace(&pattern, &path.display().to_string());
                }
            }
        }
        out
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %self.dir.display(), error = %e, "could not remove exchange files"),
        }
    }
}

#[derive(Deserialize)]
struct SolverOutput {
    potential: Vec<f64>,
}

impl CommandBackend {
    /// Backend for the given tool commands.
    ///
    /// # Errors
    ///
    /// Returns an error if the scratch directory cannot be created.
    pub fn new(tools: &ToolsConfig) -> Result<Self> {
        let (scratch, owns_scratch) = match &tools.scratch_dir {
            Some(dir) => (dir.clone(), false),
            None => (
                std::env::temp_dir().join(format!("tes-planner-{}", std::process::id())),
                true,
            ),
        };
        std::fs::create_dir_all(&scratch).map_err(|e| PlannerError::io(&scratch, e))?;
        Ok(Self {
            tools: tools.clone(),
            scratch,
            owns_scratch,
            calls: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch
    }

    fn command(&self, tool: &'static str) -> Result<&ToolCommand> {
        let command = match tool {
            "refine" => self.tools.refine.as_ref(),
            "mount" => self.tools.mount.as_ref(),
            "extrude" => self.tools.extrude.as_ref(),
            "subtract" => self.tools.subtract.as_ref(),
            "volume_mesh" => self.tools.volume_mesh.as_ref(),
            "solve" => self.tools.solve.as_ref(),
            _ => None,
        };
        command.ok_or_else(|| ExternalToolError::NotConfigured(tool).into())
    }

    /// Creates the exchange directory of the next call.
    fn exchange(&self, tool: &'static str, input_ext: &str, output_ext: &str) -> Result<Exchange> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        let dir = self.scratch.join(format!("{n:03}_{tool}"));
        std::fs::create_dir_all(&dir).map_err(|e| PlannerError::io(&dir, e))?;
        Ok(Exchange {
            input: dir.join(format!("input.{input_ext}")),
            input_b: dir.join(format!("input_b.{input_ext}")),
            output: dir.join(format!("output.{output_ext}")),
            request: dir.join("request.json"),
            dir,
        })
    }

    fn write_request(exchange: &Exchange, request: &Value) -> Result<()> {
        let text = serde_json::to_string_pretty(request).map_err(|e| ExternalToolError::InvalidOutput {
            tool: "request",
            message: e.to_string(),
        })?;
        std::fs::write(&exchange.request, text).map_err(|e| PlannerError::io(&exchange.request, e))
    }

    /// Runs `tool` and checks that it produced its output file.
    fn run(&self, tool: &'static str, exchange: &Exchange) -> Result<()> {
        let command = self.command(tool)?;
        let args: Vec<String> = command.args.iter().map(|a| exchange.expand(a)).collect();
        debug!(tool, program = %command.program, ?args, "running external tool");

        let output = Command::new(&command.program)
            .args(&args)
            .current_dir(&exchange.dir)
            .output()
            .map_err(|source| ExternalToolError::Launch {
                tool,
                program: command.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExternalToolError::Failed {
                tool,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            }
            .into());
        }
        if !output.stderr.is_empty() {
            warn!(tool, stderr = %String::from_utf8_lossy(&output.stderr).trim(), "tool wrote to stderr");
        }
        if !exchange.output.is_file() {
            return Err(ExternalToolError::MissingOutput {
                tool,
                path: exchange.output.clone(),
            }
            .into());
        }
        Ok(())
    }

    fn invalid(tool: &'static str, message: impl Into<String>) -> PlannerError {
        ExternalToolError::InvalidOutput {
            tool,
            message: message.into(),
        }
        .into()
    }
}

impl Drop for CommandBackend {
    fn drop(&mut self) {
        if !self.owns_scratch {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.scratch) {
            warn!(dir = %self.scratch.display(), error = %e, "could not remove scratch directory");
        }
    }
}

fn electrode_json(spec: &ElectrodeSpec) -> Value {
    let vertices: Vec<[f64; 2]> = match &spec.shape {
        ElectrodeShape::Custom(points) => points.iter().map(|p| [p.x, p.y]).collect(),
        ElectrodeShape::Ellipse | ElectrodeShape::Rect => Vec::new(),
    };
    json!({
        "name": spec.name,
        "channel": spec.channel,
        "centre": [spec.centre.x, spec.centre.y, spec.centre.z],
        "shape": spec.shape.name(),
        "dimensions": spec.dimensions,
        "thickness": spec.thickness,
        "y_dir": spec.y_dir.map(|v| [v.x, v.y, v.z]),
        "vertices": vertices,
    })
}

impl MeshRefiner for CommandBackend {
    fn refine(&self, mesh: &TaggedMesh) -> Result<TaggedMesh> {
        let exchange = self.exchange("refine", "msh", "msh")?;
        write_msh(&exchange.input, mesh)?;
        self.run("refine", &exchange)?;
        read_msh(&exchange.output)
    }
}

impl ElectrodeMounter for CommandBackend {
    fn mount(&self, request: &MountRequest<'_>) -> Result<MountedElectrodes> {
        let exchange = self.exchange("mount", "msh", "msh")?;
        write_msh(&exchange.input, request.mesh)?;
        let electrodes: Vec<Value> = request.electrodes.iter().map(electrode_json).collect();
        Self::write_request(&exchange, &json!({ "electrodes": electrodes }))?;
        self.run("mount", &exchange)?;

        let mesh = read_msh(&exchange.output)?;
        let mut contact_surfaces = Vec::with_capacity(request.electrodes.len());
        for spec in request.electrodes {
            let tag = electrode_contact(spec.channel);
            if mesh.count_elements_with_tag(tag) == 0 {
                return Err(Self::invalid(
                    "mount",
                    format!("electrode `{}` has no contact surface {tag}", spec.name),
                ));
            }
            contact_surfaces.push(tag);
        }
        Ok(MountedElectrodes { mesh, contact_surfaces })
    }
}

impl SurfaceExtruder for CommandBackend {
    fn extrude(&self, request: &ExtrudeRequest<'_>) -> Result<TaggedMesh> {
        let exchange = self.exchange("extrude", "msh", "msh")?;
        write_msh(&exchange.input, request.surface)?;
        let v = request.extrusion.vector;
        Self::write_request(
            &exchange,
            &json!({
                "vector": [v.x, v.y, v.z],
                "layers": request.extrusion.layers,
                "volume_tag": request.volume_tag,
            }),
        )?;
        self.run("extrude", &exchange)?;
        read_msh(&exchange.output)
    }
}

impl BooleanEngine for CommandBackend {
    fn subtract(&self, solid: &TaggedMesh, tool: &TaggedMesh) -> Result<TaggedMesh> {
        let exchange = self.exchange("subtract", "stl", "stl")?;
        write_stl(&exchange.input, solid)?;
        write_stl(&exchange.input_b, tool)?;
        self.run("subtract", &exchange)?;
        let result = read_stl(&exchange.output, SCRATCH_SURFACE)?;
        if result.is_empty() {
            return Err(Self::invalid("subtract", "empty difference"));
        }
        Ok(result)
    }
}

impl VolumeMesher for CommandBackend {
    fn mesh_volume(&self, request: &VolumeMeshRequest<'_>) -> Result<TaggedMesh> {
        let exchange = self.exchange("volume_mesh", "stl", "msh")?;
        write_stl(&exchange.input, request.surface)?;
        Self::write_request(
            &exchange,
            &json!({
                "surface_tag": request.surface_tag,
                "volume_tag": request.volume_tag,
                "size": request.size,
            }),
        )?;
        self.run("volume_mesh", &exchange)?;
        let mesh = read_msh(&exchange.output)?;
        if mesh.tetrahedra().is_empty() {
            return Err(Self::invalid("volume_mesh", "no tetrahedra generated"));
        }
        Ok(mesh)
    }
}

impl FemSolver for CommandBackend {
    fn solve(&self, request: &SolverRequest) -> Result<PotentialField> {
        let exchange = self.exchange("solve", "msh", "json")?;
        write_msh(&exchange.input, request.mesh())?;
        let conductivities: serde_json::Map<String, Value> = request
            .conductivities()
            .iter()
            .map(|(tag, value)| (tag.to_string(), json!(value)))
            .collect();
        Self::write_request(
            &exchange,
            &json!({
                "conductivities": conductivities,
                "electrode_surfaces": request.electrode_surfaces(),
                "currents": request.currents(),
                "fields": request.fields(),
            }),
        )?;
        self.run("solve", &exchange)?;

        let text = std::fs::read_to_string(&exchange.output).map_err(|e| PlannerError::io(&exchange.output, e))?;
        let output: SolverOutput = serde_json::from_str(&text).map_err(|e| Self::invalid("solve", e.to_string()))?;
        PotentialField::new(request.mesh(), output.potential)
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mesh::tests::two_tets;

    fn backend(tools: ToolsConfig) -> (tempfile::TempDir, CommandBackend) {
        let dir = tempfile::tempdir().unwrap();
        let tools = ToolsConfig {
            scratch_dir: Some(dir.path().to_path_buf()),
            ..tools
        };
        let backend = CommandBackend::new(&tools).unwrap();
        (dir, backend)
    }

    fn tool(program: &str, args: &[&str]) -> Option<ToolCommand> {
        Some(ToolCommand {
            program: program.to_owned(),
            args: args.iter().map(|a| (*a).to_owned()).collect(),
        })
    }

    #[test]
    fn unconfigured_tool_is_reported() {
        let (_dir, backend) = backend(ToolsConfig::default());
        let err = backend.refine(&two_tets(5, 7)).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::External(ExternalToolError::NotConfigured("refine"))
        ));
    }

    #[test]
    fn copying_refiner_round_trips_the_mesh() {
        let (_dir, backend) = backend(ToolsConfig {
            refine: tool("cp", &["{input}", "{output}"]),
            ..ToolsConfig::default()
        });
        let mesh = two_tets(5, 7);
        let refined = backend.refine(&mesh).unwrap();
        assert_eq!(refined, mesh);
    }

    #[test]
    fn missing_output_is_reported() {
        let (_dir, backend) = backend(ToolsConfig {
            refine: tool("true", &[]),
            ..ToolsConfig::default()
        });
        let err = backend.refine(&two_tets(5, 7)).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::External(ExternalToolError::MissingOutput { tool: "refine", .. })
        ));
    }

    #[test]
    fn failing_tool_reports_status_and_stderr() {
        let (_dir, backend) = backend(ToolsConfig {
            refine: tool("sh", &["-c", "echo broken >&2; exit 3"]),
            ..ToolsConfig::default()
        });
        let err = backend.refine(&two_tets(5, 7)).unwrap_err();
        let PlannerError::External(ExternalToolError::Failed { stderr, .. }) = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(stderr, "broken");
    }

    #[test]
    fn unknown_program_fails_to_launch() {
        let (_dir, backend) = backend(ToolsConfig {
            refine: tool("/nonexistent/refiner", &[]),
            ..ToolsConfig::default()
        });
        let err = backend.refine(&two_tets(5, 7)).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::External(ExternalToolError::Launch { .. })
        ));
    }

    fn scratch_entries(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir).unwrap().map(|e| e.unwrap().path()).collect()
    }

    #[test]
    fn exchange_files_are_removed_after_each_call() {
        let (dir, backend) = backend(ToolsConfig {
            refine: tool("cp", &["{input}", "{output}"]),
            mount: tool("true", &[]),
            ..ToolsConfig::default()
        });
        let mesh = two_tets(5, 7);
        for _ in 0..3 {
            backend.refine(&mesh).unwrap();
        }
        let request = MountRequest {
            mesh: &mesh,
            electrodes: &[],
        };
        assert!(backend.mount(&request).is_err());

        assert_eq!(scratch_entries(dir.path()), Vec::<PathBuf>::new());
        drop(backend);
        assert!(dir.path().is_dir());
    }

    #[test]
    fn own_scratch_directory_is_removed_on_drop() {
        let backend = CommandBackend::new(&ToolsConfig::default()).unwrap();
        let scratch = backend.scratch_dir().to_path_buf();
        assert!(scratch.is_dir());
        drop(backend);
        assert!(!scratch.exists());
    }

    #[test]
    fn placeholders_are_expanded() {
        let exchange = Exchange {
            dir: PathBuf::from("/nonexistent/tes-planner-exchange"),
            input: PathBuf::from("/tmp/x/input.stl"),
            input_b: PathBuf::from("/tmp/x/input_b.stl"),
            output: PathBuf::from("/tmp/x/output.stl"),
            request: PathBuf::from("/tmp/x/request.json"),
        };
        assert_eq!(exchange.expand("{input_b}"), "/tmp/x/input_b.stl");
        assert_eq!(exchange.expand("--in={input}"), "--in=/tmp/x/input.stl");
        assert_eq!(exchange.expand("{unknown}"), "{unknown}");
    }

    #[test]
    fn solver_output_is_read_from_json() {
        let (_dir, backend) = backend(ToolsConfig {
            solve: tool(
                "sh",
                &["-c", "echo '{\"potential\": [0.0, 0.1, 0.2, 0.3, 0.4]}' > \"$1\"", "sh", "{output}"],
            ),
            ..ToolsConfig::default()
        });
        let request = SolverRequest::new(
            two_tets(5, 7),
            crate::solver::ConductivityMap::for_solver(&crate::config::ConductivityConfig::default(), 1),
            vec![2101, 2102],
            vec![0.001, -0.001],
        )
        .unwrap();
        let field = backend.solve(&request).unwrap();
        assert_eq!(field.values().len(), 5);
        assert_eq!(field.range(), Some((0.0, 0.4)));
    }
}
