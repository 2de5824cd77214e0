//! tes-plan: runs one planning pass over a head mesh.
//!
//! Settings come from a TOML file; the run identity (mesh, data directory,
//! ensemble, electrode name and position) can be overridden from the command
//! line or the job environment.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info};

use tes_planner::config::SimulationConfig;
use tes_planner::external::{CommandBackend, Toolchain};
use tes_planner::pipeline::{Pipeline, RunStatus};
use tes_planner::placement::{OutlineSource, PointListOutline, StaticOutline};
use tes_planner::Result;

#[derive(Parser)]
#[command(name = "tes-plan")]
#[command(about = "Electrode placement and field simulation on a tagged head mesh", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Head mesh file name searched under the data directory
    #[arg(long, env = "MESH_NAME")]
    mesh_name: Option<String>,

    /// Data directory
    #[arg(long, env = "VOLUME_PATH")]
    data_dir: Option<PathBuf>,

    #[arg(long, env = "ENSEMBLE_NAME")]
    ensemble: Option<String>,

    #[arg(long, env = "ELECTRODE_NAME")]
    electrode: Option<String>,

    #[arg(long, env = "ELECTRODE_POSITION_X", allow_hyphen_values = true)]
    x: Option<f64>,

    #[arg(long, env = "ELECTRODE_POSITION_Y", allow_hyphen_values = true)]
    y: Option<f64>,

    #[arg(long, env = "ELECTRODE_POSITION_Z", allow_hyphen_values = true)]
    z: Option<f64>,

    /// Isolation pad outline (point list)
    #[arg(long)]
    outline: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::load(path)?,
            None => SimulationConfig::default(),
        };

        let files = &mut config.files;
        if let Some(name) = &self.mesh_name {
            files.mesh_name.clone_from(name);
        }
        if let Some(dir) = &self.data_dir {
            files.data_dir.clone_from(dir);
        }
        if let Some(name) = &self.ensemble {
            files.ensemble_name.clone_from(name);
        }
        if let Some(name) = &self.electrode {
            files.electrode_name.clone_from(name);
        }
        if self.outline.is_some() {
            files.outline.clone_from(&self.outline);
        }

        let centre = &mut config.electrodes.pos_centre;
        for (axis, value) in centre.iter_mut().zip([self.x, self.y, self.z]) {
            if let Some(v) = value {
                *axis = v;
            }
        }

        config.validate()?;
        Ok(config)
    }
}

fn run(config: &SimulationConfig) -> Result<()> {
    RunStatus::new(config, true, false).write(config)?;

    let backend = CommandBackend::new(&config.tools)?;
    let outline: Box<dyn OutlineSource> = match &config.files.outline {
        Some(path) => Box::new(PointListOutline::new(path)),
        None => Box::new(StaticOutline::square()),
    };

    let summary = Pipeline::new(config, Toolchain::uniform(&backend, outline.as_ref())).run()?;
    info!(
        run_dir = %summary.run_dir.display(),
        potential = %summary.potential_mesh.display(),
        refinement_cached = summary.refinement_cached,
        "run finished"
    );
    for (label, count) in &summary.shared_nodes {
        info!(interface = %label, shared_nodes = count);
    }

    RunStatus::new(config, false, true).write(config)?;
    Ok(())
}

fn main() -> ExitCode {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into())
        .add_directive("tes_planner=info".parse().unwrap_or_default())
        .add_directive("tes_plan=info".parse().unwrap_or_default());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let started = Instant::now();

    let result = cli.load_config().and_then(|config| {
        let outcome = run(&config);
        if outcome.is_err() {
            // Leave the job controller a final state to poll.
            if let Err(e) = RunStatus::new(&config, false, false).write(&config) {
                error!(error = %e, "could not record the failed run");
            }
        }
        outcome
    });

    match result {
        Ok(()) => {
            info!(elapsed_s = started.elapsed().as_secs_f64(), "done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, elapsed_s = started.elapsed().as_secs_f64(), "run failed");
            ExitCode::FAILURE
        }
    }
}
