use std::sync::Arc;

use stampede_core::Scenario as _;

use crate::cli::RunArgs;
use crate::config::{ConfigFile, Settings};
use crate::exit_codes::ExitCode;
use crate::mesh::MeshScenario;
use crate::output;
use crate::run_error::RunError;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let file = match &args.config {
        Some(path) => ConfigFile::load(path).await.map_err(RunError::InvalidInput)?,
        None => ConfigFile::default(),
    };
    let settings = Settings::resolve(file, &args).map_err(RunError::InvalidInput)?;

    let scenario = Arc::new(MeshScenario::new(
        settings.base_url.clone(),
        settings.fixtures.clone(),
    ));
    out.print_header(scenario.name(), &settings);

    let report = stampede_core::run(scenario, settings.run, out.progress()).await?;

    out.print_summary(&report).map_err(RunError::RuntimeError)?;

    Ok(ExitCode::from_verdict(report.passed()))
}
