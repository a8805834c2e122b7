use crate::cli::OutputFormat;
use crate::config::Settings;

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, scenario: &str, settings: &Settings);
    fn progress(&self) -> Option<stampede_core::ProgressFn>;
    fn print_summary(&self, report: &stampede_core::RunReport) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
