mod fs;

use crate::cli::InitArgs;
use crate::config::ConfigFile;

const HEADER: &str = "\
# stampede run configuration.
# Values here are overridden by CLI flags (e.g. --base-url, --stage 30s:10).
# Durations accept 250ms, 10s, 2m or plain seconds.
";

/// Writes the built-in defaults as an editable config file.
pub async fn init(args: InitArgs) -> anyhow::Result<()> {
    let yaml = ConfigFile::defaults().to_yaml()?;
    let contents = format!("{HEADER}{yaml}");
    fs::write_file(&args.path, &contents, args.force).await?;
    eprintln!("created {}", args.path.display());
    Ok(())
}
