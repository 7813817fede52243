//! `tfd-build` - build, check, test and package the Testfachdienst

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use testfachdienst_build::{
    CommandRunner, CoverageReports, DryRunner, ImageDescriptor, ImageTarget, Plan, ProcessRunner,
    VERSION,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tfd-build", version, about = "Build pipeline of the Testfachdienst")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the workspace version
    PrintVersion,
    /// Print the ordered stages without running them
    Plan {
        #[arg(long, value_enum, default_value = "docker")]
        target: ImageTarget,
    },
    /// Run all stages, aborting on the first failure
    Run {
        #[arg(long, value_enum, default_value = "docker")]
        target: ImageTarget,
        /// Log commands instead of executing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Render the container image descriptor
    Image {
        #[arg(value_enum)]
        format: ImageFormat,
        /// Write to a file instead of stdout
        #[arg(short = 'o', long = "out", value_name = "PATH")]
        out: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ImageFormat {
    Dockerfile,
    OciConfig,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::PrintVersion => println!("{}", VERSION),
        Commands::Plan { target } => {
            let plan = build_plan(target)?;
            for (index, stage) in plan.stages.iter().enumerate() {
                let cache = if stage.kind.cacheable() {
                    ""
                } else {
                    " (never cached)"
                };
                println!("{}. {}{}", index + 1, stage.kind, cache);
                for (path, _) in &stage.files {
                    println!("     write {}", path.display());
                }
                for command in &stage.commands {
                    println!("     {}", command);
                }
            }
        }
        Commands::Run { target, dry_run } => {
            let plan = build_plan(target)?;
            let mut runner: Box<dyn CommandRunner> = if dry_run {
                Box::new(DryRunner::default())
            } else {
                Box::new(ProcessRunner)
            };
            match plan.execute(runner.as_mut()) {
                Ok(report) => info!(stages = report.completed.len(), "Build finished"),
                Err(e) => {
                    error!(stage = %e.stage, "Build failed");
                    return Err(e.into());
                }
            }
        }
        Commands::Image { format, out } => {
            let image = ImageDescriptor::for_version(VERSION);
            let rendered = match format {
                ImageFormat::Dockerfile => image.dockerfile()?,
                ImageFormat::OciConfig => serde_json::to_string_pretty(&image.oci_config()?)?,
            };
            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    info!("Wrote {}", path.display());
                }
                None => print!("{}", rendered),
            }
        }
    }

    Ok(())
}

/// Image metadata is evaluated fresh for every invocation
fn build_plan(target: ImageTarget) -> anyhow::Result<Plan> {
    Plan::new(
        target,
        &ImageDescriptor::for_version(VERSION),
        &CoverageReports::default(),
    )
}
