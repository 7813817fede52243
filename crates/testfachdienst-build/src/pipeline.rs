//! Ordered build stages
//!
//! `compile` → `style-check` → `test` → `coverage-report` → `containerize`.
//! The first failing stage aborts the run and no later stage is started.

use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use anyhow::Context;
use clap::ValueEnum;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::coverage::CoverageReports;
use crate::image::ImageDescriptor;

pub const DOCKERFILE_PATH: &str = "target/docker/Dockerfile";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ImageTarget {
    /// Build and push to the registry
    Registry,
    /// Build into the local docker daemon
    Docker,
    /// Build and save as a tarball
    Tar,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageKind {
    Compile,
    StyleCheck,
    Test,
    CoverageReport,
    Containerize,
}

impl StageKind {
    pub const ALL: [StageKind; 5] = [
        StageKind::Compile,
        StageKind::StyleCheck,
        StageKind::Test,
        StageKind::CoverageReport,
        StageKind::Containerize,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StageKind::Compile => "compile",
            StageKind::StyleCheck => "style-check",
            StageKind::Test => "test",
            StageKind::CoverageReport => "coverage-report",
            StageKind::Containerize => "containerize",
        }
    }

    /// Containerizing reads live project state and always runs
    pub fn cacheable(self) -> bool {
        !matches!(self, StageKind::Containerize)
    }
}

impl Display for StageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl Display for CommandSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stage {
    pub kind: StageKind,
    /// Files written before the commands run
    pub files: Vec<(PathBuf, String)>,
    pub commands: Vec<CommandSpec>,
}

#[derive(Clone, Debug)]
pub struct Plan {
    pub target: ImageTarget,
    pub stages: Vec<Stage>,
}

impl Plan {
    pub fn new(
        target: ImageTarget,
        image: &ImageDescriptor,
        coverage: &CoverageReports,
    ) -> anyhow::Result<Self> {
        let stages = StageKind::ALL
            .into_iter()
            .map(|kind| stage(kind, target, image, coverage))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self { target, stages })
    }
}

fn stage(
    kind: StageKind,
    target: ImageTarget,
    image: &ImageDescriptor,
    coverage: &CoverageReports,
) -> anyhow::Result<Stage> {
    let mut files = Vec::new();
    let commands = match kind {
        StageKind::Compile => vec![CommandSpec::new(
            "cargo",
            ["build", "--workspace", "--release", "--locked"],
        )],
        StageKind::StyleCheck => vec![
            CommandSpec::new("cargo", ["fmt", "--all", "--", "--check"]),
            CommandSpec::new(
                "cargo",
                [
                    "clippy",
                    "--workspace",
                    "--all-targets",
                    "--",
                    "-D",
                    "warnings",
                ],
            ),
        ],
        StageKind::Test => vec![CommandSpec::new(
            "cargo",
            ["llvm-cov", "--workspace", "--no-report"],
        )],
        StageKind::CoverageReport => coverage.commands(),
        StageKind::Containerize => {
            files.push((PathBuf::from(DOCKERFILE_PATH), image.dockerfile()?));
            containerize_commands(target, image)
        }
    };
    Ok(Stage {
        kind,
        files,
        commands,
    })
}

fn containerize_commands(target: ImageTarget, image: &ImageDescriptor) -> Vec<CommandSpec> {
    let references = image.image_references();

    let mut build = vec!["build".to_string(), "-f".to_string(), DOCKERFILE_PATH.to_string()];
    for reference in &references {
        build.push("-t".to_string());
        build.push(reference.clone());
    }
    build.push(".".to_string());

    let mut commands = vec![CommandSpec::new("docker", build)];
    match target {
        ImageTarget::Registry => {
            commands.extend(
                references
                    .iter()
                    .map(|reference| CommandSpec::new("docker", ["push", reference.as_str()])),
            );
        }
        ImageTarget::Docker => {}
        ImageTarget::Tar => {
            let version = image.tags.first().map(String::as_str).unwrap_or("latest");
            let mut save = vec![
                "save".to_string(),
                "-o".to_string(),
                format!("target/testfachdienst-{}.tar", version),
            ];
            save.extend(references);
            commands.push(CommandSpec::new("docker", save));
        }
    }
    commands
}

/// Executes the side effects of a stage
pub trait CommandRunner {
    fn write_file(&mut self, path: &Path, content: &str) -> anyhow::Result<()>;

    fn run(&mut self, command: &CommandSpec) -> anyhow::Result<()>;
}

/// Runs commands as child processes of the current directory
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn write_file(&mut self, path: &Path, content: &str) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    fn run(&mut self, command: &CommandSpec) -> anyhow::Result<()> {
        info!("$ {}", command);
        let status = Command::new(&command.program)
            .args(&command.args)
            .status()
            .with_context(|| format!("Failed to start '{}'", command.program))?;
        if !status.success() {
            anyhow::bail!("'{}' exited with {}", command, status);
        }
        Ok(())
    }
}

/// Records what would be executed
#[derive(Debug, Default)]
pub struct DryRunner {
    pub executed: Vec<String>,
}

impl CommandRunner for DryRunner {
    fn write_file(&mut self, path: &Path, _content: &str) -> anyhow::Result<()> {
        info!("(dry-run) write {}", path.display());
        self.executed.push(format!("write {}", path.display()));
        Ok(())
    }

    fn run(&mut self, command: &CommandSpec) -> anyhow::Result<()> {
        info!("(dry-run) $ {}", command);
        self.executed.push(command.to_string());
        Ok(())
    }
}

#[derive(Debug, Error)]
#[error("stage '{stage}' failed: {error:#}")]
pub struct PipelineError {
    pub stage: StageKind,
    pub completed: Vec<StageKind>,
    pub error: anyhow::Error,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub completed: Vec<StageKind>,
}

impl Plan {
    /// Run every stage in order, stopping at the first failure
    pub fn execute(&self, runner: &mut dyn CommandRunner) -> Result<RunReport, PipelineError> {
        let mut report = RunReport::default();

        for stage in &self.stages {
            let started = Instant::now();
            info!(stage = %stage.kind, cacheable = stage.kind.cacheable(), "Stage started");

            let outcome = stage
                .files
                .iter()
                .try_for_each(|(path, content)| runner.write_file(path, content))
                .and_then(|_| stage.commands.iter().try_for_each(|c| runner.run(c)));

            if let Err(error) = outcome {
                warn!(stage = %stage.kind, error = %error, "Stage failed, aborting build");
                return Err(PipelineError {
                    stage: stage.kind,
                    completed: report.completed,
                    error,
                });
            }

            debug!(
                stage = %stage.kind,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Stage finished"
            );
            report.completed.push(stage.kind);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(target: ImageTarget) -> Plan {
        Plan::new(
            target,
            &ImageDescriptor::for_version("0.1.3"),
            &CoverageReports::default(),
        )
        .unwrap()
    }

    /// Fails every command whose text contains `needle`
    struct FailingRunner {
        needle: &'static str,
        ran: Vec<String>,
    }

    impl CommandRunner for FailingRunner {
        fn write_file(&mut self, _path: &Path, _content: &str) -> anyhow::Result<()> {
            Ok(())
        }

        fn run(&mut self, command: &CommandSpec) -> anyhow::Result<()> {
            let text = command.to_string();
            self.ran.push(text.clone());
            if text.contains(self.needle) {
                anyhow::bail!("exit status: 1");
            }
            Ok(())
        }
    }

    #[test]
    fn test_stage_order() {
        let kinds: Vec<_> = plan(ImageTarget::Docker)
            .stages
            .iter()
            .map(|s| s.kind.name())
            .collect();
        assert_eq!(
            kinds,
            vec!["compile", "style-check", "test", "coverage-report", "containerize"]
        );
    }

    #[test]
    fn test_only_containerize_is_uncacheable() {
        for kind in StageKind::ALL {
            assert_eq!(kind.cacheable(), kind != StageKind::Containerize);
        }
    }

    #[test]
    fn test_style_check_denies_warnings() {
        let plan = plan(ImageTarget::Docker);
        let commands: Vec<_> = plan.stages[1].commands.iter().map(|c| c.to_string()).collect();
        assert_eq!(
            commands,
            vec![
                "cargo fmt --all -- --check",
                "cargo clippy --workspace --all-targets -- -D warnings",
            ]
        );
    }

    #[test]
    fn test_style_failure_aborts_before_tests() {
        let mut runner = FailingRunner {
            needle: "clippy",
            ran: Vec::new(),
        };
        let err = plan(ImageTarget::Registry).execute(&mut runner).unwrap_err();
        assert_eq!(err.stage, StageKind::StyleCheck);
        assert_eq!(err.completed, vec![StageKind::Compile]);
        assert!(!runner.ran.iter().any(|c| c.contains("llvm-cov")));
        assert!(!runner.ran.iter().any(|c| c.starts_with("docker")));
    }

    #[test]
    fn test_failure_blocks_coverage_report() {
        let mut runner = FailingRunner {
            needle: "--no-report",
            ran: Vec::new(),
        };
        let err = plan(ImageTarget::Docker).execute(&mut runner).unwrap_err();
        assert_eq!(err.stage, StageKind::Test);
        assert!(!runner.ran.iter().any(|c| c.contains("llvm-cov report")));
    }

    #[test]
    fn test_registry_target_pushes_every_tag() {
        let plan = plan(ImageTarget::Registry);
        let containerize = &plan.stages[4];
        assert_eq!(containerize.files[0].0, PathBuf::from(DOCKERFILE_PATH));

        let pushes: Vec<_> = containerize
            .commands
            .iter()
            .filter(|c| c.args.first().map(String::as_str) == Some("push"))
            .collect();
        assert_eq!(pushes.len(), 2);
        assert!(pushes[1].to_string().ends_with(":latest"));
    }

    #[test]
    fn test_tar_target_saves_archive() {
        let plan = plan(ImageTarget::Tar);
        let last = plan.stages[4].commands.last().unwrap().to_string();
        assert!(last.starts_with("docker save -o target/testfachdienst-0.1.3.tar "));
    }

    #[test]
    fn test_dry_run_completes_every_stage() {
        let mut runner = DryRunner::default();
        let report = plan(ImageTarget::Docker).execute(&mut runner).unwrap();
        assert_eq!(report.completed, StageKind::ALL.to_vec());
        assert!(runner.executed.contains(&format!("write {}", DOCKERFILE_PATH)));
    }

    #[test]
    fn test_process_runner_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("Dockerfile");
        ProcessRunner.write_file(&path, "FROM scratch\n").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "FROM scratch\n");
    }
}
