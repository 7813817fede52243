//! Build pipeline of the Testfachdienst workspace
//!
//! Compiles, style-checks and tests the workspace, renders coverage reports
//! and packages the server binary into a distroless container image.

pub mod coverage;
pub mod image;
pub mod pipeline;

pub use coverage::{CoverageReports, ReportFormat};
pub use image::{ImageDescriptor, ImageError, ImageUser};
pub use pipeline::{
    CommandRunner, CommandSpec, DryRunner, ImageTarget, PipelineError, Plan, ProcessRunner,
    RunReport, Stage, StageKind,
};

/// Workspace version, used as image tag and label
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
