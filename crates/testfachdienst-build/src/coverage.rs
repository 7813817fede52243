//! Coverage report formats
//!
//! XML (Cobertura) and HTML are rendered after the instrumented test run.
//! CSV is not supported and cannot be switched on.

use std::path::{Path, PathBuf};

use crate::pipeline::CommandSpec;

pub const COBERTURA_FILE: &str = "cobertura.xml";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    Xml,
    Html,
    Csv,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverageReports {
    output_dir: PathBuf,
}

impl Default for CoverageReports {
    fn default() -> Self {
        Self::new("target/coverage")
    }
}

impl CoverageReports {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn is_enabled(&self, format: ReportFormat) -> bool {
        !matches!(format, ReportFormat::Csv)
    }

    pub fn enabled_formats(&self) -> Vec<ReportFormat> {
        [ReportFormat::Xml, ReportFormat::Html, ReportFormat::Csv]
            .into_iter()
            .filter(|f| self.is_enabled(*f))
            .collect()
    }

    /// One `cargo llvm-cov report` invocation per enabled format
    pub fn commands(&self) -> Vec<CommandSpec> {
        self.enabled_formats()
            .into_iter()
            .filter_map(|format| match format {
                ReportFormat::Xml => Some(CommandSpec::new(
                    "cargo",
                    [
                        "llvm-cov".to_string(),
                        "report".to_string(),
                        "--cobertura".to_string(),
                        "--output-path".to_string(),
                        self.output_dir.join(COBERTURA_FILE).display().to_string(),
                    ],
                )),
                ReportFormat::Html => Some(CommandSpec::new(
                    "cargo",
                    [
                        "llvm-cov".to_string(),
                        "report".to_string(),
                        "--html".to_string(),
                        "--output-dir".to_string(),
                        self.output_dir.display().to_string(),
                    ],
                )),
                ReportFormat::Csv => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_is_never_enabled() {
        let reports = CoverageReports::default();
        assert!(reports.is_enabled(ReportFormat::Xml));
        assert!(reports.is_enabled(ReportFormat::Html));
        assert!(!reports.is_enabled(ReportFormat::Csv));
        assert_eq!(
            reports.enabled_formats(),
            vec![ReportFormat::Xml, ReportFormat::Html]
        );
    }

    #[test]
    fn test_report_commands() {
        let commands = CoverageReports::new("out").commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(
            commands[0].to_string(),
            "cargo llvm-cov report --cobertura --output-path out/cobertura.xml"
        );
        assert_eq!(
            commands[1].to_string(),
            "cargo llvm-cov report --html --output-dir out"
        );
    }
}
