//! Single-line build reporting.
//!
//! Every project transition prints one line naming the reason, with
//! paths relativized to the working directory.

use std::path::Path;

use crate::paths::{ProjectId, relative_for_display};
use crate::status::UpToDateStatus;

const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const GREY: &str = "\x1b[90m";
const RESET: &str = "\x1b[0m";

/// What the orchestrator decided to do for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildAction {
    Compile,
    PseudoBuild,
}

pub struct Reporter {
    color: bool,
    quiet: bool,
}

impl Reporter {
    pub fn new(color: bool) -> Self {
        Reporter {
            color,
            quiet: false,
        }
    }

    pub fn quiet(color: bool) -> Self {
        Reporter { color, quiet: true }
    }

    /// Render the up-to-date classification as a single-line reason.
    pub fn status_line(&self, cwd: &Path, id: &ProjectId, status: &UpToDateStatus) -> String {
        let project = self.paint(CYAN, &self.rel(cwd, id.as_path()));
        match status {
            UpToDateStatus::UpToDate { .. } => {
                format!("Project '{project}' is up to date")
            }
            UpToDateStatus::PseudoUpToDate { .. } => format!(
                "Project '{project}' is up to date with its own inputs; upstream outputs changed only timestamps"
            ),
            UpToDateStatus::Missing { output } => format!(
                "Project '{project}' is out of date because output '{}' does not exist",
                self.paint(CYAN, &self.rel(cwd, output))
            ),
            UpToDateStatus::OutOfDate {
                newer_input,
                older_output,
                ..
            } => format!(
                "Project '{project}' is out of date because input '{}' is newer than output '{}'",
                self.paint(CYAN, &self.rel(cwd, newer_input)),
                self.paint(CYAN, &self.rel(cwd, older_output))
            ),
            UpToDateStatus::OlderThanDependency { dependency } => format!(
                "Project '{project}' is out of date because its dependency '{}' needs rebuild",
                self.paint(CYAN, &self.rel(cwd, dependency.as_path()))
            ),
            UpToDateStatus::Unbuildable { missing_input } => format!(
                "{}: project '{project}' cannot be built because input '{}' does not exist",
                self.paint(RED, "error"),
                self.paint(CYAN, &self.rel(cwd, missing_input))
            ),
        }
    }

    pub fn report_status(&self, cwd: &Path, id: &ProjectId, status: &UpToDateStatus) {
        // Errors always surface; routine transitions respect --quiet.
        if matches!(status, UpToDateStatus::Unbuildable { .. }) {
            eprintln!("{}", self.status_line(cwd, id, status));
        } else if !self.quiet {
            println!("{}", self.status_line(cwd, id, status));
        }
    }

    pub fn report_action(&self, cwd: &Path, id: &ProjectId, action: BuildAction, dry: bool) {
        if self.quiet {
            return;
        }
        let project = self.paint(CYAN, &self.rel(cwd, id.as_path()));
        let line = match (action, dry) {
            (BuildAction::Compile, false) => format!("Building project '{project}'"),
            (BuildAction::Compile, true) => {
                format!("{} build project '{project}'", self.paint(GREY, "would"))
            }
            (BuildAction::PseudoBuild, false) => {
                format!("Updating timestamps of project '{project}'")
            }
            (BuildAction::PseudoBuild, true) => format!(
                "{} update timestamps of project '{project}'",
                self.paint(GREY, "would")
            ),
        };
        println!("{line}");
    }

    pub fn warn(&self, message: &str) {
        eprintln!("{}: {message}", self.paint(YELLOW, "warning"));
    }

    pub fn error(&self, message: &str) {
        eprintln!("{}: {message}", self.paint(RED, "error"));
    }

    fn rel(&self, cwd: &Path, path: &Path) -> String {
        relative_for_display(cwd, path).display().to_string()
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::UNIX_EPOCH;

    fn pid(name: &str) -> ProjectId {
        ProjectId::new(Path::new("/repo"), Path::new(name))
    }

    #[test]
    fn up_to_date_line_is_plain_without_color() {
        let reporter = Reporter::new(false);
        let line = reporter.status_line(
            Path::new("/repo"),
            &pid("app/tsconfig.json"),
            &UpToDateStatus::UpToDate {
                newest_input: UNIX_EPOCH,
            },
        );
        assert_eq!(line, "Project 'app/tsconfig.json' is up to date");
    }

    #[test]
    fn out_of_date_line_names_both_files() {
        let reporter = Reporter::new(false);
        let line = reporter.status_line(
            Path::new("/repo"),
            &pid("app/tsconfig.json"),
            &UpToDateStatus::OutOfDate {
                newer_input: PathBuf::from("/repo/app/src/a.ts"),
                newer_input_time: UNIX_EPOCH,
                older_output: PathBuf::from("/repo/app/dist/a.js"),
                older_output_time: UNIX_EPOCH,
            },
        );
        assert_eq!(
            line,
            "Project 'app/tsconfig.json' is out of date because input 'app/src/a.ts' is newer than output 'app/dist/a.js'"
        );
    }

    #[test]
    fn color_wraps_paths_in_escapes() {
        let reporter = Reporter::new(true);
        let line = reporter.status_line(
            Path::new("/repo"),
            &pid("app/tsconfig.json"),
            &UpToDateStatus::UpToDate {
                newest_input: UNIX_EPOCH,
            },
        );
        assert!(line.contains("\x1b[36mapp/tsconfig.json\x1b[0m"));
    }
}
