use clap::Parser;
use std::path::PathBuf;

use crate::viz::VizMode;

/// CLI arguments for the tsbuild binary.
#[derive(Parser, Debug)]
#[command(
    name = "tsbuild",
    version,
    about = "Incremental build orchestrator for TypeScript project references"
)]
pub struct CliArgs {
    /// Project configuration files, directories, or globs to build.
    #[arg(value_name = "PROJECT")]
    pub roots: Vec<String>,

    /// Add a root project; may repeat.
    #[arg(short = 'p', long = "project", value_name = "FILE")]
    pub project: Vec<PathBuf>,

    /// Plan the build without compiling or touching files.
    #[arg(short = 'd', long)]
    pub dry: bool,

    /// Rebuild every project regardless of up-to-date status.
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Stay resident and rebuild when inputs or configurations change.
    #[arg(short = 'w', long)]
    pub watch: bool,

    /// Emit a dependency graph to project-graph.svg and exit.
    #[arg(
        long,
        value_name = "MODE",
        value_enum,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "flat"
    )]
    pub viz: Option<VizMode>,

    /// Compiler executable to invoke (default: tsc, or $TSBUILD_COMPILER).
    #[arg(long, value_name = "PATH")]
    pub compiler: Option<PathBuf>,

    /// Log everything the orchestrator decides.
    #[arg(long)]
    pub verbose: bool,

    /// Only print errors.
    #[arg(long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_flags() {
        let args = CliArgs::parse_from(["tsbuild", "-d", "-f", "-w"]);
        assert!(args.dry);
        assert!(args.force);
        assert!(args.watch);
    }

    #[test]
    fn project_flag_repeats() {
        let args = CliArgs::parse_from(["tsbuild", "-p", "a/tsconfig.json", "-p", "b"]);
        assert_eq!(
            args.project,
            vec![PathBuf::from("a/tsconfig.json"), PathBuf::from("b")]
        );
    }

    #[test]
    fn viz_defaults_to_flat() {
        let args = CliArgs::parse_from(["tsbuild", "--viz"]);
        assert_eq!(args.viz, Some(VizMode::Flat));

        let args = CliArgs::parse_from(["tsbuild", "--viz=deep"]);
        assert_eq!(args.viz, Some(VizMode::Deep));

        let args = CliArgs::parse_from(["tsbuild"]);
        assert_eq!(args.viz, None);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(CliArgs::try_parse_from(["tsbuild", "--quiet", "--verbose"]).is_err());
    }

    #[test]
    fn positional_roots_pass_through() {
        let args = CliArgs::parse_from(["tsbuild", "packages/*/tsconfig.json", "apps"]);
        assert_eq!(args.roots, vec!["packages/*/tsconfig.json", "apps"]);
    }
}
