use anyhow::{Context, Result, bail};
use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use tsbuild::args::CliArgs;
use tsbuild::builder::run_build;
use tsbuild::compile::CommandCompiler;
use tsbuild::files::{expand_glob_root, scan_for_configs};
use tsbuild::paths::{ProjectId, resolve_config_path};
use tsbuild::reporter::Reporter;
use tsbuild::session::{BuildOptions, Session};
use tsbuild::{viz, watch};

const EXIT_SUCCESS: i32 = 0;
const EXIT_BUILD_FAILED: i32 = 1;

fn main() -> Result<()> {
    let args = CliArgs::parse();

    // RUST_LOG wins; otherwise --verbose/--quiet pick the default level.
    let default_level = if args.verbose {
        tracing::Level::DEBUG
    } else if args.quiet {
        tracing::Level::ERROR
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .init();

    let cwd = std::env::current_dir().context("failed to resolve current directory")?;
    let roots = resolve_roots(&args, &cwd)?;

    let compiler_program = args
        .compiler
        .clone()
        .or_else(|| std::env::var_os("TSBUILD_COMPILER").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("tsc"));

    let color = std::io::stdout().is_terminal();
    let reporter = if args.quiet {
        Reporter::quiet(color)
    } else {
        Reporter::new(color)
    };

    let options = BuildOptions {
        force: args.force,
        dry: args.dry,
    };

    let mut session = Session::new(
        cwd,
        roots,
        Box::new(CommandCompiler::new(compiler_program)),
        options,
        reporter,
    )?;

    if let Some(mode) = args.viz {
        viz::render(&mut session, mode)?;
        std::process::exit(EXIT_SUCCESS);
    }

    let success = run_build(&mut session)?;

    if args.watch {
        watch::run(&mut session)?;
        std::process::exit(EXIT_SUCCESS);
    }

    if success {
        std::process::exit(EXIT_SUCCESS);
    }
    std::process::exit(EXIT_BUILD_FAILED);
}

/// Turn positional arguments and `--project` flags into root project
/// ids: files pass through, directories are scanned recursively for
/// `tsconfig.json`, and anything that names no existing path is
/// treated as a glob.
fn resolve_roots(args: &CliArgs, cwd: &Path) -> Result<Vec<ProjectId>> {
    let mut configs: Vec<PathBuf> = Vec::new();

    for root in &args.roots {
        let path = cwd.join(root);
        if path.is_file() {
            configs.push(path);
        } else if path.is_dir() {
            let found = scan_for_configs(&path)?;
            if found.is_empty() {
                bail!("no tsconfig.json found under {}", path.display());
            }
            configs.extend(found);
        } else {
            let matches = expand_glob_root(cwd, root)?;
            if matches.is_empty() {
                bail!("no projects matched '{root}'");
            }
            configs.extend(matches);
        }
    }

    for project in &args.project {
        configs.push(resolve_config_path(cwd, project));
    }

    if configs.is_empty() {
        let default = cwd.join("tsconfig.json");
        if default.is_file() {
            configs.push(default);
        } else {
            let found = scan_for_configs(cwd)?;
            if found.is_empty() {
                bail!("no tsconfig.json found under {}", cwd.display());
            }
            configs.extend(found);
        }
    }

    let mut roots = Vec::new();
    for config in configs {
        let id = ProjectId::new(cwd, &config);
        if !roots.contains(&id) {
            roots.push(id);
        }
    }
    Ok(roots)
}
