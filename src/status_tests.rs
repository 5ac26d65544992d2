use filetime::FileTime;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use crate::config::{ConfigCache, ProjectConfig, ProjectReference};
use crate::paths::ProjectId;
use crate::status::{BuildContext, UpToDateStatus, up_to_date_status};

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("failed to create parent directory");
    }
    std::fs::write(path, contents).expect("failed to write file");
}

fn set_mtime(path: &Path, time: SystemTime) {
    filetime::set_file_mtime(path, FileTime::from_system_time(time)).expect("failed to set mtime");
}

fn seconds_ago(secs: u64) -> SystemTime {
    SystemTime::now() - Duration::from_secs(secs)
}

fn project(root: &Path, name: &str) -> ProjectConfig {
    let dir = root.join(name);
    ProjectConfig {
        id: ProjectId::new(root, &dir.join("tsconfig.json")),
        input_files: vec![dir.join("src/index.ts")],
        references: Vec::new(),
        out_dir: Some(dir.join("dist")),
        out_file: None,
        root_dir: Some(dir.join("src")),
        declaration: true,
        strip_internal: false,
        wildcard_directories: Vec::new(),
    }
}

/// Lay the project's source and outputs on disk with the given ages.
fn materialize(config: &ProjectConfig, input_age: u64, output_age: u64) {
    for input in &config.input_files {
        write_file(input, "export const x = 1;\n");
        set_mtime(input, seconds_ago(input_age));
    }
    let out_dir = config.out_dir.as_ref().unwrap();
    for name in ["index.js", "index.d.ts"] {
        let path = out_dir.join(name);
        write_file(&path, "export declare const x: number;\n");
        set_mtime(&path, seconds_ago(output_age));
    }
}

#[test]
fn missing_input_is_unbuildable() {
    let temp = TempDir::new().unwrap();
    let config = project(temp.path(), "a");

    let status = up_to_date_status(&config, &mut ConfigCache::new(), &BuildContext::new()).unwrap();
    assert_eq!(
        status,
        UpToDateStatus::Unbuildable {
            missing_input: config.input_files[0].clone()
        }
    );
}

#[test]
fn zero_input_project_is_always_up_to_date() {
    let temp = TempDir::new().unwrap();
    let mut config = project(temp.path(), "solution");
    config.input_files.clear();
    config.out_dir = None;

    let status = up_to_date_status(&config, &mut ConfigCache::new(), &BuildContext::new()).unwrap();
    assert!(matches!(status, UpToDateStatus::UpToDate { .. }));
}

#[test]
fn absent_output_reports_missing() {
    let temp = TempDir::new().unwrap();
    let config = project(temp.path(), "a");
    write_file(&config.input_files[0], "export const x = 1;\n");

    let status = up_to_date_status(&config, &mut ConfigCache::new(), &BuildContext::new()).unwrap();
    assert_eq!(
        status,
        UpToDateStatus::Missing {
            output: config.out_dir.as_ref().unwrap().join("index.js")
        }
    );
}

#[test]
fn newer_input_reports_out_of_date() {
    let temp = TempDir::new().unwrap();
    let config = project(temp.path(), "a");
    materialize(&config, 10, 100);

    let status = up_to_date_status(&config, &mut ConfigCache::new(), &BuildContext::new()).unwrap();
    match status {
        UpToDateStatus::OutOfDate {
            newer_input,
            older_output,
            ..
        } => {
            assert_eq!(newer_input, config.input_files[0]);
            assert!(older_output.starts_with(config.out_dir.as_ref().unwrap()));
        }
        other => panic!("expected OutOfDate, got {other:?}"),
    }
}

#[test]
fn fresh_outputs_report_up_to_date() {
    let temp = TempDir::new().unwrap();
    let config = project(temp.path(), "a");
    materialize(&config, 100, 10);

    let status = up_to_date_status(&config, &mut ConfigCache::new(), &BuildContext::new()).unwrap();
    assert!(matches!(status, UpToDateStatus::UpToDate { .. }));
}

#[test]
fn upstream_declaration_newer_than_outputs_is_out_of_date() {
    let temp = TempDir::new().unwrap();
    let upstream = project(temp.path(), "core");
    materialize(&upstream, 200, 5);

    let mut consumer = project(temp.path(), "app");
    consumer.references = vec![ProjectReference {
        target: upstream.id.clone(),
        prepend: false,
    }];
    materialize(&consumer, 100, 50);

    let mut cache = ConfigCache::new();
    cache.seed(upstream);

    let status = up_to_date_status(&consumer, &mut cache, &BuildContext::new()).unwrap();
    assert!(matches!(status, UpToDateStatus::OutOfDate { .. }));
}

#[test]
fn recorded_unchanged_output_yields_pseudo_up_to_date() {
    let temp = TempDir::new().unwrap();
    let upstream = project(temp.path(), "core");
    // Upstream was just rebuilt: its outputs are newer than the
    // consumer's, but the declaration bytes did not change.
    materialize(&upstream, 200, 5);

    let mut consumer = project(temp.path(), "app");
    consumer.references = vec![ProjectReference {
        target: upstream.id.clone(),
        prepend: false,
    }];
    materialize(&consumer, 100, 50);

    let upstream_dts = temp.path().join("core/dist/index.d.ts");
    let mut context = BuildContext::new();
    // The declaration was identical to what the consumer last read,
    // back when it carried this older mtime.
    context
        .unchanged_outputs
        .insert(upstream_dts, seconds_ago(300));

    let mut cache = ConfigCache::new();
    cache.seed(upstream);

    let status = up_to_date_status(&consumer, &mut cache, &context).unwrap();
    assert!(
        matches!(status, UpToDateStatus::PseudoUpToDate { .. }),
        "got {status:?}"
    );
}

#[test]
fn unchanged_output_older_than_last_consumption_still_rebuilds() {
    let temp = TempDir::new().unwrap();
    let upstream = project(temp.path(), "core");
    materialize(&upstream, 200, 5);

    let mut consumer = project(temp.path(), "app");
    consumer.references = vec![ProjectReference {
        target: upstream.id.clone(),
        prepend: false,
    }];
    materialize(&consumer, 100, 50);

    let upstream_dts = temp.path().join("core/dist/index.d.ts");
    let mut context = BuildContext::new();
    // Prior mtime is newer than the consumer's outputs: the consumer
    // never saw that version, so the memoization does not apply.
    context.unchanged_outputs.insert(upstream_dts, seconds_ago(20));

    let mut cache = ConfigCache::new();
    cache.seed(upstream);

    let status = up_to_date_status(&consumer, &mut cache, &context).unwrap();
    assert!(matches!(status, UpToDateStatus::OutOfDate { .. }));
}

#[test]
fn marked_dependency_demotes_up_to_date() {
    let temp = TempDir::new().unwrap();
    let upstream = project(temp.path(), "core");
    materialize(&upstream, 200, 100);

    let mut consumer = project(temp.path(), "app");
    consumer.references = vec![ProjectReference {
        target: upstream.id.clone(),
        prepend: false,
    }];
    materialize(&consumer, 100, 10);

    let mut context = BuildContext::new();
    context.projects_needing_build.insert(upstream.id.clone());

    let mut cache = ConfigCache::new();
    cache.seed(upstream.clone());

    let status = up_to_date_status(&consumer, &mut cache, &context).unwrap();
    assert_eq!(
        status,
        UpToDateStatus::OlderThanDependency {
            dependency: upstream.id
        }
    );
}

#[test]
fn plain_reference_js_does_not_affect_out_file_consumer() {
    let temp = TempDir::new().unwrap();
    let upstream = project(temp.path(), "core");
    materialize(&upstream, 200, 100);
    // Fresh JavaScript, old declaration: only concatenated references
    // care about the former.
    set_mtime(&temp.path().join("core/dist/index.js"), seconds_ago(5));

    let mut consumer = project(temp.path(), "app");
    consumer.out_dir = None;
    consumer.out_file = Some(temp.path().join("app/dist/bundle.js"));
    consumer.references = vec![ProjectReference {
        target: upstream.id.clone(),
        prepend: false,
    }];
    write_file(&consumer.input_files[0], "const y = 2;\n");
    set_mtime(&consumer.input_files[0], seconds_ago(100));
    for name in ["bundle.js", "bundle.d.ts"] {
        let path = temp.path().join("app/dist").join(name);
        write_file(&path, "");
        set_mtime(&path, seconds_ago(50));
    }

    let mut cache = ConfigCache::new();
    cache.seed(upstream);

    let status = up_to_date_status(&consumer, &mut cache, &BuildContext::new()).unwrap();
    assert!(
        matches!(status, UpToDateStatus::UpToDate { .. }),
        "got {status:?}"
    );
}

#[test]
fn out_file_consumer_also_tracks_upstream_js() {
    let temp = TempDir::new().unwrap();
    let upstream = project(temp.path(), "core");
    materialize(&upstream, 200, 100);
    // Declaration old, JavaScript freshly rebuilt.
    let upstream_js = temp.path().join("core/dist/index.js");
    set_mtime(&upstream_js, seconds_ago(5));

    let mut consumer = project(temp.path(), "app");
    consumer.out_dir = None;
    consumer.out_file = Some(temp.path().join("app/dist/bundle.js"));
    consumer.references = vec![ProjectReference {
        target: upstream.id.clone(),
        prepend: true,
    }];
    write_file(&consumer.input_files[0], "const y = 2;\n");
    set_mtime(&consumer.input_files[0], seconds_ago(100));
    for name in ["bundle.js", "bundle.d.ts"] {
        let path = temp.path().join("app/dist").join(name);
        write_file(&path, "");
        set_mtime(&path, seconds_ago(50));
    }

    let mut cache = ConfigCache::new();
    cache.seed(upstream);

    let status = up_to_date_status(&consumer, &mut cache, &BuildContext::new()).unwrap();
    match status {
        UpToDateStatus::OutOfDate { newer_input, .. } => {
            assert_eq!(newer_input, PathBuf::from(upstream_js))
        }
        other => panic!("expected OutOfDate via upstream js, got {other:?}"),
    }
}
