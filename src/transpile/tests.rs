use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use super::group::GroupBackend;
use super::ignore::{self, MissingReason};
use super::perfile::PerFileBackend;
use super::{BackendKind, TranspilerBackend, create_backend, staged_output_path};
use crate::errors::RunnerError;
use crate::utils::normalize_path;

/// A tiny package fixture: manifest + src files, optional runner config.
fn make_package(config: &str) -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let root = normalize_path(temp.path());

    let manifest = if config.is_empty() {
        r#"{ "name": "fixture", "version": "0.0.0" }"#.to_string()
    } else {
        format!(r#"{{ "name": "fixture", "version": "0.0.0", "tsrun": {config} }}"#)
    };
    std::fs::write(root.join("package.json"), manifest).unwrap();

    let src = root.join("src");
    std::fs::create_dir_all(&src).unwrap();
    std::fs::write(src.join("index.ts"), "export const port: number = 8080;\n").unwrap();
    std::fs::write(src.join("util.ts"), "export const name: string = \"up\";\n").unwrap();

    (temp, root)
}

fn staging(temp: &TempDir) -> PathBuf {
    temp.path().join("_staging")
}

// ----------------------------------------------------------------------------
// Group backend
// ----------------------------------------------------------------------------

#[test]
fn test_group_build_covers_siblings() {
    let (temp, root) = make_package("");
    let backend = GroupBackend::new(staging(&temp));

    let snapshot = backend.compile(&root.join("src/index.ts")).unwrap();
    assert_eq!(snapshot.root, root);
    assert!(snapshot.sources.contains(&root.join("src/index.ts")));
    assert!(snapshot.sources.contains(&root.join("src/util.ts")));

    // The sibling is served from cache without another build
    let bodies = backend.file_group(&root.join("src/util.ts")).unwrap();
    assert_eq!(bodies.len(), 2);
    assert!(bodies[&root.join("src/util.ts")].contains("\"up\""));
}

#[test]
fn test_group_skips_node_modules_and_declarations() {
    let (temp, root) = make_package("");
    let dep = root.join("node_modules/dep");
    std::fs::create_dir_all(&dep).unwrap();
    std::fs::write(dep.join("index.ts"), "export const x = 1;\n").unwrap();
    std::fs::write(root.join("src/types.d.ts"), "declare const t: number;\n").unwrap();

    let backend = GroupBackend::new(staging(&temp));
    let snapshot = backend.compile(&root.join("src/index.ts")).unwrap();

    assert_eq!(snapshot.sources.len(), 2);
    assert!(!snapshot.sources.iter().any(|s| s.ends_with("types.d.ts")));
    assert!(
        !snapshot
            .sources
            .iter()
            .any(|s| s.to_string_lossy().contains("node_modules"))
    );
}

#[test]
fn test_compile_inside_node_modules_rejected() {
    let (temp, root) = make_package("");
    let dep = root.join("node_modules/dep");
    std::fs::create_dir_all(&dep).unwrap();
    std::fs::write(dep.join("package.json"), "{}").unwrap();
    std::fs::write(dep.join("index.ts"), "export const x = 1;\n").unwrap();

    let backend = GroupBackend::new(staging(&temp));
    let err = backend.compile(&dep.join("index.ts")).unwrap_err();
    assert!(matches!(err, RunnerError::OutsideProject { .. }));
}

#[test]
fn test_ignored_file_reports_pattern() {
    let (temp, root) = make_package(r#"{ "ignore": ["**/generated/**"] }"#);
    let generated = root.join("src/generated");
    std::fs::create_dir_all(&generated).unwrap();
    std::fs::write(generated.join("api.ts"), "export const g = 1;\n").unwrap();

    let backend = GroupBackend::new(staging(&temp));
    let err = backend.compile(&generated.join("api.ts")).unwrap_err();
    match err {
        RunnerError::Ignored { pattern, path } => {
            assert_eq!(pattern, "**/generated/**");
            assert!(path.ends_with("api.ts"));
        }
        other => panic!("expected ignored error, got {other:?}"),
    }
}

#[test]
fn test_non_source_file_is_outside_project() {
    let (temp, root) = make_package("");
    std::fs::write(root.join("README.md"), "# readme\n").unwrap();

    let backend = GroupBackend::new(staging(&temp));
    let err = backend.compile(&root.join("README.md")).unwrap_err();
    assert!(matches!(err, RunnerError::OutsideProject { .. }));
}

#[test]
fn test_touched_file_recompiled_in_place() {
    let (temp, root) = make_package("");
    let entry = root.join("src/index.ts");
    let backend = GroupBackend::new(staging(&temp));

    backend.compile(&entry).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    std::fs::write(&entry, "export const port: number = 9090;\n").unwrap();

    backend.compile(&entry).unwrap();
    let bodies = backend.file_group(&entry).unwrap();
    assert!(bodies[&entry].contains("9090"));
}

#[test]
fn test_file_added_after_build_accretes() {
    let (temp, root) = make_package("");
    let backend = GroupBackend::new(staging(&temp));
    backend.compile(&root.join("src/index.ts")).unwrap();

    let added = root.join("src/extra.ts");
    std::fs::write(&added, "export const extra = true;\n").unwrap();

    let snapshot = backend.compile(&added).unwrap();
    assert!(snapshot.sources.contains(&added));
    assert_eq!(snapshot.sources.len(), 3);
}

#[test]
fn test_rebuild_refreshes_only_touched_outputs() {
    let (temp, root) = make_package("");
    let entry = root.join("src/index.ts");
    let other = root.join("src/util.ts");
    let backend = GroupBackend::new(staging(&temp));
    backend.compile(&entry).unwrap();

    let staged_other = staged_output_path(&staging(&temp), &root, &other);
    let untouched_before = std::fs::read_to_string(&staged_other).unwrap();

    std::thread::sleep(Duration::from_millis(20));
    std::fs::write(&entry, "export const port: number = 1234;\n").unwrap();
    backend.rebuild();

    let staged_entry = staged_output_path(&staging(&temp), &root, &entry);
    assert!(std::fs::read_to_string(&staged_entry).unwrap().contains("1234"));
    assert_eq!(
        std::fs::read_to_string(&staged_other).unwrap(),
        untouched_before
    );
}

#[test]
fn test_invalidate_drops_groups() {
    let (temp, root) = make_package("");
    let entry = root.join("src/index.ts");
    let backend = GroupBackend::new(staging(&temp));
    backend.compile(&entry).unwrap();

    backend.invalidate_build_set();
    assert!(matches!(
        backend.file_group(&entry),
        Err(RunnerError::OutsideProject { .. })
    ));

    // Next compile rebuilds from scratch
    let snapshot = backend.compile(&entry).unwrap();
    assert_eq!(snapshot.sources.len(), 2);
}

#[test]
fn test_configured_extensions_limit_enumeration() {
    let (temp, root) = make_package(r#"{ "extensions": [".ts"] }"#);
    std::fs::write(root.join("src/widget.jsx"), "export const w = 1;\n").unwrap();

    let backend = GroupBackend::new(staging(&temp));
    let snapshot = backend.compile(&root.join("src/index.ts")).unwrap();
    assert!(!snapshot.sources.iter().any(|s| s.ends_with("widget.jsx")));
}

// ----------------------------------------------------------------------------
// Staging layout
// ----------------------------------------------------------------------------

#[test]
fn test_staging_mirrors_relative_path() {
    let (temp, root) = make_package("");
    let entry = root.join("src/index.ts");
    let backend = GroupBackend::new(staging(&temp));
    backend.compile(&entry).unwrap();

    let staged = staged_output_path(&staging(&temp), &root, &entry);
    assert!(staged.ends_with("src/index.ts.js"), "{}", staged.display());
    assert!(staged.exists());
    assert!(
        std::fs::read_to_string(&staged)
            .unwrap()
            .contains("sourceMappingURL")
    );
}

#[test]
fn test_staging_paths_distinct_per_group() {
    let staging_root = Path::new("/stage");
    let a = staged_output_path(staging_root, Path::new("/ws/app"), Path::new("/ws/app/x.ts"));
    let b = staged_output_path(staging_root, Path::new("/ws/lib"), Path::new("/ws/lib/x.ts"));
    assert_ne!(a, b);
}

// ----------------------------------------------------------------------------
// Ignore diagnostics (invariant: removing the responsible rule admits the file)
// ----------------------------------------------------------------------------

#[test]
fn test_why_missing_pattern_is_the_responsible_one() {
    let (_temp, root) = make_package("");
    let generated = root.join("src/generated");
    std::fs::create_dir_all(&generated).unwrap();
    let target = generated.join("api.ts");
    std::fs::write(&target, "export const g = 1;\n").unwrap();

    let extensions = vec![".ts".to_string()];
    let ignore_list = vec!["**/nope/**".to_string(), "**/generated/**".to_string()];

    let reason = ignore::why_missing(&root, &extensions, &ignore_list, &target);
    let MissingReason::Ignored(pattern) = reason else {
        panic!("expected ignored, got {reason:?}");
    };
    assert_eq!(pattern, "**/generated/**");

    // Globbing with the full ignore list omits the file...
    let with_all = ignore::enumerate(&root, &extensions, &ignore_list).unwrap();
    assert!(!with_all.contains(&target));

    // ...with the responsible rule removed admits it...
    let without_responsible: Vec<String> =
        ignore_list.iter().filter(|p| *p != &pattern).cloned().collect();
    let admitted = ignore::enumerate(&root, &extensions, &without_responsible).unwrap();
    assert!(admitted.contains(&target));

    // ...and with no ignores at all admits it too.
    let unfiltered = ignore::enumerate(&root, &extensions, &[]).unwrap();
    assert!(unfiltered.contains(&target));
}

#[test]
fn test_overlapping_rules_are_not_blamed_alone() {
    let (_temp, root) = make_package("");
    let nested = root.join("src/generated/internal");
    std::fs::create_dir_all(&nested).unwrap();
    let target = nested.join("x.ts");
    std::fs::write(&target, "export const x = 1;\n").unwrap();

    let extensions = vec![".ts".to_string()];
    let ignore_list = vec!["**/generated/**".to_string(), "**/internal/**".to_string()];

    // Removing either rule alone still leaves the file ignored, so neither
    // may be reported as the single responsible pattern
    let reason = ignore::why_missing(&root, &extensions, &ignore_list, &target);
    let MissingReason::Ignored(hint) = reason else {
        panic!("expected ignored, got {reason:?}");
    };
    assert_eq!(hint, "**/generated/**, **/internal/**");
}

#[test]
fn test_why_missing_outside_for_unmatched_extension() {
    let (_temp, root) = make_package("");
    std::fs::write(root.join("notes.txt"), "hi\n").unwrap();

    let reason = ignore::why_missing(
        &root,
        &[".ts".to_string()],
        &[],
        &root.join("notes.txt"),
    );
    assert_eq!(reason, MissingReason::Outside);
}

// ----------------------------------------------------------------------------
// Per-file backend
// ----------------------------------------------------------------------------

#[test]
fn test_perfile_accretes_group() {
    let (temp, root) = make_package("");
    let backend = PerFileBackend::new(staging(&temp));

    let first = backend.compile(&root.join("src/index.ts")).unwrap();
    assert_eq!(first.sources.len(), 1);

    let second = backend.compile(&root.join("src/util.ts")).unwrap();
    assert_eq!(second.root, root);
    assert_eq!(second.sources.len(), 2);

    let bodies = backend.file_group(&root.join("src/index.ts")).unwrap();
    assert_eq!(bodies.len(), 2);
}

#[test]
fn test_perfile_skips_enumeration() {
    let (temp, root) = make_package("");
    // A broken sibling must not break a per-file compile of the entry
    std::fs::write(root.join("src/broken.ts"), "const = ;\n").unwrap();

    let backend = PerFileBackend::new(staging(&temp));
    let snapshot = backend.compile(&root.join("src/index.ts")).unwrap();
    assert_eq!(snapshot.sources.len(), 1);
}

#[test]
fn test_perfile_recompiles_touched_file() {
    let (temp, root) = make_package("");
    let entry = root.join("src/index.ts");
    let backend = PerFileBackend::new(staging(&temp));
    backend.compile(&entry).unwrap();

    std::thread::sleep(Duration::from_millis(20));
    std::fs::write(&entry, "export const port: number = 4321;\n").unwrap();
    backend.compile(&entry).unwrap();

    let bodies = backend.file_group(&entry).unwrap();
    assert!(bodies[&entry].contains("4321"));
}

// ----------------------------------------------------------------------------
// Backend selection
// ----------------------------------------------------------------------------

#[test]
fn test_create_backend_honors_kind() {
    let (temp, root) = make_package("");
    // Per-file: only the requested file is compiled
    let perfile = create_backend(BackendKind::PerFile, staging(&temp));
    let snapshot = perfile.compile(&root.join("src/index.ts")).unwrap();
    assert_eq!(snapshot.sources.len(), 1);

    // Group: siblings come along
    let group = create_backend(BackendKind::Group, temp.path().join("_staging2"));
    let snapshot = group.compile(&root.join("src/index.ts")).unwrap();
    assert_eq!(snapshot.sources.len(), 2);
}
