use std::fs;
use std::path::PathBuf;

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|path| path.parent())
        .expect("crates/fuzzboard-app should have a workspace root parent")
        .to_path_buf()
}

#[test]
fn workspace_manifest_lists_every_crate() {
    let root = repo_root();
    let workspace_manifest =
        fs::read_to_string(root.join("Cargo.toml")).expect("read workspace Cargo.toml");

    let entries = fs::read_dir(root.join("crates")).expect("read crates directory");
    for entry in entries {
        let path = entry.expect("read crate entry").path();
        if !path.is_dir() || !path.join("Cargo.toml").exists() {
            continue;
        }

        let crate_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .expect("crate directory name must be valid UTF-8");
        let expected_member = format!("\"crates/{crate_name}\"");
        assert!(
            workspace_manifest.contains(&expected_member),
            "workspace manifest is missing member {expected_member}",
        );
    }
}

#[test]
fn crate_manifests_inherit_workspace_package_settings() {
    let root = repo_root();
    let entries = fs::read_dir(root.join("crates")).expect("read crates directory");
    for entry in entries {
        let manifest_path = entry.expect("read crate entry").path().join("Cargo.toml");
        if !manifest_path.exists() {
            continue;
        }

        let manifest = fs::read_to_string(&manifest_path)
            .unwrap_or_else(|_| panic!("read {}", manifest_path.display()));
        assert!(
            manifest.contains("edition.workspace = true"),
            "{} must inherit the workspace edition",
            manifest_path.display(),
        );
    }
}
