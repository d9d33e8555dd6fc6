//! Tests driving the `forge` binary

use std::process::{Command, Output};

use camino::Utf8Path;

fn forge(dir: &Utf8Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_forge"))
        .arg("-p")
        .arg(dir)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_init_then_dry_run() {
    let temp_dir = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(temp_dir.path()).unwrap().join("hello");
    std::fs::create_dir(&dir).unwrap();

    let init = forge(&dir, &["init"]);
    assert!(init.status.success(), "{}", String::from_utf8_lossy(&init.stderr));
    assert!(dir.join("forge.toml").is_file());
    assert!(dir.join("src/main.cpp").is_file());
    assert!(stdout(&init).contains("created forge.toml"));

    let dry_run = forge(&dir, &["build", "--dry-run"]);
    assert!(dry_run.status.success(), "{}", String::from_utf8_lossy(&dry_run.stderr));
    let out = stdout(&dry_run);
    assert!(out.contains("Would build the following targets in order:"));
    assert!(out.contains("  - hello (never built)"), "{}", out);
    assert!(!dir.join(".forge").exists());
}

#[test]
fn test_init_refuses_existing_project() {
    let temp_dir = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(temp_dir.path()).unwrap();

    assert!(forge(dir, &["init", "--name", "demo"]).status.success());
    let again = forge(dir, &["init"]);

    assert!(!again.status.success());
}

#[test]
fn test_build_reports_configuration_errors() {
    let temp_dir = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(temp_dir.path()).unwrap();
    std::fs::write(
        dir.join("forge.toml"),
        r#"
[[targets]]
name = "app"
kind = "executable"
sources = ["main.c"]
deps = ["missing"]
"#,
    )
    .unwrap();
    std::fs::write(dir.join("main.c"), "int main(void) { return 0; }\n").unwrap();

    let output = forge(dir, &["build"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing"), "{}", stderr);
}

#[cfg(unix)]
#[test]
fn test_run_forwards_exit_status() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(temp_dir.path()).unwrap();

    // The "object" of a shell script is the script itself, and linking
    // one object yields an executable copy of it
    let linker = dir.join("ld.sh");
    std::fs::write(
        &linker,
        "#!/bin/sh\nwhile [ $# -gt 0 ]; do\n  case \"$1\" in\n    -o) out=\"$2\"; shift 2 ;;\n    *) in=\"$1\"; shift ;;\n  esac\ndone\ncat \"$in\" > \"$out\"\nchmod +x \"$out\"\n",
    )
    .unwrap();
    std::fs::set_permissions(&linker, std::fs::Permissions::from_mode(0o755)).unwrap();
    std::fs::write(
        dir.join("cc.sh"),
        "while [ $# -gt 0 ]; do\n  case \"$1\" in\n    -c) src=\"$2\"; shift 2 ;;\n    -o) obj=\"$2\"; shift 2 ;;\n    *) shift ;;\n  esac\ndone\ncat \"$src\" > \"$obj\"\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("forge.toml"),
        format!(
            r#"
[toolchain]
compiler = "{dir}/cc.sh"
linker = "{dir}/ld.sh"
launcher = "sh"

[[targets]]
name = "app"
kind = "executable"
sources = ["main.c"]
"#
        ),
    )
    .unwrap();
    std::fs::write(dir.join("main.c"), "#!/bin/sh\nexit 7\n").unwrap();

    let output = forge(dir, &["run"]);

    assert_eq!(output.status.code(), Some(7));
}
