//! Check command implementation
//!
//! Diagnoses the environment: project configuration, toolchain programs on
//! `PATH` and the state directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::CONFIG_FILE;
use crate::project::Project;
use camino::Utf8Path;
use clap::Args;
use miette::Result;

/// Arguments for the check command
#[derive(Debug, Args)]
pub struct CheckArgs {}

/// Find an executable the way the OS would when spawning `program`
pub fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| {
        let direct = dir.join(program);
        if is_executable(&direct) {
            return Some(direct);
        }
        let suffixed = dir.join(format!("{}{}", program, std::env::consts::EXE_SUFFIX));
        is_executable(&suffixed).then_some(suffixed)
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Run the check command
pub fn run(project_root: &Utf8Path, _args: CheckArgs) -> Result<()> {
    let mut problems = 0;

    if !project_root.join(CONFIG_FILE).exists() {
        println!("[FAIL] no {} in {}", CONFIG_FILE, project_root);
        return Err(miette::miette!("Run `forge init` to create a project"));
    }

    let project = match Project::load(project_root) {
        Ok(project) => {
            println!(
                "[ OK ] {} is valid ({} targets)",
                CONFIG_FILE,
                project.build_order.len()
            );
            project
        }
        Err(e) => {
            println!("[FAIL] {}: {}", CONFIG_FILE, e);
            return Err(miette::miette!("Fix the configuration errors above"));
        }
    };

    let programs: BTreeSet<String> = project
        .graph
        .targets()
        .flat_map(|target| target.toolchain.programs())
        .collect();
    for program in &programs {
        match find_program(program) {
            Some(path) => println!("[ OK ] {} -> {}", program, path.display()),
            None => {
                println!("[FAIL] {} not found on PATH", program);
                problems += 1;
            }
        }
    }

    let state_dir = project.state_dir();
    if state_dir.is_dir() {
        println!("[ OK ] state directory {}", state_dir);
    } else {
        println!("[ -- ] state directory {} does not exist yet (created on first build)", state_dir);
    }

    if problems > 0 {
        return Err(miette::miette!("{} problem(s) found", problems));
    }
    println!("Everything looks good");
    Ok(())
}
