//! New project scaffolding

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::{CONFIG_FILE, LOCAL_CONFIG_FILE};
use crate::toolchain::ToolchainKind;
use crate::{Error, Result};

const HELLO_WORLD: &str = r#"#include <iostream>

int main() {
    std::cout << "Hello, world!" << std::endl;
    return 0;
}
"#;

/// Contents of a new project's `forge.toml`
pub fn config_template(name: &str, toolchain: ToolchainKind) -> String {
    let warnings = match toolchain {
        ToolchainKind::Gnu => "all",
        ToolchainKind::Msvc => "extra",
    };
    format!(
        r#"[project]
name = "{name}"

[toolchain]
kind = "{toolchain}"

[options]
standard = "c++17"
warnings = "{warnings}"
include_dirs = ["include"]

[[targets]]
name = "{name}"
kind = "executable"
sources = ["src/**/*.cpp", "src/**/*.c"]
"#
    )
}

fn gitignore_template(build_dir: &str, state_dir: &str) -> String {
    format!("/{}/\n/{}/\n/{}\n", build_dir, state_dir, LOCAL_CONFIG_FILE)
}

/// Turn a directory name into a valid target name
fn target_name_from_dir(dir: &Utf8Path) -> String {
    let name: String = dir
        .file_name()
        .unwrap_or("app")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() || name.starts_with('.') {
        "app".to_string()
    } else {
        name
    }
}

/// Create a new project in `dir`.
///
/// Writes `forge.toml`, a hello-world `src/main.cpp`, an empty `include/`
/// directory and a `.gitignore`. Existing sources and `.gitignore` are left
/// alone; an existing `forge.toml` is an error. Returns the files written.
pub fn init_project(
    dir: &Utf8Path,
    name: Option<&str>,
    toolchain: ToolchainKind,
) -> Result<Vec<Utf8PathBuf>> {
    let config_path = dir.join(CONFIG_FILE);
    if config_path.exists() {
        return Err(Error::config(
            format!("{} already exists in {}", CONFIG_FILE, dir),
            "Remove it first, or edit it by hand",
        ));
    }

    std::fs::create_dir_all(dir.join("src"))?;
    std::fs::create_dir_all(dir.join("include"))?;

    let name = match name {
        Some(name) => name.to_string(),
        None => {
            let absolute = dir.canonicalize_utf8().unwrap_or_else(|_| dir.to_path_buf());
            target_name_from_dir(&absolute)
        }
    };

    let mut written = Vec::new();
    let mut write_new = |path: Utf8PathBuf, content: &str| -> Result<()> {
        if path.exists() {
            tracing::info!("Keeping existing {}", path);
            return Ok(());
        }
        std::fs::write(&path, content)?;
        tracing::debug!("Wrote {}", path);
        written.push(path);
        Ok(())
    };

    write_new(config_path, &config_template(&name, toolchain))?;
    write_new(dir.join("src/main.cpp"), HELLO_WORLD)?;
    write_new(dir.join(".gitignore"), &gitignore_template("build", ".forge"))?;

    tracing::info!("Initialized project {} in {}", name, dir);
    Ok(written)
}
