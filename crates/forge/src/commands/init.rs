//! Init command implementation

use crate::scaffold::init_project;
use crate::toolchain::ToolchainKind;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use miette::{IntoDiagnostic, Result};

/// Arguments for the init command
#[derive(Debug, Args)]
pub struct InitArgs {
    /// Directory to initialize (default: the project root)
    pub dir: Option<Utf8PathBuf>,

    /// Project and target name (default: the directory name)
    #[arg(long)]
    pub name: Option<String>,

    /// Toolchain family (gnu or msvc)
    #[arg(long, default_value = "gnu")]
    pub toolchain: ToolchainKind,
}

/// Run the init command
pub fn run(project_root: &Utf8Path, args: InitArgs) -> Result<()> {
    let dir = match &args.dir {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => project_root.join(dir),
        None => project_root.to_path_buf(),
    };

    let written = init_project(&dir, args.name.as_deref(), args.toolchain).into_diagnostic()?;
    for path in &written {
        println!("  created {}", path.strip_prefix(&dir).unwrap_or(path));
    }
    println!("Run `forge build` in {} to build the project", dir);
    Ok(())
}
