//! GNU-style toolchain (gcc, clang)

use super::{BuildOptions, Invocation, OptLevel, Toolchain, ToolchainConfig, ToolchainKind, WarningLevel};
use crate::build::{CompileJob, LinkJob};
use crate::target::TargetKind;
use crate::{Error, Result};

/// Language standards accepted by `-std=`
const C_STANDARDS: &[&str] = &["89", "90", "99", "11", "17", "18", "2x", "23"];
const CXX_STANDARDS: &[&str] = &["98", "03", "11", "14", "17", "20", "2a", "23", "2b", "26", "2c"];

/// gcc/clang compiler driver with an `ar` archiver
#[derive(Debug, Clone)]
pub struct GnuToolchain {
    compiler: String,
    linker: String,
    archiver: String,
    launcher: Option<String>,
}

impl GnuToolchain {
    pub fn from_config(config: &ToolchainConfig) -> Self {
        let compiler = config.compiler.clone().unwrap_or_else(|| "c++".to_string());
        Self {
            linker: config.linker.clone().unwrap_or_else(|| compiler.clone()),
            archiver: config.archiver.clone().unwrap_or_else(|| "ar".to_string()),
            launcher: config.launcher.clone(),
            compiler,
        }
    }

    fn standard_flag(standard: &str) -> Option<String> {
        let supported = ["c++", "gnu++"]
            .iter()
            .find_map(|prefix| standard.strip_prefix(prefix))
            .map(|version| CXX_STANDARDS.contains(&version))
            .or_else(|| {
                ["c", "gnu"]
                    .iter()
                    .find_map(|prefix| standard.strip_prefix(prefix))
                    .map(|version| C_STANDARDS.contains(&version))
            })
            .unwrap_or(false);

        supported.then(|| format!("-std={}", standard))
    }

    fn unsupported(option: impl std::fmt::Display) -> Error {
        Error::unsupported_option(option.to_string(), ToolchainKind::Gnu.to_string())
    }
}

impl Toolchain for GnuToolchain {
    fn kind(&self) -> ToolchainKind {
        ToolchainKind::Gnu
    }

    fn identity(&self) -> String {
        format!(
            "gnu compiler={} linker={} archiver={} launcher={}",
            self.compiler,
            self.linker,
            self.archiver,
            self.launcher.as_deref().unwrap_or("")
        )
    }

    fn programs(&self) -> Vec<String> {
        let mut programs = vec![self.compiler.clone()];
        for program in [&self.linker, &self.archiver] {
            if !programs.contains(program) {
                programs.push(program.clone());
            }
        }
        if let Some(launcher) = &self.launcher {
            programs.push(launcher.clone());
        }
        programs
    }

    fn object_extension(&self) -> &'static str {
        "o"
    }

    fn artifact_file_name(&self, name: &str, kind: TargetKind) -> String {
        match kind {
            TargetKind::Executable => format!("{}{}", name, std::env::consts::EXE_SUFFIX),
            TargetKind::StaticLibrary => format!("lib{}.a", name),
            TargetKind::SharedLibrary => format!(
                "{}{}{}",
                std::env::consts::DLL_PREFIX,
                name,
                std::env::consts::DLL_SUFFIX
            ),
        }
    }

    fn compile_flags(&self, options: &BuildOptions) -> Result<Vec<String>> {
        let mut flags = Vec::new();

        if let Some(level) = options.optimization {
            flags.push(
                match level {
                    OptLevel::None => "-O0",
                    OptLevel::O1 => "-O1",
                    OptLevel::O2 => "-O2",
                    OptLevel::O3 => "-O3",
                    OptLevel::Size => "-Os",
                    OptLevel::Fast => "-Ofast",
                }
                .to_string(),
            );
        }

        if let Some(level) = options.warnings {
            let warning_flags: &[&str] = match level {
                WarningLevel::None => &["-w"],
                WarningLevel::Default => &[],
                WarningLevel::All => &["-Wall"],
                WarningLevel::Extra => &["-Wall", "-Wextra"],
                WarningLevel::Error => &["-Wall", "-Wextra", "-Werror"],
            };
            flags.extend(warning_flags.iter().map(|f| f.to_string()));
        }

        if let Some(standard) = &options.standard {
            let flag = Self::standard_flag(standard)
                .ok_or_else(|| Self::unsupported(format!("standard = \"{}\"", standard)))?;
            flags.push(flag);
        }

        if options.debug_info == Some(true) {
            flags.push("-g".to_string());
        }

        for dir in &options.include_dirs {
            flags.push(format!("-I{}", dir));
        }

        for define in &options.defines {
            flags.push(format!("-D{}", define));
        }

        flags.extend(options.extra_flags.iter().cloned());

        Ok(flags)
    }

    fn compile_invocation(&self, job: &CompileJob) -> Result<Invocation> {
        let mut invocation = Invocation::new(&self.compiler).args(self.compile_flags(&job.options)?);

        if job.kind == TargetKind::SharedLibrary {
            invocation = invocation.arg("-fPIC");
        }

        Ok(invocation
            .args(["-c", job.source.as_str(), "-o", job.object.as_str()])
            .args(["-MMD", "-MF", job.depfile.as_str()])
            .launched_by(self.launcher.as_deref()))
    }

    fn link_invocation(&self, job: &LinkJob) -> Result<Invocation> {
        let objects = job.objects.iter().map(|o| o.to_string());

        if job.kind == TargetKind::StaticLibrary {
            return Ok(Invocation::new(&self.archiver)
                .args(["rcs", job.output.as_str()])
                .args(objects));
        }

        let mut invocation = Invocation::new(&self.linker);
        if job.kind == TargetKind::SharedLibrary {
            invocation = invocation.arg("-shared");
        }

        Ok(invocation
            .args(objects)
            .args(job.libraries.iter().map(|l| l.to_string()))
            .args(["-o", job.output.as_str()])
            .args(job.options.libs.iter().map(|l| format!("-l{}", l)))
            .args(job.options.link_flags.iter().cloned()))
    }
}
