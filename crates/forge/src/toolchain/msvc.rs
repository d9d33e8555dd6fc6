//! MSVC-style toolchain (cl, link, lib)

use camino::{Utf8Path, Utf8PathBuf};

use super::{
    BuildOptions, Invocation, OptLevel, Toolchain, ToolchainConfig, ToolchainKind, WarningLevel,
    write_depfile,
};
use crate::build::{CommandOutput, CompileJob, LinkJob};
use crate::target::TargetKind;
use crate::{Error, Result};

/// Prefix cl.exe prints for every header when given `/showIncludes`
const SHOW_INCLUDES_PREFIX: &str = "Note: including file:";

/// Standards accepted by `/std:`
const STANDARDS: &[&str] = &["c++14", "c++17", "c++20", "c++latest", "c11", "c17"];

/// cl.exe with link.exe and lib.exe
#[derive(Debug, Clone)]
pub struct MsvcToolchain {
    compiler: String,
    linker: String,
    archiver: String,
    launcher: Option<String>,
}

impl MsvcToolchain {
    pub fn from_config(config: &ToolchainConfig) -> Self {
        Self {
            compiler: config.compiler.clone().unwrap_or_else(|| "cl".to_string()),
            linker: config.linker.clone().unwrap_or_else(|| "link".to_string()),
            archiver: config.archiver.clone().unwrap_or_else(|| "lib".to_string()),
            launcher: config.launcher.clone(),
        }
    }

    fn unsupported(option: impl std::fmt::Display) -> Error {
        Error::unsupported_option(option.to_string(), ToolchainKind::Msvc.to_string())
    }
}

/// Split `/showIncludes` notes out of compiler stdout.
///
/// Returns the included headers and the remaining output.
pub(crate) fn split_show_includes(stdout: &str) -> (Vec<Utf8PathBuf>, String) {
    let mut headers = Vec::new();
    let mut rest = String::new();

    for line in stdout.lines() {
        match line.strip_prefix(SHOW_INCLUDES_PREFIX) {
            Some(path) => {
                let header = Utf8PathBuf::from(path.trim());
                if !headers.contains(&header) {
                    headers.push(header);
                }
            }
            None => {
                rest.push_str(line);
                rest.push('\n');
            }
        }
    }

    (headers, rest)
}

impl Toolchain for MsvcToolchain {
    fn kind(&self) -> ToolchainKind {
        ToolchainKind::Msvc
    }

    fn identity(&self) -> String {
        format!(
            "msvc compiler={} linker={} archiver={} launcher={}",
            self.compiler,
            self.linker,
            self.archiver,
            self.launcher.as_deref().unwrap_or("")
        )
    }

    fn programs(&self) -> Vec<String> {
        let mut programs = vec![self.compiler.clone(), self.linker.clone(), self.archiver.clone()];
        if let Some(launcher) = &self.launcher {
            programs.push(launcher.clone());
        }
        programs
    }

    fn object_extension(&self) -> &'static str {
        "obj"
    }

    fn artifact_file_name(&self, name: &str, kind: TargetKind) -> String {
        match kind {
            TargetKind::Executable => format!("{}.exe", name),
            TargetKind::StaticLibrary => format!("{}.lib", name),
            TargetKind::SharedLibrary => format!("{}.dll", name),
        }
    }

    fn link_input(&self, artifact: &Utf8Path, kind: TargetKind) -> Option<Utf8PathBuf> {
        match kind {
            TargetKind::Executable => None,
            TargetKind::StaticLibrary => Some(artifact.to_path_buf()),
            // Dependents link against the import library written next to the DLL
            TargetKind::SharedLibrary => Some(artifact.with_extension("lib")),
        }
    }

    fn compile_flags(&self, options: &BuildOptions) -> Result<Vec<String>> {
        let mut flags = Vec::new();

        if let Some(level) = options.optimization {
            let flag = match level {
                OptLevel::None => "/Od",
                OptLevel::O2 => "/O2",
                OptLevel::O3 => "/Ox",
                OptLevel::Size => "/O1",
                OptLevel::O1 | OptLevel::Fast => {
                    return Err(Self::unsupported(format!("optimization = \"{}\"", level)));
                }
            };
            flags.push(flag.to_string());
        }

        if let Some(level) = options.warnings {
            let warning_flags: &[&str] = match level {
                WarningLevel::None => &["/W0"],
                WarningLevel::Default => &["/W1"],
                WarningLevel::All => &["/W3"],
                WarningLevel::Extra => &["/W4"],
                WarningLevel::Error => &["/W4", "/WX"],
            };
            flags.extend(warning_flags.iter().map(|f| f.to_string()));
        }

        if let Some(standard) = &options.standard {
            if !STANDARDS.contains(&standard.as_str()) {
                return Err(Self::unsupported(format!("standard = \"{}\"", standard)));
            }
            flags.push(format!("/std:{}", standard));
        }

        if options.debug_info == Some(true) {
            flags.push("/Z7".to_string());
        }

        for dir in &options.include_dirs {
            flags.push(format!("/I{}", dir));
        }

        for define in &options.defines {
            flags.push(format!("/D{}", define));
        }

        flags.extend(options.extra_flags.iter().cloned());

        Ok(flags)
    }

    fn compile_invocation(&self, job: &CompileJob) -> Result<Invocation> {
        Ok(Invocation::new(&self.compiler)
            .args(["/nologo", "/showIncludes"])
            .args(self.compile_flags(&job.options)?)
            .args([
                "/c".to_string(),
                job.source.to_string(),
                format!("/Fo{}", job.object),
            ])
            .launched_by(self.launcher.as_deref()))
    }

    fn link_invocation(&self, job: &LinkJob) -> Result<Invocation> {
        let objects = job.objects.iter().map(|o| o.to_string());
        let out = format!("/OUT:{}", job.output);

        if job.kind == TargetKind::StaticLibrary {
            return Ok(Invocation::new(&self.archiver)
                .args(["/nologo".to_string(), out])
                .args(objects));
        }

        let mut invocation = Invocation::new(&self.linker).arg("/nologo");
        if job.kind == TargetKind::SharedLibrary {
            invocation = invocation.arg("/DLL");
        }

        Ok(invocation
            .arg(out)
            .args(objects)
            .args(job.libraries.iter().map(|l| l.to_string()))
            .args(job.options.libs.iter().map(|l| format!("{}.lib", l)))
            .args(job.options.link_flags.iter().cloned()))
    }

    fn capture_header_dependencies(
        &self,
        job: &CompileJob,
        output: &mut CommandOutput,
    ) -> Result<()> {
        let (headers, rest) = split_show_includes(&output.stdout);
        output.stdout = rest;

        let mut prerequisites = vec![job.source.clone()];
        prerequisites.extend(headers);
        std::fs::write(&job.depfile, write_depfile(&job.object, &prerequisites))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toolchain() -> MsvcToolchain {
        MsvcToolchain::from_config(&ToolchainConfig::default())
    }

    fn job(options: BuildOptions) -> CompileJob {
        CompileJob::new(
            "demo",
            TargetKind::Executable,
            Utf8PathBuf::from("src\\a.cpp"),
            Utf8PathBuf::from("build\\obj\\a.cpp.obj"),
            options,
        )
    }

    #[test]
    fn test_compile_invocation() {
        let options = BuildOptions {
            optimization: Some(OptLevel::O2),
            warnings: Some(WarningLevel::Error),
            standard: Some("c++17".to_string()),
            include_dirs: vec![Utf8PathBuf::from("include")],
            defines: vec!["UNICODE".to_string()],
            ..Default::default()
        };

        let invocation = toolchain().compile_invocation(&job(options)).unwrap();

        assert_eq!(invocation.program, "cl");
        assert_eq!(
            invocation.args,
            vec![
                "/nologo", "/showIncludes", "/O2", "/W4", "/WX", "/std:c++17", "/Iinclude",
                "/DUNICODE", "/c", "src\\a.cpp", "/Fobuild\\obj\\a.cpp.obj"
            ]
        );
    }

    #[test]
    fn test_unsupported_optimization() {
        let options = BuildOptions {
            optimization: Some(OptLevel::Fast),
            ..Default::default()
        };

        match toolchain().compile_flags(&options) {
            Err(Error::UnsupportedOption { option, toolchain }) => {
                assert_eq!(option, "optimization = \"fast\"");
                assert_eq!(toolchain, "msvc");
            }
            other => panic!("expected UnsupportedOption, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_standard() {
        let options = BuildOptions {
            standard: Some("gnu++17".to_string()),
            ..Default::default()
        };

        assert!(matches!(
            toolchain().compile_flags(&options),
            Err(Error::UnsupportedOption { .. })
        ));
    }

    #[test]
    fn test_link_invocations() {
        let toolchain = toolchain();
        let mut link = LinkJob {
            target: "app".to_string(),
            kind: TargetKind::Executable,
            objects: vec![Utf8PathBuf::from("a.obj")],
            libraries: vec![Utf8PathBuf::from("core.lib")],
            output: Utf8PathBuf::from("app.exe"),
            options: BuildOptions {
                libs: vec!["user32".to_string()],
                ..Default::default()
            },
        };

        let exe = toolchain.link_invocation(&link).unwrap();
        assert_eq!(exe.program, "link");
        assert_eq!(
            exe.args,
            vec!["/nologo", "/OUT:app.exe", "a.obj", "core.lib", "user32.lib"]
        );

        link.kind = TargetKind::SharedLibrary;
        let dll = toolchain.link_invocation(&link).unwrap();
        assert_eq!(dll.args[1], "/DLL");

        link.kind = TargetKind::StaticLibrary;
        link.output = Utf8PathBuf::from("app.lib");
        let lib = toolchain.link_invocation(&link).unwrap();
        assert_eq!(lib.program, "lib");
        assert_eq!(lib.args, vec!["/nologo", "/OUT:app.lib", "a.obj"]);
    }

    #[test]
    fn test_shared_library_link_input_is_import_library() {
        let input = toolchain()
            .link_input(Utf8Path::new("build/net.dll"), TargetKind::SharedLibrary)
            .unwrap();
        assert_eq!(input, Utf8PathBuf::from("build/net.lib"));
    }

    #[test]
    fn test_split_show_includes() {
        let stdout = "a.cpp\nNote: including file: C:\\inc\\a.h\nNote: including file:  C:\\inc\\b.h\na.cpp(3): warning C4100: unused\n";

        let (headers, rest) = split_show_includes(stdout);

        assert_eq!(
            headers,
            vec![Utf8PathBuf::from("C:\\inc\\a.h"), Utf8PathBuf::from("C:\\inc\\b.h")]
        );
        assert_eq!(rest, "a.cpp\na.cpp(3): warning C4100: unused\n");
    }

    #[test]
    fn test_capture_header_dependencies_writes_depfile() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(temp_dir.path()).unwrap();
        let job = CompileJob::new(
            "demo",
            TargetKind::Executable,
            dir.join("a.cpp"),
            dir.join("a.cpp.obj"),
            BuildOptions::default(),
        );
        let mut output = CommandOutput {
            success: true,
            code: Some(0),
            stdout: format!("a.cpp\nNote: including file: {}\n", dir.join("a.h")),
            stderr: String::new(),
        };

        let toolchain = toolchain();
        toolchain.capture_header_dependencies(&job, &mut output).unwrap();

        assert_eq!(output.stdout, "a.cpp\n");
        assert_eq!(
            toolchain.discover_header_dependencies(&job).unwrap(),
            vec![dir.join("a.h")]
        );
    }
}
