//! Content fingerprints for sources, headers and options
//!
//! Fingerprints are Blake3 hashes rendered as hex. They are recomputed at the
//! start of every build and compared against the recorded build state.

use std::collections::BTreeMap;
use std::io::Read;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::target::{Target, TargetKind};
use crate::{Error, Result};

/// Fingerprint recorded for a header that no longer exists
pub const MISSING_FINGERPRINT: &str = "missing";

/// A source file as seen at the start of a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path
    pub path: Utf8PathBuf,

    /// Content fingerprint
    pub fingerprint: String,

    /// Headers the source included when last compiled, with their fingerprints
    pub headers: BTreeMap<Utf8PathBuf, String>,
}

impl SourceFile {
    /// Fingerprint a source and the headers it depends on.
    ///
    /// Relative header paths are resolved against `root`, the directory the
    /// compiler runs in.
    pub fn scan(root: &Utf8Path, path: &Utf8Path, headers: &[Utf8PathBuf]) -> Result<Self> {
        let fingerprint = fingerprint_file(path)?;
        let mut source = Self {
            path: path.to_path_buf(),
            fingerprint,
            headers: BTreeMap::new(),
        };
        source.refresh_headers(root, headers);
        Ok(source)
    }

    /// Replace the header set, e.g. after a compile produced a new depfile
    pub fn refresh_headers(&mut self, root: &Utf8Path, headers: &[Utf8PathBuf]) {
        self.headers = headers
            .iter()
            .map(|header| {
                let path = if header.is_absolute() {
                    header.clone()
                } else {
                    root.join(header)
                };
                let fingerprint = fingerprint_header(&path);
                (path, fingerprint)
            })
            .collect();
    }
}

/// Fingerprint the contents of a file
pub fn fingerprint_file(path: &Utf8Path) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    hash_file(&mut hasher, path)?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Fingerprint a header, tolerating headers that were deleted since the
/// last compile
fn fingerprint_header(path: &Utf8Path) -> String {
    match fingerprint_file(path) {
        Ok(fingerprint) => fingerprint,
        Err(e) => {
            tracing::debug!(header = %path, error = %e, "Header is unreadable");
            MISSING_FINGERPRINT.to_string()
        }
    }
}

fn hash_file(hasher: &mut blake3::Hasher, path: &Utf8Path) -> Result<()> {
    let mut file = std::fs::File::open(path)?;
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(())
}

/// Everything besides file contents that shapes a target's artifact
#[derive(Serialize)]
struct EffectiveSettings<'a> {
    kind: TargetKind,
    options: &'a crate::toolchain::BuildOptions,
    deps: &'a [String],
    output: &'a Utf8Path,
    toolchain: String,
}

/// Fingerprint of a target's effective options, toolchain and link inputs
pub fn option_fingerprint(target: &Target) -> Result<String> {
    let settings = EffectiveSettings {
        kind: target.kind,
        options: &target.options,
        deps: &target.deps,
        output: &target.output,
        toolchain: target.toolchain.identity(),
    };
    let encoded = serde_json::to_vec(&settings).map_err(|e| {
        Error::state(
            format!("Failed to encode options of {}: {}", target.name, e),
            "This is likely a bug in forge",
        )
    })?;
    Ok(blake3::hash(&encoded).to_hex().to_string())
}

/// Combined fingerprint over every source, header, the options and the
/// recorded fingerprints of the direct dependencies.
///
/// A dependency's fingerprint covers its own dependencies, so a change
/// anywhere below a target changes the target's fingerprint once rebuilt.
pub fn combined_fingerprint(
    sources: &[SourceFile],
    option_fingerprint: &str,
    dependencies: &BTreeMap<String, String>,
) -> String {
    let mut hasher = blake3::Hasher::new();
    for source in sources {
        hasher.update(source.path.as_str().as_bytes());
        hasher.update(source.fingerprint.as_bytes());
        for (header, fingerprint) in &source.headers {
            hasher.update(header.as_str().as_bytes());
            hasher.update(fingerprint.as_bytes());
        }
    }
    hasher.update(option_fingerprint.as_bytes());
    for (name, fingerprint) in dependencies {
        hasher.update(name.as_bytes());
        hasher.update(fingerprint.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
