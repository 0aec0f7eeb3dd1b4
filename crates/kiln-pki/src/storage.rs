//! On-disk layout: `<storage>/certificates/<prefix>_<base>.{crt,key,csr}`.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use kiln_core::models::certificate::CertificateType;
use kiln_core::{KilnError, KilnResult};
use tracing::debug;

pub const CERTIFICATE_DIR: &str = "certificates";

/// `name` with spaces replaced by underscores, or `common_name` when the
/// name is blank.
pub fn base_name(name: &str, common_name: &str) -> String {
    let name = if name.trim().is_empty() {
        common_name
    } else {
        name
    };
    name.trim().replace(' ', "_")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateFiles {
    pub certificate: PathBuf,
    pub private_key: PathBuf,
    pub csr: PathBuf,
}

impl CertificateFiles {
    pub fn locate(storage: &Path, kind: CertificateType, base_name: &str) -> Self {
        let dir = storage.join(CERTIFICATE_DIR);
        let stem = format!("{}_{}", kind.file_prefix(), base_name);
        Self {
            certificate: dir.join(format!("{stem}.crt")),
            private_key: dir.join(format!("{stem}.key")),
            csr: dir.join(format!("{stem}.csr")),
        }
    }

    /// Write the non-empty parts, owner-only.
    pub fn write(&self, certificate: &str, private_key: &str, csr: &str) -> KilnResult<()> {
        for (path, contents) in [
            (&self.certificate, certificate),
            (&self.private_key, private_key),
            (&self.csr, csr),
        ] {
            if !contents.is_empty() {
                write_private(path, contents)?;
            }
        }
        Ok(())
    }
}

fn io_error(path: &Path, err: std::io::Error) -> KilnError {
    KilnError::Internal(format!("{}: {err}", path.display()))
}

pub(crate) fn write_private(path: &Path, contents: &str) -> KilnResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(|e| io_error(path, e))?;
    // `mode` only applies on creation.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| io_error(path, e))?;
    }
    file.write_all(contents.as_bytes())
        .map_err(|e| io_error(path, e))?;
    debug!(path = %path.display(), "Wrote certificate file");
    Ok(())
}

pub(crate) fn read_optional(path: &Path) -> KilnResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(path, e)),
    }
}
