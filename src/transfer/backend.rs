use std::fs;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, trace};

use crate::config::TransferBackend;
use crate::error::{Error, Result};

/// Moves or copies one file between tiers. Implementations create the
/// destination's parent directories, keep content byte-for-byte, and only
/// remove the source once the destination is complete.
pub trait FileTransfer {
    fn transfer(&self, src: &Path, dst: &Path, remove_source: bool) -> Result<()>;
}

pub fn from_backend(backend: TransferBackend) -> Box<dyn FileTransfer> {
    match backend {
        TransferBackend::Native => Box::new(NativeTransfer),
        TransferBackend::Rsync => Box::new(RsyncTransfer::default()),
    }
}

/// In-process transfer. Moves within a filesystem are renames; anything
/// else is written straight into the destination.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeTransfer;

impl FileTransfer for NativeTransfer {
    fn transfer(&self, src: &Path, dst: &Path, remove_source: bool) -> Result<()> {
        ensure_parent(dst)?;

        if remove_source {
            match fs::rename(src, dst) {
                Ok(()) => {
                    trace!("Renamed {} -> {}", src.display(), dst.display());
                    return Ok(());
                }
                Err(e) if crosses_devices(&e) => {
                    debug!("{} crosses filesystems, copying instead", src.display());
                }
                Err(e) => return Err(e.into()),
            }
        }

        let expected = fs::metadata(src)?.len();
        let copied = copy_preserving_mtime(src, dst)?;
        if copied != expected {
            return Err(Error::SizeMismatch {
                path: dst.to_path_buf(),
                expected,
                actual: copied,
            });
        }

        if remove_source {
            fs::remove_file(src)?;
        }
        Ok(())
    }
}

/// Shells out to `rsync -a --inplace`.
#[derive(Debug, Clone)]
pub struct RsyncTransfer {
    program: String,
}

impl Default for RsyncTransfer {
    fn default() -> Self {
        Self {
            program: "rsync".to_string(),
        }
    }
}

impl FileTransfer for RsyncTransfer {
    fn transfer(&self, src: &Path, dst: &Path, remove_source: bool) -> Result<()> {
        ensure_parent(dst)?;

        let mut cmd = Command::new(&self.program);
        cmd.arg("-a").arg("--inplace");
        if remove_source {
            cmd.arg("--remove-source-files");
        }
        let status = cmd
            .arg(src)
            .arg(dst)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::Transfer(format!(
                "{} exited with {} for {}",
                self.program,
                status,
                src.display()
            )))
        }
    }
}

#[cfg(unix)]
fn crosses_devices(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn crosses_devices(_e: &io::Error) -> bool {
    true
}

fn ensure_parent(dst: &Path) -> io::Result<()> {
    match dst.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn copy_preserving_mtime(src: &Path, dst: &Path) -> io::Result<u64> {
    let copied = fs::copy(src, dst)?;
    let modified = fs::metadata(src)?.modified()?;
    fs::File::options()
        .write(true)
        .open(dst)?
        .set_modified(modified)?;
    Ok(copied)
}
