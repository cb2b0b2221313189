#[cfg(unix)]
pub mod unix;

use std::fs::Metadata;
use std::io;
use std::path::Path;

/// Reports how full the filesystem holding a path is.
pub trait UsageProbe {
    /// Used space as a percentage of total space.
    fn usage_percent(&self, path: &Path) -> io::Result<f64>;
}

/// Reads usage from the filesystem itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsUsageProbe;

impl UsageProbe for FsUsageProbe {
    #[cfg(unix)]
    fn usage_percent(&self, path: &Path) -> io::Result<f64> {
        unix::usage_percent(path)
    }

    #[cfg(not(unix))]
    fn usage_percent(&self, _path: &Path) -> io::Result<f64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "disk usage is only available on unix",
        ))
    }
}

/// Always reports the same usage.
#[derive(Debug, Clone, Copy)]
pub struct FixedUsage(pub f64);

impl UsageProbe for FixedUsage {
    fn usage_percent(&self, _path: &Path) -> io::Result<f64> {
        Ok(self.0)
    }
}

/// Copy owner, group and mode bits from `reference` onto `target`.
#[cfg(unix)]
pub fn replicate_ownership(reference: &Metadata, target: &Path) -> io::Result<()> {
    unix::replicate_ownership(reference, target)
}

#[cfg(not(unix))]
pub fn replicate_ownership(reference: &Metadata, target: &Path) -> io::Result<()> {
    std::fs::set_permissions(target, reference.permissions())
}
