use std::ffi::CString;
use std::fs::{self, Metadata, Permissions};
use std::io;
use std::mem::MaybeUninit;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{chown, MetadataExt, PermissionsExt};
use std::path::Path;

pub fn usage_percent(path: &Path) -> io::Result<f64> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();

    // SAFETY: c_path is NUL-terminated and stat points at writable memory
    // sized for one statvfs struct.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: statvfs returned success, so the struct is initialized.
    let stat = unsafe { stat.assume_init() };

    let frsize = stat.f_frsize as f64;
    let total = stat.f_blocks as f64 * frsize;
    let free = stat.f_bfree as f64 * frsize;
    if total <= 0.0 {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("{} reports zero capacity", path.display()),
        ));
    }
    Ok((total - free) / total * 100.0)
}

pub fn replicate_ownership(reference: &Metadata, target: &Path) -> io::Result<()> {
    chown(target, Some(reference.uid()), Some(reference.gid()))?;
    fs::set_permissions(target, Permissions::from_mode(reference.mode() & 0o7777))
}
