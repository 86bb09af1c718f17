//! Small file-system helpers shared by [`crate::block`], [`crate::pindex`]
//! and [`crate::header`].

use std::{ffi, fs, path};

use crate::{err_at, Error, Result};

/// Create a file for read+write, truncating/removing any prior file at
/// that path. Creates parent directories as needed.
pub fn create_file_rw(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = path::Path::new(file);
    fs::remove_file(os_file).ok(); // NOTE: ignore remove errors.

    if let Some(parent) = os_file.parent() {
        err_at!(IOError, fs::create_dir_all(parent))?;
    }

    let mut opts = fs::OpenOptions::new();
    err_at!(IOError, opts.read(true).write(true).create_new(true).open(os_file))
}

/// Open an existing file for read+write.
pub fn open_file_rw(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = path::Path::new(file);
    let mut opts = fs::OpenOptions::new();
    err_at!(IOError, opts.read(true).write(true).open(os_file))
}

/// Open an existing file read-only.
pub fn open_file_r(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = path::Path::new(file);
    err_at!(IOError, fs::OpenOptions::new().read(true).open(os_file))
}

/// Create or truncate a file for read+write. Used for the sidecar files,
/// which are small enough to be rewritten whole on every flush.
pub fn create_file_trunc(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = path::Path::new(file);
    if let Some(parent) = os_file.parent() {
        err_at!(IOError, fs::create_dir_all(parent))?;
    }
    let mut opts = fs::OpenOptions::new();
    err_at!(
        IOError,
        opts.read(true).write(true).create(true).truncate(true).open(os_file)
    )
}

/// Seek to `pos` and read exactly `n` bytes, failing loudly on a short
/// read instead of silently returning a partial buffer.
#[macro_export]
macro_rules! read_file {
    ($fd:expr, $pos:expr, $n:expr, $msg:expr) => {{
        use std::io::{Read, Seek};

        match $fd.seek($pos) {
            Ok(_) => {
                let mut buf = vec![0_u8; $n];
                match $fd.read_exact(&mut buf) {
                    Ok(_) => Ok(buf),
                    Err(err) => $crate::err_at!(IOError, Err(err), $msg),
                }
            }
            Err(err) => $crate::err_at!(IOError, Err(err), $msg),
        }
    }};
}

/// Seek to `pos` and write all of `buf`, failing loudly on a short write.
#[macro_export]
macro_rules! write_file {
    ($fd:expr, $pos:expr, $buf:expr, $msg:expr) => {{
        use std::io::{Seek, Write};

        match $fd.seek($pos) {
            Ok(_) => match $fd.write_all($buf) {
                Ok(_) => Ok(()),
                Err(err) => $crate::err_at!(IOError, Err(err), $msg),
            },
            Err(err) => $crate::err_at!(IOError, Err(err), $msg),
        }
    }};
}
