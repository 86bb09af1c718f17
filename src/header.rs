//! The tiny metadata sidecar holding a table's three bookkeeping counters:
//! physical block count `P`, index length `L`, and logical record count
//! `N`.

use std::{
    convert::{TryFrom, TryInto},
    fs,
    io::{Read, Seek, SeekFrom, Write},
};

use crate::{err_at, Error, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Header {
    /// Number of physical blocks ever allocated in the data file.
    pub(crate) p: u32,
    /// Number of used index slots.
    pub(crate) l: u32,
    /// Total number of logical records.
    pub(crate) n: i64,
}

const HEADER_BYTES: usize = 12;

impl Header {
    pub(crate) fn load(fd: &mut fs::File) -> Result<Header> {
        let len = err_at!(IOError, fd.metadata())?.len();
        if len as usize != HEADER_BYTES {
            return err_at!(
                InvalidFile,
                msg: "header: sidecar length {} != {}", len, HEADER_BYTES
            );
        }
        err_at!(IOError, fd.seek(SeekFrom::Start(0)))?;
        let mut buf = [0_u8; HEADER_BYTES];
        err_at!(IOError, fd.read_exact(&mut buf))?;

        let p = i32::from_be_bytes(buf[0..4].try_into().unwrap());
        let l = i32::from_be_bytes(buf[4..8].try_into().unwrap());
        let n = i32::from_be_bytes(buf[8..12].try_into().unwrap());

        if p < 0 || l < 0 || n < 0 {
            return err_at!(InvalidFile, msg: "header: negative field p={} l={} n={}", p, l, n);
        }

        Ok(Header {
            p: p as u32,
            l: l as u32,
            n: n as i64,
        })
    }

    pub(crate) fn save(&self, fd: &mut fs::File) -> Result<()> {
        let p = err_at!(Corruption, i32::try_from(self.p), "header: P overflow")?;
        let l = err_at!(Corruption, i32::try_from(self.l), "header: L overflow")?;
        let n = err_at!(Corruption, i32::try_from(self.n), "header: N overflow")?;

        let mut buf = Vec::with_capacity(HEADER_BYTES);
        buf.extend_from_slice(&p.to_be_bytes());
        buf.extend_from_slice(&l.to_be_bytes());
        buf.extend_from_slice(&n.to_be_bytes());

        err_at!(IOError, fd.set_len(0))?;
        err_at!(IOError, fd.seek(SeekFrom::Start(0)))?;
        err_at!(IOError, fd.write_all(&buf))?;
        err_at!(IOError, fd.sync_all())
    }
}

#[cfg(test)]
#[path = "header_test.rs"]
mod header_test;
