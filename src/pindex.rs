//! The sparse block index: `firstPre[0..L)` / `blockNo[0..L)`, its sidecar
//! (de)serialization, and the biased binary search used to locate a
//! logical position within it.

use std::{
    convert::{TryFrom, TryInto},
    fs,
    io::{Read, Seek, SeekFrom, Write},
};

use crate::{err_at, Error, Result};

/// `(firstPre[i], blockNo[i])` pairs. Always at least one entry long, even
/// for an empty table, so there is never a distinguished "no current
/// block" state to handle separately.
pub(crate) struct PIndex {
    pub(crate) first_pre: Vec<i64>,
    pub(crate) block_no: Vec<u32>,
}

impl PIndex {
    /// The index for a brand new, empty table: one slot naming block 0.
    pub(crate) fn empty() -> PIndex {
        PIndex {
            first_pre: vec![0],
            block_no: vec![0],
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.first_pre.len()
    }

    /// Upper bound (exclusive) of slot `i`'s window, given the table's
    /// total record count `n`.
    pub(crate) fn next_pre(&self, i: usize, n: i64) -> i64 {
        if i + 1 < self.len() {
            self.first_pre[i + 1]
        } else {
            n
        }
    }

    /// Locate the slot whose window `[firstPre[i], next)` contains `pre`.
    /// `hint` is probed first (the "hot restart" from the cursor's last
    /// position) before falling back to a plain binary search over
    /// `[0, L)`. `pre == -1` is the sentinel meaning "before slot 0" and
    /// always resolves to slot 0.
    pub(crate) fn search(&self, pre: i64, hint: usize, n: i64) -> Result<usize> {
        let l = self.len();
        if pre == -1 {
            return Ok(0);
        }

        let window = |i: usize| -> (i64, i64) { (self.first_pre[i], self.next_pre(i, n)) };

        if hint < l {
            let (lo, hi) = window(hint);
            if pre >= lo && pre < hi {
                return Ok(hint);
            }
        }

        let (mut lo, mut hi) = (0_i64, l as i64 - 1);
        while lo <= hi {
            let mid = ((lo + hi) / 2) as usize;
            let (wlo, whi) = window(mid);
            if pre < wlo {
                hi = mid as i64 - 1;
            } else if pre >= whi {
                lo = mid as i64 + 1;
            } else {
                return Ok(mid);
            }
        }

        err_at!(
            Corruption,
            msg: "pindex: cursor could not locate pre={} among L={} slots (lo={}, hi={})",
            pre,
            l,
            lo,
            hi
        )
    }

    /// Check that `firstPre` is non-decreasing and starts at zero, and
    /// that no slot holds more than `e` records given the table's total
    /// record count `n`.
    pub(crate) fn validate(&self, n: i64, e: usize) -> Result<()> {
        let l = self.len();
        if l == 0 {
            return err_at!(Corruption, msg: "pindex: L must never be zero");
        }
        if self.first_pre[0] != 0 {
            return err_at!(Corruption, msg: "pindex: firstPre[0] = {} != 0", self.first_pre[0]);
        }
        for i in 0..l - 1 {
            // A split whose insertion point lands exactly at a block's
            // start (`ins == 0`) always allocates a fresh block for the
            // head rather than special-casing it away, which can leave a
            // zero-width slot (`firstPre[i] == firstPre[i+1]`) behind.
            // Harmless — such a slot's window is empty and never matches
            // any `pre` — but not strictly ascending, so only reject an
            // actual decrease here.
            if self.first_pre[i] > self.first_pre[i + 1] {
                return err_at!(
                    Corruption,
                    msg: "pindex: firstPre decreasing at {}", i
                );
            }
            let fill = self.first_pre[i + 1] - self.first_pre[i];
            if fill > e as i64 {
                return err_at!(Corruption, msg: "pindex: slot {} overfull ({} > {})", i, fill, e);
            }
        }
        let last_fill = n - self.first_pre[l - 1];
        if last_fill > e as i64 || last_fill < 0 {
            return err_at!(
                Corruption,
                msg: "pindex: last slot fill {} out of range (E={})", last_fill, e
            );
        }
        Ok(())
    }

    pub(crate) fn load(fd: &mut fs::File) -> Result<PIndex> {
        let len = err_at!(IOError, fd.metadata())?.len();
        if len % 8 != 0 {
            return err_at!(InvalidFile, msg: "pindex: sidecar length {} not a multiple of 8", len);
        }
        err_at!(IOError, fd.seek(SeekFrom::Start(0)))?;

        let mut buf = vec![0_u8; len as usize];
        err_at!(IOError, fd.read_exact(&mut buf))?;

        let l = buf.len() / 8;
        let mut first_pre = Vec::with_capacity(l);
        let mut block_no = Vec::with_capacity(l);
        for i in 0..l {
            let off = i * 8;
            let fp = i32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
            let bn = i32::from_be_bytes(buf[off + 4..off + 8].try_into().unwrap());
            first_pre.push(fp as i64);
            block_no.push(bn as u32);
        }

        if first_pre.is_empty() {
            return err_at!(InvalidFile, msg: "pindex: sidecar has no entries");
        }

        Ok(PIndex { first_pre, block_no })
    }

    pub(crate) fn save(&self, fd: &mut fs::File) -> Result<()> {
        let mut buf = Vec::with_capacity(self.len() * 8);
        for i in 0..self.len() {
            let fp = err_at!(
                Corruption, i32::try_from(self.first_pre[i]), "pindex: firstPre overflow"
            )?;
            let bn = err_at!(
                Corruption, i32::try_from(self.block_no[i]), "pindex: blockNo overflow"
            )?;
            buf.extend_from_slice(&fp.to_be_bytes());
            buf.extend_from_slice(&bn.to_be_bytes());
        }
        err_at!(IOError, fd.set_len(0))?;
        err_at!(IOError, fd.seek(SeekFrom::Start(0)))?;
        err_at!(IOError, fd.write_all(&buf))?;
        err_at!(IOError, fd.sync_all())
    }
}

#[cfg(test)]
#[path = "pindex_test.rs"]
mod pindex_test;
