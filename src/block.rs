//! The block file and its single in-memory buffer.
//!
//! `BlockStore` owns the data file handle and the one page-sized buffer the
//! whole engine shares. It never decides *which* block should be current;
//! that is [`crate::table::Table`]'s job (via the cursor). All this module
//! does is: load a block, write one back if dirty, and hand out a fresh,
//! as-yet-unwritten block number for allocation.

use std::{convert::TryFrom, fs, io::SeekFrom};

use crate::{err_at, read_file, write_file, Error, Result};

pub(crate) struct BlockStore {
    fd: fs::File,
    block_size: usize,
    buf: Vec<u8>,
    cur_block: Option<u32>,
    dirty: bool,
}

impl BlockStore {
    pub(crate) fn new(fd: fs::File, block_size: usize) -> BlockStore {
        BlockStore {
            fd,
            block_size,
            buf: vec![0_u8; block_size],
            cur_block: None,
            dirty: false,
        }
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Mutable access to the buffer. Callers must call
    /// [`BlockStore::mark_dirty`] after mutating; plain reads should leave
    /// the dirty flag untouched.
    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn current_block(&self) -> Option<u32> {
        self.cur_block
    }

    pub(crate) fn fd(&self) -> &fs::File {
        &self.fd
    }

    /// Load block `n`, writing back the current buffer first if dirty.
    /// No-op if `n` is already the current block.
    pub(crate) fn load(&mut self, n: u32) -> Result<()> {
        if self.cur_block == Some(n) {
            return Ok(());
        }
        self.write_back()?;

        let pos = SeekFrom::Start(n as u64 * self.block_size as u64);
        self.buf = read_file!(self.fd, pos, self.block_size, "block_store: short block read")?;
        self.cur_block = Some(n);
        self.dirty = false;
        Ok(())
    }

    /// Write the buffer back if dirty, clearing the dirty flag.
    pub(crate) fn write_back(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let n = match self.cur_block {
            Some(n) => n,
            None => return err_at!(Corruption, msg: "block_store: dirty buffer has no block number"),
        };
        let pos = SeekFrom::Start(n as u64 * self.block_size as u64);
        write_file!(self.fd, pos, &self.buf, "block_store: short block write")?;
        self.dirty = false;
        Ok(())
    }

    /// Write back the current buffer if dirty, then make block number `n`
    /// current without reading it (its on-disk content, if any, does not
    /// exist yet). The buffer's bytes are left as-is; callers must
    /// overwrite them and call [`BlockStore::mark_dirty`] before the block
    /// is next swapped out.
    pub(crate) fn alloc(&mut self, n: u32) -> Result<()> {
        self.write_back()?;
        self.cur_block = Some(n);
        self.dirty = false;
        Ok(())
    }

    /// Flush any pending write and fsync the underlying file.
    pub(crate) fn sync(&mut self) -> Result<()> {
        self.write_back()?;
        err_at!(IOError, self.fd.sync_all())
    }

    pub(crate) fn block_size(&self) -> usize {
        self.block_size
    }
}

pub(crate) fn block_count(fd: &fs::File, block_size: usize) -> Result<u32> {
    let len = err_at!(IOError, fd.metadata())?.len();
    let blocks = len / block_size as u64;
    err_at!(Corruption, u32::try_from(blocks), "block_store: block count overflow")
}

#[cfg(test)]
#[path = "block_test.rs"]
mod block_test;
