//! The `Table` engine: cursor, read/write, insert, delete, flush/close.

use fs2::FileExt;

use std::{collections::HashSet, fmt};

use crate::{
    block::{self, BlockStore},
    config::Config,
    err_at,
    header::Header,
    pindex::PIndex,
    util, Error, Result,
};

/// Paged table storage engine: random-access storage for a dense array of
/// fixed-size records addressed by a zero-based logical position `pre`.
///
/// Records are packed into fixed-size blocks and a sparse index maps
/// ranges of `pre` onto block numbers. Only one block is buffered in
/// memory at a time; reads and point writes go through that buffer, while
/// `insert`/`delete` may split a block into several or drop one entirely.
/// Deleted block numbers are never reused, and a freshly opened table
/// always carries at least one index slot, even when empty.
pub struct Table {
    config: Config,
    store: BlockStore,
    index: PIndex,
    header: Header,
    cur_idx: usize,
    index_dirty: bool,
}

/// Read-only snapshot of a table's bookkeeping counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    /// Number of physical blocks ever allocated (monotonically increasing;
    /// deletion leaks block numbers rather than reclaiming them).
    pub p: u32,
    /// Number of used index slots.
    pub l: usize,
    /// Total number of logical records.
    pub n: i64,
    /// Configured fill factor for freshly split blocks.
    pub fill_factor: f32,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "pretable<P={},L={},N={},fill_factor={}>",
            self.p, self.l, self.n, self.fill_factor
        )
    }
}

impl Table {
    /// Create a brand new table under `config.dir`, removing any existing
    /// files at that name. A fresh table holds one physical block (block
    /// 0) and `N = 0` records; the index always keeps at least one slot,
    /// even for an empty table, so there is never a "no current block"
    /// state to special-case.
    pub fn create(config: Config) -> Result<Table> {
        config.validate()?;

        let data_fd = util::create_file_rw(&config.to_data_path())?;
        err_at!(IOError, data_fd.lock_exclusive())?;

        let mut store = BlockStore::new(data_fd, config.block_size);
        store.alloc(0)?;
        store.mark_dirty();
        store.write_back()?;

        let index = PIndex::empty();
        let header = Header { p: 1, l: 1, n: 0 };

        let mut index_fd = util::create_file_trunc(&config.to_index_path())?;
        index.save(&mut index_fd)?;
        let mut header_fd = util::create_file_trunc(&config.to_header_path())?;
        header.save(&mut header_fd)?;

        Ok(Table {
            config,
            store,
            index,
            header,
            cur_idx: 0,
            index_dirty: false,
        })
    }

    /// Open an existing table: load the header, then the index, then pin
    /// the first slot.
    pub fn open(config: Config) -> Result<Table> {
        config.validate()?;

        let data_fd = util::open_file_rw(&config.to_data_path())?;
        err_at!(IOError, data_fd.lock_exclusive())?;

        let mut header_fd = util::open_file_rw(&config.to_header_path())?;
        let header = Header::load(&mut header_fd)?;

        let mut index_fd = util::open_file_rw(&config.to_index_path())?;
        let index = PIndex::load(&mut index_fd)?;

        if index.len() != header.l as usize {
            return err_at!(
                InvalidFile,
                msg: "table: header L={} but index has {} entries", header.l, index.len()
            );
        }

        // A block swap writes its predecessor back (and so extends the
        // file) immediately, ahead of any flush that persists the new P.
        // A table left unflushed after a crash can therefore have trailing
        // blocks the header doesn't know about yet; that's harmless
        // leaked space, not corruption. A file *shorter* than P means a
        // block the index may reference was never actually written.
        let actual_blocks = block::block_count(&data_fd, config.block_size)?;
        if actual_blocks < header.p {
            return err_at!(
                InvalidFile,
                msg: "table: header P={} but data file holds only {} blocks", header.p, actual_blocks
            );
        }

        let mut store = BlockStore::new(data_fd, config.block_size);
        store.load(index.block_no[0])?;

        let table = Table {
            config,
            store,
            index,
            header,
            cur_idx: 0,
            index_dirty: false,
        };
        table.validate()?;
        Ok(table)
    }

    /// Position the buffer over the block containing `pre`. `pre == -1`
    /// is the sentinel for "before the first record" and always resolves
    /// to slot 0, so callers can insert at the very front of the table
    /// without a separate code path.
    fn cursor(&mut self, pre: i64) -> Result<()> {
        let i = self.index.search(pre, self.cur_idx, self.header.n)?;
        if self.store.current_block() != Some(self.index.block_no[i]) {
            self.store.load(self.index.block_no[i])?;
        }
        self.cur_idx = i;
        Ok(())
    }

    fn check_pre(&self, pre: i64) -> Result<()> {
        if pre < 0 || pre >= self.header.n {
            return err_at!(
                InvalidInput,
                msg: "pretable: pre {} out of range [0,{})", pre, self.header.n
            );
        }
        Ok(())
    }

    fn check_off(&self, off: usize, width: usize) -> Result<()> {
        if off + width > self.config.record_size {
            return err_at!(
                InvalidInput,
                msg: "pretable: offset {}+{} exceeds record_size {}",
                off,
                width,
                self.config.record_size
            );
        }
        Ok(())
    }

    fn read_be(&mut self, pre: i64, off: usize, width: usize) -> Result<u64> {
        self.check_pre(pre)?;
        self.check_off(off, width)?;
        self.cursor(pre)?;

        let first_pre_cur = self.index.first_pre[self.cur_idx];
        let byte_off = (pre - first_pre_cur) as usize * self.config.record_size + off;

        let buf = self.store.bytes();
        let mut arr = [0_u8; 8];
        arr[8 - width..].copy_from_slice(&buf[byte_off..byte_off + width]);
        Ok(u64::from_be_bytes(arr))
    }

    fn write_be(&mut self, pre: i64, off: usize, width: usize, v: u64) -> Result<()> {
        self.check_pre(pre)?;
        self.check_off(off, width)?;
        self.cursor(pre)?;

        let first_pre_cur = self.index.first_pre[self.cur_idx];
        let byte_off = (pre - first_pre_cur) as usize * self.config.record_size + off;

        let bytes = v.to_be_bytes();
        let buf = self.store.bytes_mut();
        buf[byte_off..byte_off + width].copy_from_slice(&bytes[8 - width..]);
        self.store.mark_dirty();
        Ok(())
    }

    /// Read a 1-byte big-endian field.
    pub fn read1(&mut self, pre: i64, off: usize) -> Result<u32> {
        Ok(self.read_be(pre, off, 1)? as u32)
    }

    /// Read a 2-byte big-endian field.
    pub fn read2(&mut self, pre: i64, off: usize) -> Result<u32> {
        Ok(self.read_be(pre, off, 2)? as u32)
    }

    /// Read a 4-byte big-endian field.
    pub fn read4(&mut self, pre: i64, off: usize) -> Result<u32> {
        Ok(self.read_be(pre, off, 4)? as u32)
    }

    /// Read the 8-byte big-endian "long" field.
    pub fn read5(&mut self, pre: i64, off: usize) -> Result<u64> {
        self.read_be(pre, off, 8)
    }

    /// Write a 1-byte big-endian field (low byte of `v`).
    pub fn write1(&mut self, pre: i64, off: usize, v: u32) -> Result<()> {
        self.write_be(pre, off, 1, v as u64)
    }

    /// Write a 2-byte big-endian field (low two bytes of `v`).
    pub fn write2(&mut self, pre: i64, off: usize, v: u32) -> Result<()> {
        self.write_be(pre, off, 2, v as u64)
    }

    /// Write a 4-byte big-endian field.
    pub fn write4(&mut self, pre: i64, off: usize, v: u32) -> Result<()> {
        self.write_be(pre, off, 4, v as u64)
    }

    /// Write the 8-byte big-endian "long" field.
    pub fn write5(&mut self, pre: i64, off: usize, v: u64) -> Result<()> {
        self.write_be(pre, off, 8, v)
    }

    /// Add `delta` to every `firstPre[j]` for `j > after_idx`, re-basing the
    /// index after a range insert or delete. Shared by insert (positive
    /// delta) and delete (negative delta).
    fn shift_tail_pre(&mut self, after_idx: usize, delta: i64) {
        for j in (after_idx + 1)..self.index.len() {
            self.index.first_pre[j] += delta;
        }
        self.index_dirty = true;
    }

    /// Remove the `nr` contiguous records `[first, first+nr)`. Records
    /// beyond the deleted range shift down to close the gap; blocks that
    /// empty entirely are dropped from the index, but their physical
    /// block numbers are never reused.
    pub fn delete(&mut self, first: i64, nr: i64) -> Result<()> {
        if nr <= 0 {
            return err_at!(InvalidInput, msg: "delete: nr must be positive, got {}", nr);
        }
        if first < 0 || first + nr > self.header.n {
            return err_at!(
                InvalidInput,
                msg: "delete: range [{},{}) out of bounds (N={})", first, first + nr, self.header.n
            );
        }
        let last = first + nr - 1;
        let r = self.config.record_size;

        self.cursor(first)?;
        let first_pre_cur = self.index.first_pre[self.cur_idx];
        let next_pre_cur = self.index.next_pre(self.cur_idx, self.header.n);

        if last < next_pre_cur {
            // Fast path: the whole range lives in the current block.
            let move_start = (last + 1 - first_pre_cur) as usize * r;
            let move_end = (next_pre_cur - first_pre_cur) as usize * r;
            let dest = (first - first_pre_cur) as usize * r;
            if move_end > move_start {
                let buf = self.store.bytes_mut();
                buf.copy_within(move_start..move_end, dest);
            }
            self.store.mark_dirty();
            self.shift_tail_pre(self.cur_idx, -nr);
            self.header.n -= nr;

            let first_pre_cur2 = self.index.first_pre[self.cur_idx];
            let next_pre_cur2 = self.index.next_pre(self.cur_idx, self.header.n);
            if next_pre_cur2 == first_pre_cur2 && self.index.len() > 1 {
                self.index.first_pre.remove(self.cur_idx);
                self.index.block_no.remove(self.cur_idx);
                if self.cur_idx >= self.index.len() {
                    self.cur_idx = self.index.len() - 1;
                }
                self.store.load(self.index.block_no[self.cur_idx])?;
            }
            return Ok(());
        }

        // Slow path: the range spans multiple blocks.
        let mut from = first - first_pre_cur;
        let mut next_pre_cur = next_pre_cur;
        let mut first_pre_cur = first_pre_cur;

        let mut unused = 0_usize;
        let mut drop_start: Option<usize> = None;
        while next_pre_cur <= last {
            if from == 0 {
                if drop_start.is_none() {
                    drop_start = Some(self.cur_idx);
                }
                unused += 1;
            }
            self.cur_idx += 1;
            if self.cur_idx >= self.index.len() {
                return err_at!(
                    Corruption,
                    msg: "delete: range [{},{}) runs past the index (L={})",
                    first,
                    first + nr,
                    self.index.len()
                );
            }
            self.store.load(self.index.block_no[self.cur_idx])?;
            first_pre_cur = self.index.first_pre[self.cur_idx];
            next_pre_cur = self.index.next_pre(self.cur_idx, self.header.n);
            from = 0;
        }

        if let Some(ds) = drop_start {
            self.index.first_pre.drain(ds..ds + unused);
            self.index.block_no.drain(ds..ds + unused);
            self.cur_idx -= unused;
        }

        let move_start = (last + 1 - first_pre_cur) as usize * r;
        let move_end = (next_pre_cur - first_pre_cur) as usize * r;
        if move_end > move_start {
            let buf = self.store.bytes_mut();
            buf.copy_within(move_start..move_end, 0);
        }
        self.store.mark_dirty();

        self.index.first_pre[self.cur_idx] = first;
        self.shift_tail_pre(self.cur_idx, -nr);
        self.header.n -= nr;
        Ok(())
    }

    /// Insert `payload` (a whole number of records) so that its first
    /// record takes logical position `pre + 1`. `pre == -1` inserts before
    /// the very first record. When the payload fits in the current
    /// block's headroom it is shifted in place; otherwise the block is
    /// split into one or more fresh blocks, each filled only to the
    /// configured fill factor so later inserts have room to land without
    /// splitting again.
    pub fn insert(&mut self, pre: i64, payload: &[u8]) -> Result<()> {
        let r = self.config.record_size;
        if payload.len() % r != 0 {
            return err_at!(
                InvalidInput,
                msg: "insert: payload length {} not a multiple of record_size {}",
                payload.len(),
                r
            );
        }
        let nr = (payload.len() / r) as i64;
        if nr == 0 {
            return Ok(());
        }
        if pre != -1 && (pre < 0 || pre >= self.header.n) {
            return err_at!(
                InvalidInput,
                msg: "insert: pre {} out of range (N={})", pre, self.header.n
            );
        }

        self.cursor(pre)?;
        let first_pre_cur = self.index.first_pre[self.cur_idx];
        let next_pre_cur = self.index.next_pre(self.cur_idx, self.header.n);
        let e = self.config.entries_per_block() as i64;

        self.header.n += nr;
        self.index_dirty = true;

        let ins = (pre - first_pre_cur + 1) as usize;

        // A chunk that exactly fills the remaining headroom (`nr == E -
        // fill`) still respects the `firstPre[i+1] - firstPre[i] <= E`
        // invariant and must not be forced through the split path.
        if nr <= e - (next_pre_cur - first_pre_cur) {
            // Fast path: fits in the current block.
            let move_records = (next_pre_cur - pre - 1) as usize;
            let src_off = ins * r;
            let dst_off = src_off + payload.len();
            let move_bytes = move_records * r;
            {
                let buf = self.store.bytes_mut();
                buf.copy_within(src_off..src_off + move_bytes, dst_off);
                buf[src_off..src_off + payload.len()].copy_from_slice(payload);
            }
            self.store.mark_dirty();
            self.shift_tail_pre(self.cur_idx, nr);
            return Ok(());
        }

        // Slow path: split the current block and spill into fresh blocks.
        let move_n = (next_pre_cur - pre - 1) as usize;
        let tail: Vec<u8> = if move_n > 0 {
            let start = ins * r;
            let end = start + move_n * r;
            self.store.bytes()[start..end].to_vec()
        } else {
            Vec::new()
        };

        let n_f = self.config.fresh_fill();
        let mut new_blocks = ((nr as usize + n_f - 1) / n_f) + 1;
        if move_n == 0 {
            new_blocks -= 1;
        }

        let insert_at = self.cur_idx + 1;
        for _ in 0..new_blocks {
            self.index.first_pre.insert(insert_at, 0);
            self.index.block_no.insert(insert_at, 0);
        }

        let mut idx = self.cur_idx;
        let mut written = 0_i64;
        let mut offset = 0_usize;
        while written < nr {
            let remaining = (nr - written) as usize;
            let chunk_records = std::cmp::min(remaining, n_f);
            let chunk_bytes = chunk_records * r;

            let block_no = self.header.p;
            self.header.p += 1;
            self.store.alloc(block_no)?;
            {
                let buf = self.store.bytes_mut();
                buf[..chunk_bytes].copy_from_slice(&payload[offset..offset + chunk_bytes]);
            }
            self.store.mark_dirty();

            idx += 1;
            self.index.first_pre[idx] = pre + 1 + written;
            self.index.block_no[idx] = block_no;

            written += chunk_records as i64;
            offset += chunk_bytes;
        }

        if move_n > 0 {
            let block_no = self.header.p;
            self.header.p += 1;
            self.store.alloc(block_no)?;
            {
                let buf = self.store.bytes_mut();
                buf[..tail.len()].copy_from_slice(&tail);
            }
            self.store.mark_dirty();

            idx += 1;
            self.index.first_pre[idx] = pre + 1 + nr;
            self.index.block_no[idx] = block_no;
        }

        self.cur_idx = idx;
        self.shift_tail_pre(self.cur_idx, nr);
        Ok(())
    }

    /// Total number of logical records, `N`.
    pub fn size(&self) -> i64 {
        self.header.n
    }

    /// Number of used index slots, `L`.
    pub fn blocks(&self) -> usize {
        self.index.len()
    }

    /// Write back the buffer if dirty, then persist the index and header
    /// sidecars if dirty.
    pub fn flush(&mut self) -> Result<()> {
        self.store.sync()?;
        if self.index_dirty {
            self.header.l = self.index.len() as u32;

            let mut index_fd = util::create_file_trunc(&self.config.to_index_path())?;
            self.index.save(&mut index_fd)?;

            let mut header_fd = util::create_file_trunc(&self.config.to_header_path())?;
            self.header.save(&mut header_fd)?;

            self.index_dirty = false;
        }
        Ok(())
    }

    /// Flush, then release the advisory lock and the file handles.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        err_at!(IOError, self.store.fd().unlock())
    }

    /// A read-only snapshot of the engine's counters.
    pub fn stats(&self) -> Stats {
        Stats {
            p: self.header.p,
            l: self.index.len(),
            n: self.header.n,
            fill_factor: self.config.fill_factor,
        }
    }

    /// Walk the index once and check that `firstPre` is ascending, that
    /// every slot holds at most a block's worth of records, and that
    /// block numbers are in range and unique. Returns
    /// [`Error::Corruption`] with the offending details on failure, never
    /// panics.
    pub fn validate(&self) -> Result<()> {
        // `header.l` only mirrors `index.len()` at flush/open time; it is
        // not re-synced on every insert/delete, so it is not checked here.
        // See `Table::open`, which does check it once on load.
        self.index.validate(self.header.n, self.config.entries_per_block())?;

        let mut seen = HashSet::new();
        for &bn in self.index.block_no.iter() {
            if bn >= self.header.p {
                return err_at!(
                    Corruption,
                    msg: "table: blockNo {} out of range (P={})", bn, self.header.p
                );
            }
            if !seen.insert(bn) {
                return err_at!(Corruption, msg: "table: duplicate blockNo {}", bn);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "table_test.rs"]
mod table_test;
