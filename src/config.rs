//! Sizing and location configuration for a [`crate::Table`].
//!
//! A small set of tunables with sane defaults, a `new`/`set_*` builder,
//! and derived quantities (entries per block, fresh-block fill count)
//! computed from them on demand.

use std::{ffi, path};

use crate::{err_at, Error, Result};

/// Default page size in bytes. Must be a power of two.
pub const BLOCKSIZE: usize = 4 * 1024;
/// Default record size in bytes. Must be a power of two and divide
/// `BLOCKSIZE`.
pub const RECORDSIZE: usize = 16;
/// Default fill factor for freshly split blocks.
pub const FILL_FACTOR: f32 = 0.5;

/// Configuration for a [`crate::Table`].
///
/// Configuration is supplied when creating a new table. Re-opening an
/// existing table re-derives `record_size`/`block_size` from the values
/// baked into the already-written data: callers must pass the same values
/// used at creation time, they are not themselves persisted (the header
/// sidecar only carries the block count, index length, and record count).
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory the three files (data, index, header) live under.
    pub dir: ffi::OsString,
    /// Filename prefix `F`; the three files are `dir/F`, `dir/Fx`, `dir/Fi`.
    pub name: String,
    /// Page size in bytes, `B`.
    pub block_size: usize,
    /// Record size in bytes, `R`.
    pub record_size: usize,
    /// Fill factor for freshly allocated blocks on split, `F`.
    pub fill_factor: f32,
}

impl<'a> arbitrary::Arbitrary<'a> for Config {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        use std::env;

        let name: String = {
            let n: u32 = u.arbitrary()?;
            format!("pretable-{}", n)
        };

        let record_size = *u.choose(&[8_usize, 16, 32, 64])?;
        let block_size = record_size * *u.choose(&[4_usize, 8, 16, 64, 256])?;
        let fill_factor = *u.choose(&[0.25_f32, 0.5, 0.75, 1.0])?;

        Ok(Config {
            dir: env::temp_dir().into_os_string(),
            name,
            block_size,
            record_size,
            fill_factor,
        })
    }
}

impl Config {
    /// New configuration for a table named `name` under `dir`, storing
    /// `record_size`-byte records. Block size and fill factor default to
    /// [`BLOCKSIZE`] and [`FILL_FACTOR`].
    pub fn new(dir: &ffi::OsStr, name: &str, record_size: usize) -> Config {
        Config {
            dir: dir.to_os_string(),
            name: name.to_string(),
            block_size: BLOCKSIZE,
            record_size,
            fill_factor: FILL_FACTOR,
        }
    }

    /// Override the page size. Must be a power of two and a multiple of
    /// `record_size`, checked by [`Config::validate`].
    pub fn set_block_size(&mut self, block_size: usize) -> &mut Self {
        self.block_size = block_size;
        self
    }

    /// Override the fill factor used when splitting a block on insert.
    /// Must lie in `(0.0, 1.0]`, checked by [`Config::validate`].
    pub fn set_fill_factor(&mut self, fill_factor: f32) -> &mut Self {
        self.fill_factor = fill_factor;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.record_size == 0 || !self.record_size.is_power_of_two() {
            return err_at!(
                InvalidInput,
                msg: "record_size {} must be a non-zero power of two",
                self.record_size
            );
        }
        if self.block_size == 0 || !self.block_size.is_power_of_two() {
            return err_at!(
                InvalidInput,
                msg: "block_size {} must be a non-zero power of two",
                self.block_size
            );
        }
        if self.block_size % self.record_size != 0 {
            return err_at!(
                InvalidInput,
                msg: "block_size {} must be a multiple of record_size {}",
                self.block_size,
                self.record_size
            );
        }
        if !(self.fill_factor > 0.0 && self.fill_factor <= 1.0) {
            return err_at!(
                InvalidInput,
                msg: "fill_factor {} must be in (0.0, 1.0]",
                self.fill_factor
            );
        }
        Ok(())
    }

    /// `E`: maximum records per block.
    pub fn entries_per_block(&self) -> usize {
        self.block_size / self.record_size
    }

    /// `N_F`: records placed in a freshly split block, `floor(F * E)`,
    /// never less than 1.
    pub fn fresh_fill(&self) -> usize {
        let e = self.entries_per_block();
        std::cmp::max(1, ((self.fill_factor * e as f32).floor()) as usize)
    }

    pub fn to_data_path(&self) -> ffi::OsString {
        self.join(&self.name)
    }

    pub fn to_index_path(&self) -> ffi::OsString {
        self.join(&format!("{}x", self.name))
    }

    pub fn to_header_path(&self) -> ffi::OsString {
        self.join(&format!("{}i", self.name))
    }

    fn join(&self, file_name: &str) -> ffi::OsString {
        let loc: path::PathBuf = [self.dir.clone(), file_name.into()].iter().collect();
        loc.into_os_string()
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
