use std::{env, ffi, fs};

use arbitrary::Unstructured;
use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use super::*;

// 16-byte records, 4 per block (64-byte blocks), fill factor 0.5 so a
// fresh split fills each new block to 2 records — small enough to walk
// block splits and merges by hand in these tests.
fn scenario_config(name: &str) -> Config {
    let dir: ffi::OsString = env::temp_dir().into();
    let mut config = Config::new(&dir, &format!("{}-{}", name, std::process::id()), 16);
    config.set_block_size(64);
    config.set_fill_factor(0.5);
    config
}

fn cleanup(config: &Config) {
    fs::remove_file(config.to_data_path()).ok();
    fs::remove_file(config.to_index_path()).ok();
    fs::remove_file(config.to_header_path()).ok();
}

fn payload(bytes: &[u8]) -> Vec<u8> {
    // One tag byte per 16-byte record; the remaining 15 bytes are filler.
    let mut buf = Vec::with_capacity(bytes.len() * 16);
    for &b in bytes {
        buf.push(b);
        buf.extend_from_slice(&[0_u8; 15]);
    }
    buf
}

#[test]
fn bulk_insert_then_read_back() {
    let config = scenario_config("bulk-insert-read");
    cleanup(&config);
    let mut table = Table::create(config.clone()).unwrap();

    table.insert(-1, &payload(b"abcde")).unwrap();

    assert_eq!(table.size(), 5);
    assert!(table.blocks() >= 2);
    for (k, want) in b"abcde".iter().enumerate() {
        assert_eq!(table.read1(k as i64, 0).unwrap(), *want as u32);
    }
    table.validate().unwrap();

    table.close().unwrap();
    cleanup(&config);
}

#[test]
fn point_write_survives_flush_and_reopen() {
    let config = scenario_config("write-flush-reopen");
    cleanup(&config);
    let mut table = Table::create(config.clone()).unwrap();
    table.insert(-1, &payload(b"abcde")).unwrap();

    table.write1(2, 0, b'Z' as u32).unwrap();
    table.flush().unwrap();
    table.close().unwrap();

    let mut table = Table::open(config.clone()).unwrap();
    assert_eq!(table.read1(2, 0).unwrap(), b'Z' as u32);
    for (k, want) in [b'a', b'b', b'Z', b'd', b'e'].iter().enumerate() {
        assert_eq!(table.read1(k as i64, 0).unwrap(), *want as u32);
    }
    table.validate().unwrap();

    table.close().unwrap();
    cleanup(&config);
}

#[test]
fn delete_spanning_block_boundary() {
    let config = scenario_config("delete-span-boundary");
    cleanup(&config);
    let mut table = Table::create(config.clone()).unwrap();
    table.insert(-1, &payload(b"abcde")).unwrap();

    table.delete(1, 3).unwrap(); // removes b, c, d

    assert_eq!(table.size(), 2);
    assert_eq!(table.read1(0, 0).unwrap(), b'a' as u32);
    assert_eq!(table.read1(1, 0).unwrap(), b'e' as u32);
    table.validate().unwrap();

    table.close().unwrap();
    cleanup(&config);
}

#[test]
fn insert_at_block_boundary() {
    let config = scenario_config("insert-block-boundary");
    cleanup(&config);
    let mut table = Table::create(config.clone()).unwrap();

    table.insert(-1, &payload(&[1, 1, 1, 1])).unwrap(); // fills to E
    assert_eq!(table.size(), 4);
    assert_eq!(table.blocks(), 1);
    let p_before = table.stats().p;

    table.insert(3, &payload(&[2, 2])).unwrap(); // append at the last slot
    assert_eq!(table.size(), 6);
    assert_eq!(table.stats().p, p_before + 1); // exactly one new block
    table.validate().unwrap();

    table.close().unwrap();
    cleanup(&config);
}

#[test]
fn insert_causing_block_spill() {
    let config = scenario_config("insert-spill");
    cleanup(&config);
    let mut table = Table::create(config.clone()).unwrap();
    table.insert(-1, &payload(&[1, 1, 1, 1])).unwrap();
    table.insert(3, &payload(&[2, 2])).unwrap();

    let l_before = table.blocks();
    table.insert(1, &payload(&[9, 9, 9, 9, 9])).unwrap();
    assert_eq!(table.blocks(), l_before + 4); // ceil(5/2) + 1 new entries

    assert_eq!(table.size(), 11);
    let want = [1, 1, 9, 9, 9, 9, 9, 1, 1, 2, 2];
    for (k, w) in want.iter().enumerate() {
        assert_eq!(table.read1(k as i64, 0).unwrap(), *w as u32, "pre={}", k);
    }
    table.validate().unwrap();

    table.close().unwrap();
    cleanup(&config);
}

#[test]
fn empty_block_pruning_on_delete() {
    let config = scenario_config("empty-block-pruning");
    cleanup(&config);
    let mut table = Table::create(config.clone()).unwrap();

    // Three blocks of 2 records each, built by hand to avoid depending on
    // insert's own block-numbering for this test's specific shape.
    table.index.first_pre = vec![0, 2, 4];
    table.index.block_no = vec![10, 20, 30];
    table.header.p = 31;
    table.header.n = 6;
    table.header.l = 3;
    for (bn, vals) in [(10_u32, [1_u8, 1]), (20, [2, 2]), (30, [3, 3])] {
        table.store.alloc(bn).unwrap();
        let buf = table.store.bytes_mut();
        buf[0] = vals[0];
        buf[16] = vals[1];
        table.store.mark_dirty();
    }
    table.cur_idx = 0;
    table.store.load(10).unwrap();

    table.delete(2, 2).unwrap(); // removes all of the middle block

    assert_eq!(table.blocks(), 2);
    assert_eq!(table.index.first_pre, vec![0, 2]);
    assert_eq!(table.size(), 4);
    assert_eq!(table.stats().p, 31); // P unchanged, block 20 leaked
    assert!(!table.index.block_no.contains(&20));
    table.validate().unwrap();

    table.close().unwrap();
    cleanup(&config);
}

#[test]
fn test_table_property_roundtrip_after_flush() {
    let seed: u64 = [2021552635916817453, 7402918834710184961, random()][random::<usize>() % 3];
    let mut rng = SmallRng::seed_from_u64(seed);
    println!("test_table_property_roundtrip_after_flush seed:{}", seed);

    let config = scenario_config("prop-roundtrip");
    cleanup(&config);
    let mut table = Table::create(config.clone()).unwrap();

    let mut model: Vec<u8> = Vec::new();
    for _ in 0..200 {
        let op = rng.gen::<u8>() % 3;
        match op {
            0 | 1 => {
                let n: usize = 1 + (rng.gen::<usize>() % 6);
                let bytes: Vec<u8> = {
                    let raw = rng.gen::<[u8; 8]>();
                    let mut uns = Unstructured::new(&raw);
                    (0..n).map(|_| uns.arbitrary().unwrap_or(0_u8)).collect()
                };
                let pre = if model.is_empty() {
                    -1
                } else {
                    rng.gen::<i64>().rem_euclid(model.len() as i64)
                };
                table.insert(pre, &payload(&bytes)).unwrap();
                let at = (pre + 1) as usize;
                for (i, b) in bytes.iter().enumerate() {
                    model.insert(at + i, *b);
                }
            }
            _ => {
                if !model.is_empty() {
                    let first = rng.gen::<usize>() % model.len();
                    let nr = 1 + (rng.gen::<usize>() % (model.len() - first));
                    table.delete(first as i64, nr as i64).unwrap();
                    model.drain(first..first + nr);
                }
            }
        }
        table.validate().unwrap();
        assert_eq!(table.size() as usize, model.len());
        for (pre, want) in model.iter().enumerate() {
            assert_eq!(table.read1(pre as i64, 0).unwrap(), *want as u32, "pre={}", pre);
        }
    }

    table.flush().unwrap();
    table.close().unwrap();

    let mut table = Table::open(config.clone()).unwrap();
    table.validate().unwrap();
    assert_eq!(table.size() as usize, model.len());
    for (pre, want) in model.iter().enumerate() {
        assert_eq!(table.read1(pre as i64, 0).unwrap(), *want as u32, "pre={}", pre);
    }

    table.close().unwrap();
    cleanup(&config);
}
