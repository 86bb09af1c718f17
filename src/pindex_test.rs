use std::{env, fs, path::PathBuf};

use super::*;

fn temp_file(name: &str) -> (PathBuf, fs::File) {
    let mut p = env::temp_dir();
    p.push(format!("pretable-pindex-test-{}-{}", name, std::process::id()));
    let fd = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&p)
        .unwrap();
    (p, fd)
}

fn sample() -> PIndex {
    PIndex {
        first_pre: vec![0, 10, 25, 40],
        block_no: vec![3, 1, 7, 2],
    }
}

#[test]
fn test_pindex_empty() {
    let idx = PIndex::empty();
    assert_eq!(idx.len(), 1);
    assert_eq!(idx.first_pre, vec![0]);
    assert_eq!(idx.block_no, vec![0]);
    idx.validate(0, 8).unwrap();
}

#[test]
fn test_pindex_next_pre() {
    let idx = sample();
    assert_eq!(idx.next_pre(0, 50), 10);
    assert_eq!(idx.next_pre(2, 50), 40);
    assert_eq!(idx.next_pre(3, 50), 50); // last slot bounded by N
}

#[test]
fn test_pindex_search_exact_slots() {
    let idx = sample();
    assert_eq!(idx.search(0, 0, 50).unwrap(), 0);
    assert_eq!(idx.search(9, 0, 50).unwrap(), 0);
    assert_eq!(idx.search(10, 0, 50).unwrap(), 1);
    assert_eq!(idx.search(24, 0, 50).unwrap(), 1);
    assert_eq!(idx.search(25, 0, 50).unwrap(), 2);
    assert_eq!(idx.search(49, 0, 50).unwrap(), 3);
}

#[test]
fn test_pindex_search_hot_restart_hint() {
    let idx = sample();
    // hint pointing straight at the right slot should short-circuit.
    assert_eq!(idx.search(30, 2, 50).unwrap(), 2);
    // a wrong hint still finds the right slot via binary search.
    assert_eq!(idx.search(30, 0, 50).unwrap(), 2);
}

#[test]
fn test_pindex_search_minus_one_is_before_slot_zero() {
    let idx = sample();
    assert_eq!(idx.search(-1, 2, 50).unwrap(), 0);
}

#[test]
fn test_pindex_search_out_of_range_is_corruption() {
    let idx = sample();
    assert!(idx.search(50, 0, 50).is_err());
}

#[test]
fn test_pindex_validate_catches_non_ascending() {
    // An actual decrease is rejected...
    let idx = PIndex {
        first_pre: vec![0, 10, 5],
        block_no: vec![0, 1, 2],
    };
    assert!(idx.validate(30, 8).is_err());
}

#[test]
fn test_pindex_validate_tolerates_zero_width_slot() {
    // ...but a repeat (a zero-width slot left behind by a split whose
    // insertion point landed at a block's start) is not an error.
    let idx = PIndex {
        first_pre: vec![0, 10, 10],
        block_no: vec![0, 1, 2],
    };
    idx.validate(30, 8).unwrap();
}

#[test]
fn test_pindex_validate_catches_overfull_slot() {
    let idx = PIndex {
        first_pre: vec![0, 20],
        block_no: vec![0, 1],
    };
    assert!(idx.validate(40, 8).is_err()); // slot 0 holds 20 records, E=8
}

#[test]
fn test_pindex_save_load_roundtrip() {
    let (path, mut fd) = temp_file("roundtrip");
    let idx = sample();
    idx.save(&mut fd).unwrap();

    let mut fd = fs::OpenOptions::new().read(true).write(true).open(&path).unwrap();
    let loaded = PIndex::load(&mut fd).unwrap();
    assert_eq!(loaded.first_pre, idx.first_pre);
    assert_eq!(loaded.block_no, idx.block_no);

    fs::remove_file(&path).ok();
}
