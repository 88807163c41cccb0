use bbox_addresses::{PhysicalAddress, RegionOffset, ReservedRegion, VirtualAddress};
use bbox_safemem::{ENTRY_SIZE, HEADER_SIZE, PoolError, SafeMemPool};
use std::collections::HashSet;
use std::sync::Barrier;
use std::thread;

fn region(len: usize) -> ReservedRegion {
    ReservedRegion::zeroed(
        PhysicalAddress::new(0x1_0000_0000),
        VirtualAddress::new(0xffff_0000_0010_0000),
        len,
    )
}

/// Directory in the first `dir` bytes, payload in the rest.
fn pool<'r>(r: &'r ReservedRegion, dir: u64, name: &str, grow_upward: bool) -> SafeMemPool<'r> {
    let payload = r.mem_at(RegionOffset::new(dir), r.size() - dir).unwrap();
    SafeMemPool::init(r, RegionOffset::new(0), name, dir, payload, grow_upward).unwrap()
}

/// Flip bit `bit` (0 = MSB of the first byte) of directory slot `index`.
fn flip_entry_bit(region: &ReservedRegion, index: u64, bit: u64) {
    let offset = RegionOffset::new(HEADER_SIZE + index * ENTRY_SIZE + bit / 8);
    let mut b = [0u8];
    region.read(offset, &mut b).unwrap();
    b[0] ^= 0x80 >> (bit % 8);
    region.write(offset, &b).unwrap();
}

#[test]
fn duplicate_ids_are_rejected_without_side_effects() {
    let r = region(4096);
    let pool = pool(&r, 1024, "dup", false);
    let first = pool.alloc(17, 128).unwrap();
    let before = r.snapshot();

    assert_eq!(pool.alloc(17, 8), Err(PoolError::AlreadyExists(17)));
    assert_eq!(r.snapshot(), before);
    assert_eq!(pool.cur_entries(), 1);
    assert_eq!(pool.get(17).unwrap(), first);
}

#[test]
fn directory_fills_up_then_reports_exhaustion() {
    let r = region(2048);
    let pool = pool(&r, 1024, "full", true);
    let max = pool.max_entries();
    for id in 1..=max {
        pool.alloc(id, 1).unwrap();
    }
    let cursor = pool.cur_alloc_addr();
    assert_eq!(
        pool.alloc(max + 1, 1),
        Err(PoolError::ResourceExhausted { id: max + 1, size: 1 })
    );
    assert_eq!(pool.cur_entries(), max);
    assert_eq!(pool.cur_alloc_addr(), cursor);
}

#[test]
fn up_to_four_flipped_bits_in_an_entry_are_corrected() {
    let r = region(4096);
    let pool = pool(&r, 1024, "p3", false);
    pool.alloc(1, 32).unwrap();
    let mem = pool.alloc(2, 200).unwrap();
    pool.alloc(3, 32).unwrap();

    // size, vaddr, paddr and parity bits of slot 1; the id stays readable
    for bit in [40, 100, 170, 220] {
        flip_entry_bit(&r, 1, bit);
    }
    assert_eq!(pool.get_checked(2).unwrap(), (mem, 4));
    assert_eq!(pool.get_checked(2).unwrap(), (mem, 0));
}

#[test]
fn flipped_id_bits_are_corrected_too() {
    let r = region(4096);
    let pool = pool(&r, 1024, "p3", false);
    let mem = pool.alloc(0x100, 64).unwrap();
    for bit in [23, 31, 64] {
        flip_entry_bit(&r, 0, bit);
    }
    assert_eq!(pool.get(0x100).unwrap(), mem);
}

#[test]
fn more_than_four_flipped_bits_fail_with_io() {
    let r = region(4096);
    let pool = pool(&r, 1024, "p4", false);
    pool.alloc(8, 64).unwrap();
    pool.alloc(9, 64).unwrap();

    for bit in [33, 47, 70, 99, 130, 161, 190] {
        flip_entry_bit(&r, 1, bit);
    }
    assert_eq!(pool.get(9), Err(PoolError::Io(9)));
    // the neighbour is unaffected
    assert!(pool.get(8).is_ok());
}

#[test]
fn damaged_directory_cannot_prove_absence() {
    let r = region(4096);
    let pool = pool(&r, 1024, "p4", false);
    pool.alloc(4, 64).unwrap();
    for bit in [0, 9, 29, 60, 120, 150, 180] {
        flip_entry_bit(&r, 0, bit);
    }
    assert_eq!(pool.get(4), Err(PoolError::Io(4)));
}

#[test]
fn reinit_is_idempotent() {
    let r = region(4096);
    let mut pool = pool(&r, 1024, "p5", false);
    let a = pool.alloc(1, 100).unwrap();
    let cursor = pool.cur_alloc_addr();
    let before = r.snapshot();

    pool.reinit();
    pool.reinit();

    assert_eq!(r.snapshot(), before);
    assert_eq!(pool.cur_entries(), 1);
    assert_eq!(pool.cur_alloc_addr(), cursor);
    assert_eq!(pool.get(1).unwrap(), a);
    assert_eq!(pool.alloc(2, 10).unwrap().vend(), a.vaddr);
}

#[test]
fn concurrent_allocations_never_overlap() {
    const THREADS: u32 = 8;
    const PER_THREAD: u32 = 10;
    let r = region(16 * 1024);
    let pool = pool(&r, 4096, "mt", false);
    let barrier = Barrier::new(THREADS as usize);

    let regions: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let pool = &pool;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    (0..PER_THREAD)
                        .map(|i| pool.alloc(1 + t * PER_THREAD + i, 24).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(pool.cur_entries(), THREADS * PER_THREAD);
    let starts: HashSet<_> = regions.iter().map(|m| m.vaddr).collect();
    assert_eq!(starts.len(), regions.len());
    for m in &regions {
        assert_eq!(regions.iter().filter(|o| o.vaddr < m.vend() && m.vaddr < o.vend()).count(), 1);
    }
}

#[test]
fn racing_on_one_id_yields_one_winner() {
    const THREADS: usize = 6;
    let r = region(4096);
    let pool = pool(&r, 1024, "race", true);
    let barrier = Barrier::new(THREADS);

    let wins = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    pool.alloc(77, 16)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Result::is_ok)
            .count()
    });

    assert_eq!(wins, 1);
    assert_eq!(pool.cur_entries(), 1);
}

#[test]
fn fresh_4k_pool_allocates_and_finds_id_7() {
    let r = region(8192);
    let pool = pool(&r, 4096, "fresh", false);
    let mem = pool.alloc(7, 64).unwrap();
    let found = pool.get(7).unwrap();
    assert_eq!(found.vaddr, mem.vaddr);
    assert_eq!(found.size, 64);
}

#[test]
fn undersized_pool_creates_no_state() {
    let r = region(4096);
    let payload = r.mem_at(RegionOffset::new(2048), 2048).unwrap();
    let err = SafeMemPool::init(&r, RegionOffset::new(0), "small", 100, payload, false).unwrap_err();
    assert!(matches!(err, PoolError::InvalidArgument(_)));
    assert!(r.snapshot().iter().all(|&b| b == 0));
    assert!(matches!(
        SafeMemPool::open(&r, RegionOffset::new(0)),
        Err(PoolError::BadMagic(0))
    ));
}
