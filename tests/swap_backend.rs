//! # Swap Backend Integration Tests
//!
//! End-to-end coverage of the swap layer through the public facade:
//!
//! 1. Read-your-writes — GET sees a SET before the writer drains it
//! 2. Existence — EXISTS tracks the last SET/VOID in caller order
//! 3. Space accounting — gaps + live entries always cover the whole file
//! 4. Growth and shrink — 32-tile batches with a hysteresis band
//! 5. Concurrency — producer backends on many threads over one service
//! 6. Cancellation — VOID discards queued bytes; re-SET never sees them
//! 7. Backpressure — a tiny queue limit throttles but loses nothing

use std::sync::{Arc, Barrier};
use std::thread;

use tempfile::tempdir;
use tileswap::config::GROW_BATCH_TILES;
use tileswap::{SwapBackend, SwapConfig, SwapService, TileGeometry};

const TILE: usize = 64;

fn service_in(dir: &std::path::Path) -> Arc<SwapService> {
    Arc::new(SwapService::new(&SwapConfig::new(dir)).unwrap())
}

fn tile_bytes(seed: u8) -> Vec<u8> {
    (0..TILE).map(|i| seed.wrapping_add(i as u8)).collect()
}

#[test]
fn get_immediately_after_set_returns_exactly_the_data() {
    let dir = tempdir().unwrap();
    let service = service_in(dir.path());
    let mut backend = SwapBackend::new(service, TileGeometry::new(TILE as u32, 1, 1));

    // Burst of sets so later ones are still queued when we read them back.
    for i in 0..100 {
        backend.set(i, 0, 0, &tile_bytes(i as u8));
    }
    for i in (0..100).rev() {
        assert_eq!(
            backend.get(i, 0, 0).as_deref(),
            Some(&tile_bytes(i as u8)[..]),
            "tile {i} did not read its own write"
        );
    }
}

#[test]
fn exists_reflects_the_last_operation_in_caller_order() {
    let dir = tempdir().unwrap();
    let service = service_in(dir.path());
    let mut backend = SwapBackend::new(service, TileGeometry::new(TILE as u32, 1, 1));

    assert!(!backend.exists(4, 5, 6));
    backend.set(4, 5, 6, &tile_bytes(1));
    assert!(backend.exists(4, 5, 6));
    backend.void(4, 5, 6);
    assert!(!backend.exists(4, 5, 6));
    backend.set(4, 5, 6, &tile_bytes(2));
    assert!(backend.exists(4, 5, 6));
    backend.set(4, 5, 6, &tile_bytes(3));
    assert!(backend.exists(4, 5, 6));
    backend.void(4, 5, 6);
    backend.void(4, 5, 6);
    assert!(!backend.exists(4, 5, 6));
}

#[test]
fn space_is_conserved_across_set_and_void_churn() {
    let dir = tempdir().unwrap();
    let service = service_in(dir.path());
    let mut backend =
        SwapBackend::new(Arc::clone(&service), TileGeometry::new(TILE as u32, 1, 1));

    for round in 0..5 {
        for i in 0..40 {
            backend.set(i, round, 0, &tile_bytes(i as u8));
        }
        for i in (0..40).step_by(3) {
            backend.void(i, round, 0);
        }

        let stats = service.stats();
        let live = backend.len() as u64 * TILE as u64;
        assert_eq!(
            stats.free_bytes + live,
            stats.total,
            "conservation violated in round {round}"
        );
    }
}

#[test]
fn file_grows_in_batches_and_shrinks_past_the_band() {
    let dir = tempdir().unwrap();
    let service = service_in(dir.path());
    let mut backend =
        SwapBackend::new(Arc::clone(&service), TileGeometry::new(TILE as u32, 1, 1));

    let tiles = 2 * GROW_BATCH_TILES as i32;
    for i in 0..tiles {
        backend.set(i, 0, 0, &tile_bytes(i as u8));
    }
    let grown = service.stats().total;
    assert_eq!(grown, 2 * GROW_BATCH_TILES * TILE as u64);

    // Void the tail until the trailing gap crosses the hysteresis band.
    for i in (GROW_BATCH_TILES as i32 - 1..tiles).rev() {
        backend.void(i, 0, 0);
    }

    let shrunk = service.stats().total;
    assert!(shrunk < grown, "file never shrank ({shrunk} >= {grown})");
    assert_eq!(
        shrunk,
        (GROW_BATCH_TILES - 1) * TILE as u64 + GROW_BATCH_TILES * TILE as u64
    );

    // The remaining tiles survived the truncation.
    service.wait_until_idle();
    for i in 0..GROW_BATCH_TILES as i32 - 1 {
        assert_eq!(backend.get(i, 0, 0).as_deref(), Some(&tile_bytes(i as u8)[..]));
    }
}

#[test]
fn concurrent_producers_land_their_last_written_tiles_on_disk() {
    let dir = tempdir().unwrap();
    let service = service_in(dir.path());

    const THREADS: usize = 8;
    const TILES_PER_THREAD: i32 = 50;

    let barrier = Arc::new(Barrier::new(THREADS));
    let mut handles = Vec::new();

    for t in 0..THREADS {
        let service = Arc::clone(&service);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            let mut backend =
                SwapBackend::new(service, TileGeometry::new(TILE as u32, 1, 1));
            barrier.wait();
            for i in 0..TILES_PER_THREAD {
                // Two writes per coordinate; the second must win.
                backend.set(i, t as i32, 0, &tile_bytes(0xEE));
                backend.set(i, t as i32, 0, &tile_bytes((t * 100) as u8 ^ i as u8));
            }
            backend
        }));
    }

    let backends: Vec<SwapBackend> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Drain the queue so every surviving read comes from disk.
    service.wait_until_idle();

    for (t, backend) in backends.iter().enumerate() {
        for i in 0..TILES_PER_THREAD {
            assert_eq!(
                backend.get(i, t as i32, 0).as_deref(),
                Some(&tile_bytes((t * 100) as u8 ^ i as u8)[..]),
                "thread {t} tile {i} lost its last write"
            );
        }
    }
}

#[test]
fn void_discards_queued_bytes_before_they_reach_a_reused_offset() {
    let dir = tempdir().unwrap();
    let service = service_in(dir.path());
    let mut backend =
        SwapBackend::new(Arc::clone(&service), TileGeometry::new(TILE as u32, 1, 1));

    for _ in 0..200 {
        backend.set(9, 9, 9, &tile_bytes(0xAA));
        backend.void(9, 9, 9);
        // Re-SET reuses the freed offset; stale 0xAA bytes must never land.
        backend.set(9, 9, 9, &tile_bytes(0xBB));

        service.wait_until_idle();
        assert_eq!(backend.get(9, 9, 9).as_deref(), Some(&tile_bytes(0xBB)[..]));

        backend.void(9, 9, 9);
    }
}

#[test]
fn tiny_queue_limit_throttles_without_losing_tiles() {
    let dir = tempdir().unwrap();
    let config = SwapConfig::new(dir.path()).queue_limit(2);
    let service = Arc::new(SwapService::new(&config).unwrap());
    let mut backend =
        SwapBackend::new(Arc::clone(&service), TileGeometry::new(TILE as u32, 1, 1));

    for i in 0..300 {
        backend.set(i, 0, 0, &tile_bytes(i as u8));
    }

    service.wait_until_idle();
    for i in 0..300 {
        assert_eq!(backend.get(i, 0, 0).as_deref(), Some(&tile_bytes(i as u8)[..]));
    }
}

#[test]
fn backends_with_different_geometry_share_one_service() {
    let dir = tempdir().unwrap();
    let service = service_in(dir.path());

    let mut small = SwapBackend::new(Arc::clone(&service), TileGeometry::new(8, 1, 1));
    let mut large = SwapBackend::new(Arc::clone(&service), TileGeometry::new(16, 16, 4));

    small.set(0, 0, 0, &[7u8; 8]);
    let big_tile = vec![3u8; large.tile_size()];
    large.set(0, 0, 0, &big_tile);

    service.wait_until_idle();
    assert_eq!(small.get(0, 0, 0).as_deref(), Some(&[7u8; 8][..]));
    assert_eq!(large.get(0, 0, 0), Some(big_tile));
}

#[test]
fn dropping_a_backend_frees_its_space_but_not_its_neighbours() {
    let dir = tempdir().unwrap();
    let service = service_in(dir.path());

    let mut keeper =
        SwapBackend::new(Arc::clone(&service), TileGeometry::new(TILE as u32, 1, 1));
    keeper.set(1, 1, 1, &tile_bytes(0x11));

    {
        let mut doomed =
            SwapBackend::new(Arc::clone(&service), TileGeometry::new(TILE as u32, 1, 1));
        doomed.set(1, 1, 1, &tile_bytes(0x22));
        service.wait_until_idle();
    }

    let stats = service.stats();
    let live = keeper.len() as u64 * TILE as u64;
    assert_eq!(stats.free_bytes + live, stats.total);
    assert_eq!(keeper.get(1, 1, 1).as_deref(), Some(&tile_bytes(0x11)[..]));
}
