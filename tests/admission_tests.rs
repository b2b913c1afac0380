//! Two-level admission: global and per-partition permits, FIFO queues, cancellation.

use fanhash::pipeline::{Acquire, AdmissionController, AdmissionSlot, PartitionSet};
use fanhash::{CancelToken, PendingFile};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn controller(spec: &str, paths: &[&str]) -> Arc<AdmissionController> {
    let set: PartitionSet = spec.parse().unwrap();
    let controller = Arc::new(AdmissionController::new(&set));
    for p in paths {
        controller.enqueue(PendingFile::new(*p, 1));
    }
    controller
}

fn admit(controller: &Arc<AdmissionController>, cancel: &CancelToken) -> (AdmissionSlot, PathBuf) {
    match controller.acquire_next(cancel) {
        Acquire::Admitted(slot, file) => (slot, file.path),
        Acquire::Exhausted => panic!("expected a file, queues are empty"),
        Acquire::Cancelled => panic!("expected a file, got cancelled"),
    }
}

// --- ordering and limits ---

#[test]
fn test_partition_limit_lets_other_partition_through() {
    let c = controller("2:/A,1;/B,1", &["/A/1", "/A/2", "/B/1", "/C/1"]);
    let cancel = CancelToken::new();

    let (slot_a, first) = admit(&c, &cancel);
    let (slot_b, second) = admit(&c, &cancel);
    assert_eq!(first, PathBuf::from("/A/1"));
    assert_eq!(second, PathBuf::from("/B/1"));
    assert_eq!(c.stats().global_in_use, 2);

    // The scan resumes after /B, so the catch-all gets the freed global permit before /A/2.
    drop(slot_a);
    let (slot_c, third) = admit(&c, &cancel);
    assert_eq!(third, PathBuf::from("/C/1"));

    drop(slot_b);
    let (slot_a2, fourth) = admit(&c, &cancel);
    assert_eq!(fourth, PathBuf::from("/A/2"));

    drop(slot_c);
    drop(slot_a2);
    assert!(matches!(c.acquire_next(&cancel), Acquire::Exhausted));
    assert_eq!(c.stats().global_in_use, 0);
}

#[test]
fn test_fifo_within_partition() {
    let c = controller("1", &["/x/1", "/x/2", "/x/3"]);
    let cancel = CancelToken::new();
    let mut order = Vec::new();
    for _ in 0..3 {
        let (slot, path) = admit(&c, &cancel);
        order.push(path);
        drop(slot);
    }
    assert_eq!(
        order,
        vec![
            PathBuf::from("/x/1"),
            PathBuf::from("/x/2"),
            PathBuf::from("/x/3")
        ]
    );
}

#[test]
fn test_limits_hold_under_concurrency() {
    let paths: Vec<String> = (0..12)
        .map(|i| format!("/{}/{}", ["A", "B", "C"][i % 3], i))
        .collect();
    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let c = controller("2:/A,1;/B,1", &refs);
    let cancel = CancelToken::new();

    let total_now = Arc::new(AtomicUsize::new(0));
    let total_max = Arc::new(AtomicUsize::new(0));
    let per_prefix: Arc<Mutex<HashMap<String, (usize, usize)>>> = Default::default();
    let handled = Arc::new(AtomicUsize::new(0));

    thread::scope(|s| {
        for _ in 0..4 {
            let c = Arc::clone(&c);
            let cancel = cancel.clone();
            let total_now = Arc::clone(&total_now);
            let total_max = Arc::clone(&total_max);
            let per_prefix = Arc::clone(&per_prefix);
            let handled = Arc::clone(&handled);
            s.spawn(move || {
                while let Acquire::Admitted(slot, file) = c.acquire_next(&cancel) {
                    let prefix = file.path.to_string_lossy()[..2].to_string();
                    let now = total_now.fetch_add(1, Ordering::SeqCst) + 1;
                    total_max.fetch_max(now, Ordering::SeqCst);
                    {
                        let mut map = per_prefix.lock().unwrap();
                        let entry = map.entry(prefix.clone()).or_insert((0, 0));
                        entry.0 += 1;
                        entry.1 = entry.1.max(entry.0);
                    }
                    thread::sleep(Duration::from_millis(5));
                    per_prefix.lock().unwrap().get_mut(&prefix).unwrap().0 -= 1;
                    total_now.fetch_sub(1, Ordering::SeqCst);
                    handled.fetch_add(1, Ordering::SeqCst);
                    drop(slot);
                }
            });
        }
    });

    assert_eq!(handled.load(Ordering::SeqCst), 12);
    assert!(total_max.load(Ordering::SeqCst) <= 2);
    let map = per_prefix.lock().unwrap();
    assert!(map["/A"].1 <= 1);
    assert!(map["/B"].1 <= 1);
    assert_eq!(c.stats().global_in_use, 0);
}

// --- release and stats ---

#[test]
fn test_slot_drop_releases_both_permits() {
    let c = controller("3:/A,2", &["/A/1", "/Z/1"]);
    let cancel = CancelToken::new();
    let (a, _) = admit(&c, &cancel);
    let (z, _) = admit(&c, &cancel);

    let stats = c.stats();
    assert_eq!(stats.global_in_use, 2);
    assert_eq!(stats.partitions[0].prefix, "/A");
    assert_eq!(stats.partitions[0].in_use, 1);
    assert_eq!(stats.partitions[1].prefix, "");
    assert_eq!(stats.partitions[1].in_use, 1);
    assert_eq!(a.partition_prefix(), "/A");
    assert_eq!(z.partition(), 1);

    drop(a);
    drop(z);
    let stats = c.stats();
    assert_eq!(stats.permits_in_use(), 0);
    assert!(stats.partitions.iter().all(|p| p.in_use == 0));
    assert_eq!(stats.queued(), 0);
}

#[test]
fn test_empty_controller_is_exhausted() {
    let c = controller("2", &[]);
    assert!(!c.has_pending());
    assert!(matches!(
        c.acquire_next(&CancelToken::new()),
        Acquire::Exhausted
    ));
}

// --- cancellation ---

#[test]
fn test_cancel_wakes_blocked_waiter() {
    let c = controller("1", &["/x/1", "/x/2"]);
    let cancel = CancelToken::new();
    let (held, _) = admit(&c, &cancel);

    let waiter = {
        let c = Arc::clone(&c);
        let cancel = cancel.clone();
        thread::spawn(move || {
            let start = Instant::now();
            let cancelled = matches!(c.acquire_next(&cancel), Acquire::Cancelled);
            (cancelled, start.elapsed())
        })
    };
    thread::sleep(Duration::from_millis(100));
    cancel.cancel();
    let (cancelled, waited) = waiter.join().unwrap();
    assert!(cancelled);
    assert!(waited < Duration::from_secs(5));

    // The held slot is untouched by cancellation and still releases.
    assert_eq!(c.stats().global_in_use, 1);
    drop(held);
    assert_eq!(c.stats().global_in_use, 0);
}

#[test]
fn test_close_fails_waits() {
    let c = controller("1", &["/x/1"]);
    c.close();
    assert!(matches!(
        c.acquire_next(&CancelToken::new()),
        Acquire::Cancelled
    ));
    assert_eq!(c.stats().queued(), 1);
}
