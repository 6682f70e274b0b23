//! Unit tests for slot allocation and handle resolution.

use super::*;
use rstest::{fixture, rstest};
use std::fs;
use tempfile::{TempDir, tempdir};

#[fixture]
fn dir() -> TempDir {
    tempdir().expect("tempdir")
}

fn register_n(registry: &SinkRegistry, dir: &TempDir, count: usize) -> Vec<SinkHandle> {
    (0..count)
        .map(|idx| {
            registry
                .register_file(dir.path().join(format!("sink{idx}.log")))
                .expect("register")
        })
        .collect()
}

#[rstest]
fn handles_are_allocated_in_order(dir: TempDir) {
    let registry = SinkRegistry::new();
    let handles = register_n(&registry, &dir, 3);
    assert_eq!(
        handles,
        vec![SinkHandle::new(0), SinkHandle::new(1), SinkHandle::new(2)]
    );
    assert_eq!(registry.len(), 3);
    assert_eq!(registry.open_count(), 3);
}

#[rstest]
fn close_out_of_range_is_invalid(dir: TempDir) {
    let registry = SinkRegistry::new();
    register_n(&registry, &dir, 2);
    assert!(matches!(
        registry.close(SinkHandle::new(5)),
        Err(SinkError::InvalidHandle(h)) if h == SinkHandle::new(5)
    ));
    assert_eq!(registry.open_count(), 2);
}

#[rstest]
fn double_close_reports_already_closed(dir: TempDir) {
    let registry = SinkRegistry::new();
    register_n(&registry, &dir, 1);
    let handle = SinkHandle::new(0);
    registry.close(handle).expect("first close");
    assert!(matches!(
        registry.close(handle),
        Err(SinkError::AlreadyClosed(_))
    ));
    assert!(matches!(
        registry.get(handle),
        Err(SinkError::AlreadyClosed(_))
    ));
    assert!(matches!(
        registry.write_sync(handle, "late"),
        Err(SinkError::AlreadyClosed(_))
    ));
}

#[rstest]
fn lowest_free_slot_is_reused(dir: TempDir) {
    let registry = SinkRegistry::new();
    let handles = register_n(&registry, &dir, 3);
    registry.close(handles[1]).expect("close middle");
    registry.close(handles[0]).expect("close first");

    let reused = registry
        .register_file(dir.path().join("reuse.log"))
        .expect("register");
    assert_eq!(reused, SinkHandle::new(0));
    let next = registry
        .register_file(dir.path().join("reuse2.log"))
        .expect("register");
    assert_eq!(next, SinkHandle::new(1));
    assert_eq!(registry.len(), 3);
}

#[rstest]
fn draining_slot_is_not_reused(dir: TempDir) {
    let registry = SinkRegistry::new();
    register_n(&registry, &dir, 1);
    registry.slots.lock()[0] = Slot::Closing;

    let handle = registry
        .register_file(dir.path().join("fresh.log"))
        .expect("register");
    assert_eq!(handle, SinkHandle::new(1));
    assert!(matches!(
        registry.get(SinkHandle::new(0)),
        Err(SinkError::AlreadyClosed(_))
    ));
}

#[rstest]
fn failed_open_consumes_no_slot(dir: TempDir) {
    let registry = SinkRegistry::new();
    let missing = dir.path().join("missing").join("x.log");
    assert!(matches!(
        registry.register_file(&missing),
        Err(SinkError::OpenFailed { .. })
    ));
    assert!(matches!(
        registry.register_rotating(dir.path().join("rot"), 0),
        Err(SinkError::InvalidConfig(_))
    ));
    assert!(registry.is_empty());
}

#[rstest]
fn writes_resolve_through_registry(dir: TempDir) {
    let registry = SinkRegistry::new();
    let path = dir.path().join("through.log");
    let handle = registry.register_file(&path).expect("register");
    registry.write_sync(handle, "sync").expect("write");
    registry.write_async(handle, "async").expect("dispatch");
    registry.close(handle).expect("close");
    let contents = fs::read_to_string(&path).expect("read");
    let mut lines: Vec<&str> = contents.lines().collect();
    lines.sort_unstable();
    assert_eq!(lines, vec!["async", "sync"]);
}

#[rstest]
fn close_all_releases_storage(dir: TempDir) {
    let registry = SinkRegistry::new();
    let handles = register_n(&registry, &dir, 4);
    registry.close(handles[2]).expect("close one");
    assert_eq!(registry.close_all(), 0);
    assert!(registry.is_empty());
    assert_eq!(registry.open_count(), 0);
    assert!(matches!(
        registry.close(handles[0]),
        Err(SinkError::InvalidHandle(_))
    ));

    let handle = registry
        .register_file(dir.path().join("after.log"))
        .expect("register after close_all");
    assert_eq!(handle, SinkHandle::new(0));
}

#[rstest]
fn close_all_counts_failures_and_closes_the_rest(dir: TempDir) {
    let registry = SinkRegistry::new();
    registry.set_error_hook(Some(Arc::new(|_handle: SinkHandle, err: &SinkError| {
        if matches!(err, SinkError::RotationFailed { .. }) {
            panic!("hook rejects rollover failures");
        }
    })));
    let first = registry
        .register_file(dir.path().join("first.log"))
        .expect("register");
    let stuck = registry
        .register_rotating(dir.path().join("stuck"), 1)
        .expect("register");
    let last = registry
        .register_file(dir.path().join("last.log"))
        .expect("register");
    fs::create_dir(dir.path().join("stuck-1.log")).expect("block rollover");

    registry.write_sync(stuck, "fits").expect("first record");
    registry.write_async(stuck, "overflow").expect("dispatch");
    registry.write_async(first, "one").expect("dispatch");
    registry.write_async(last, "three").expect("dispatch");

    assert_eq!(registry.close_all(), 1);
    assert_eq!(registry.open_count(), 0);
    assert!(registry.is_empty());
    for handle in [first, stuck, last] {
        assert!(matches!(
            registry.get(handle),
            Err(SinkError::InvalidHandle(_))
        ));
    }
    let read = |name: &str| fs::read_to_string(dir.path().join(name)).expect("read");
    assert_eq!(read("first.log"), "one\n");
    assert_eq!(read("last.log"), "three\n");
    assert_eq!(read("stuck-0.log"), "fits\noverflow\n");
}

#[rstest]
fn sink_closing_behind_the_registry_is_not_resolved(dir: TempDir) {
    let registry = SinkRegistry::new();
    let handle = register_n(&registry, &dir, 1)[0];
    let sink = registry.get(handle).expect("open sink");
    sink.close().expect("close sink directly");

    assert!(matches!(
        registry.get(handle),
        Err(SinkError::AlreadyClosed(_))
    ));
    assert!(matches!(
        registry.write_sync(handle, "late"),
        Err(SinkError::AlreadyClosed(_))
    ));
    assert!(matches!(
        registry.close(handle),
        Err(SinkError::AlreadyClosed(_))
    ));
    assert_eq!(registry.open_count(), 0);
}

#[rstest]
fn drop_closes_open_sinks(dir: TempDir) {
    let path = dir.path().join("dropped.log");
    {
        let registry = SinkRegistry::new();
        let handle = registry.register_file(&path).expect("register");
        for idx in 0..10 {
            registry
                .write_async(handle, format!("line {idx}"))
                .expect("dispatch");
        }
    }
    assert_eq!(fs::read_to_string(&path).expect("read").lines().count(), 10);
}

#[test]
fn handle_displays_as_index() {
    assert_eq!(SinkHandle::from(7).to_string(), "7");
    assert_eq!(SinkHandle::new(7).index(), 7);
}
