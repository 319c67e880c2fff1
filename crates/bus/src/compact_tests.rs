// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::bus::{MessageBus, ReadFilter};
use crate::cursor::Cursor;
use pilot_core::clock::FakeClock;
use pilot_core::message::MessageType;
use pilot_core::BusMessage;

fn setup() -> (tempfile::TempDir, BusPaths, FakeClock) {
    let dir = tempfile::tempdir().unwrap();
    let paths = BusPaths::new(dir.path().join("messages"));
    (dir, paths, FakeClock::new())
}

fn fill_bus(paths: &BusPaths, clock: &FakeClock, count: usize) -> MessageBus<FakeClock> {
    let bus = MessageBus::new(paths.clone(), clock.clone()).with_compact_trigger(u64::MAX);
    for _ in 0..count {
        bus.send(BusMessage::new(MessageType::Notify, "S-1").to("S-2"))
            .unwrap();
    }
    bus
}

fn advance_reader(bus: &MessageBus<FakeClock>, reader: &str) -> Cursor {
    let result = bus.read(reader, &ReadFilter::default()).unwrap();
    let ids: Vec<String> = result.messages.iter().map(|m| m.id.to_string()).collect();
    let mut cursor = result.cursor;
    bus.acknowledge(&mut cursor, &ids).unwrap();
    cursor
}

#[test]
fn no_cursors_means_no_compaction() {
    let (_dir, paths, clock) = setup();
    fill_bus(&paths, &clock, 5);
    let report = compact(&paths, &clock).unwrap();
    assert_eq!(report.archived_bytes, 0);
    assert_eq!(report.cursors_rebased, 0);
}

#[test]
fn compaction_archives_consumed_prefix() {
    let (_dir, paths, clock) = setup();
    let bus = fill_bus(&paths, &clock, 10);
    let before = bus.len();

    // Reader consumes everything; its cursor sits at EOF
    advance_reader(&bus, "S-2");

    let report = compact(&paths, &clock).unwrap();
    assert_eq!(report.archived_bytes, before);
    assert_eq!(report.remaining_bytes, 0);
    assert_eq!(report.cursors_rebased, 1);

    // Bus shrank by exactly min_offset; cursor satisfies 0 <= offset <= size
    assert_eq!(bus.len(), 0);
    let cursor = Cursor::load(&paths, &clock, "S-2");
    assert_eq!(cursor.byte_offset, 0);

    // Archive holds the prefix
    let archive = std::fs::read_to_string(paths.archive_file(&clock.today())).unwrap();
    assert_eq!(archive.lines().count(), 10);
}

#[test]
fn compaction_keeps_unread_suffix() {
    let (_dir, paths, clock) = setup();
    let bus = fill_bus(&paths, &clock, 4);
    advance_reader(&bus, "S-2");
    let consumed = bus.len();

    // Four more messages the reader has not seen
    for _ in 0..4 {
        bus.send(BusMessage::new(MessageType::Notify, "S-1").to("S-2"))
            .unwrap();
    }
    // A second reader at offset 0 pins the floor... nothing to archive
    let mut lagging = Cursor::new("S-3");
    lagging.save(&paths, &clock).unwrap();
    let report = compact(&paths, &clock).unwrap();
    assert_eq!(report.archived_bytes, 0);

    // Remove the lagging reader; now the consumed prefix is archivable
    Cursor::delete(&paths, "S-3").unwrap();
    let report = compact(&paths, &clock).unwrap();
    assert_eq!(report.archived_bytes, consumed);

    // The reader still receives the unread tail after rebasing
    let result = bus.read("S-2", &ReadFilter::default()).unwrap();
    assert_eq!(result.messages.len(), 4);
}

#[test]
fn two_readers_offsets_rebase() {
    let (_dir, paths, clock) = setup();
    let bus = fill_bus(&paths, &clock, 10);
    let total = bus.len();

    // Reader A consumes everything, reader B only part: B's offset pins
    // the compaction floor
    advance_reader(&bus, "A");
    let partial = total / 2;
    let mut b = Cursor::new("B");
    b.byte_offset = partial;
    b.save(&paths, &clock).unwrap();

    let report = compact(&paths, &clock).unwrap();
    assert_eq!(report.archived_bytes, partial);

    let a = Cursor::load(&paths, &clock, "A");
    let b = Cursor::load(&paths, &clock, "B");
    assert_eq!(a.byte_offset, total - partial);
    assert_eq!(b.byte_offset, 0);
    assert_eq!(bus.len(), total - partial);
}

#[test]
fn corrupt_cursor_reads_from_archive_boundary() {
    let (_dir, paths, clock) = setup();
    let bus = fill_bus(&paths, &clock, 6);
    advance_reader(&bus, "S-2");

    // Third reader's cursor goes bad
    let path = paths.cursor_file("S-3");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "garbage").unwrap();

    // Compaction ignores the unparseable cursor (treated as absent)
    compact(&paths, &clock).unwrap();

    // The corrupt reader restarts at offset 0 of the compacted file and
    // sees only post-boundary traffic
    bus.send(BusMessage::new(MessageType::Notify, "S-1").to("S-3"))
        .unwrap();
    let result = bus.read("S-3", &ReadFilter::default()).unwrap();
    assert_eq!(result.messages.len(), 1);
}

#[test]
fn lock_contention_skips_cycle() {
    let (_dir, paths, clock) = setup();
    let bus = fill_bus(&paths, &clock, 3);
    advance_reader(&bus, "S-2");

    std::fs::create_dir_all(paths.root()).unwrap();
    std::fs::write(paths.compact_lock(), "999999 held").unwrap();

    assert!(matches!(
        compact(&paths, &clock),
        Err(BusError::LockContention)
    ));
}

#[test]
fn stale_lock_is_overwritten() {
    let (_dir, paths, clock) = setup();
    let bus = fill_bus(&paths, &clock, 3);
    advance_reader(&bus, "S-2");

    std::fs::create_dir_all(paths.root()).unwrap();
    std::fs::write(paths.compact_lock(), "1 old").unwrap();
    // The lock's mtime is wall-clock time; put the fake clock far enough
    // ahead of it that the lock is past the staleness window
    clock.set_epoch_ms(4_000_000_000_000);

    let report = compact(&paths, &clock).unwrap();
    assert!(report.archived_bytes > 0);
}

#[test]
fn compact_missing_bus_is_noop() {
    let (_dir, paths, clock) = setup();
    let report = compact(&paths, &clock).unwrap();
    assert_eq!(report.archived_bytes, 0);
}
