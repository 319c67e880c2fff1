//! Compaction safety: cursor rebasing, archive boundaries, and
//! corrupt-cursor recovery with two readers at different offsets.

use crate::prelude::Repo;
use pilot_bus::{compact, Cursor, ReadFilter};
use pilot_core::message::{BusMessage, MessageType};
use pilot_core::Clock;

fn fill(repo: &Repo, count: usize) {
    for _ in 0..count {
        repo.bus
            .send(BusMessage::new(MessageType::Notify, "S-writer").to("S-reader"))
            .unwrap();
    }
}

fn consume(repo: &Repo, reader: &str) {
    let result = repo.bus.read(reader, &ReadFilter::default()).unwrap();
    let ids: Vec<String> = result.messages.iter().map(|m| m.id.to_string()).collect();
    let mut cursor = result.cursor;
    repo.bus.acknowledge(&mut cursor, &ids).unwrap();
}

#[test]
fn offsets_rebase_and_reads_continue() {
    let repo = Repo::new();
    fill(&repo, 20);
    let total = repo.bus.len();

    // Reader A fully caught up; reader B parked halfway
    consume(&repo, "A");
    let halfway = total / 2;
    let mut b = Cursor::new("B");
    b.byte_offset = halfway;
    b.save(repo.bus.paths(), &repo.clock).unwrap();

    let report = compact(repo.bus.paths(), &repo.clock).unwrap();
    assert_eq!(report.archived_bytes, halfway);

    // Size shrank by exactly min_offset; every cursor is within bounds
    assert_eq!(repo.bus.len(), total - halfway);
    for cursor in Cursor::load_all(repo.bus.paths()) {
        assert!(cursor.byte_offset <= repo.bus.len());
    }
    let a = Cursor::load(repo.bus.paths(), &repo.clock, "A");
    assert_eq!(a.byte_offset, total - halfway);
    let b = Cursor::load(repo.bus.paths(), &repo.clock, "B");
    assert_eq!(b.byte_offset, 0);

    // Subsequent traffic reaches both readers
    fill(&repo, 2);
    let result = repo.bus.read("A", &ReadFilter::default()).unwrap();
    assert_eq!(result.messages.len(), 2);
}

#[test]
fn corrupt_cursor_restarts_at_archive_boundary() {
    let repo = Repo::new();
    fill(&repo, 10);
    consume(&repo, "A");

    // Third reader's cursor goes bad before compaction
    let cursor_path = repo.bus.paths().cursor_file("C");
    std::fs::create_dir_all(cursor_path.parent().unwrap()).unwrap();
    std::fs::write(&cursor_path, "{{{{").unwrap();

    compact(repo.bus.paths(), &repo.clock).unwrap();

    // The corrupt reader resets to offset 0 of the compacted file and sees
    // only post-boundary traffic, never an archived replay
    fill(&repo, 3);
    let result = repo.bus.read("C", &ReadFilter::default()).unwrap();
    assert_eq!(result.messages.len(), 3);
}

#[test]
fn archived_prefix_is_preserved_verbatim() {
    let repo = Repo::new();
    fill(&repo, 8);
    let before = std::fs::read_to_string(repo.bus.paths().bus_file()).unwrap();
    consume(&repo, "A");

    compact(repo.bus.paths(), &repo.clock).unwrap();

    let archive = std::fs::read_to_string(
        repo.bus.paths().archive_file(&repo.clock.today()),
    )
    .unwrap();
    assert_eq!(archive, before);
}
