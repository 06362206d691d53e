//! Integration tests for syncing saves between a yuzu and a Ryujinx folder.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

use ryusync::archive::backup::BackupRotation;
use ryusync::archive::format::{ArchiveEntry, ArchiveHeader};
use ryusync::archive::reader::{Archive, ArchiveReader};
use ryusync::error::ToolError;
use ryusync::model::title::{SaveDirId, TitleId};
use ryusync::sync::engine::{SyncPolicyEngine, SyncSettings, TitlePair};
use ryusync::sync::layout::EmulatorLayout;
use ryusync::sync::policy::{Direction, PriorityMode, Reason};
use ryusync::sync::sync_saves;

const PROFILE: &str = "100F0E0D0C0B0A090807060504030201";
const KNOWN: &str = "0100000000010000";
const YUZU_ONLY: &str = "0100000000020000";

const OLD: u64 = 1_600_000_000;
const NEW: u64 = 1_700_000_000;

fn tid(s: &str) -> TitleId {
    s.parse().unwrap()
}

fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

fn write_file(path: &Path, contents: &str, mtime: u64) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(at(mtime))
        .unwrap();
}

fn mtime(path: &Path) -> SystemTime {
    std::fs::metadata(path).unwrap().modified().unwrap()
}

/// A yuzu and a Ryujinx folder with a profile, an archive mapping
/// [`KNOWN`] to save folder 2 and a yuzu-only title [`YUZU_ONLY`].
struct Fixture {
    temp: TempDir,
    layout: EmulatorLayout,
}

impl Fixture {
    fn new(yuzu_known_mtime: u64, ryujinx_known_mtime: u64) -> Self {
        let temp = TempDir::new().unwrap();
        let layout = EmulatorLayout::new(temp.path().join("yuzu"), temp.path().join("ryujinx"));

        let mut profiles = vec![0u8; 0x10];
        profiles.extend(1u8..=16);
        profiles.extend([0u8; 8]);
        let profile_path = layout.profile_store_path();
        std::fs::create_dir_all(profile_path.parent().unwrap()).unwrap();
        std::fs::write(&profile_path, profiles).unwrap();

        let archive = Archive {
            header: ArchiveHeader {
                reserved: [0; 8],
                entry_count: 0,
            },
            entries: vec![
                ArchiveEntry::synthesize(TitleId::SYSTEM, 1),
                ArchiveEntry::synthesize(tid(KNOWN), 2),
            ],
            trailer: Vec::new(),
        };
        let archive_path = layout.archive_path();
        std::fs::create_dir_all(archive_path.parent().unwrap()).unwrap();
        std::fs::write(&archive_path, archive.to_bytes()).unwrap();

        let fixture = Self { temp, layout };
        write_file(&fixture.yuzu(KNOWN).join("save.bin"), "yuzu", yuzu_known_mtime);
        write_file(
            &fixture.ryujinx(2).join("save.bin"),
            "ryujinx",
            ryujinx_known_mtime,
        );
        write_file(&fixture.yuzu(YUZU_ONLY).join("data/slot1"), "only", OLD);
        fixture
    }

    fn yuzu(&self, title: &str) -> PathBuf {
        let root = self.layout.yuzu_save_root(PROFILE);
        EmulatorLayout::yuzu_title_dir(&root, tid(title))
    }

    fn ryujinx(&self, save_dir: u64) -> PathBuf {
        self.layout.ryujinx_title_dir(SaveDirId::new(save_dir))
    }

    fn backup_dir(&self) -> PathBuf {
        self.temp.path().join("backups")
    }

    fn settings(&self, priority: PriorityMode, simulate: bool) -> SyncSettings {
        SyncSettings {
            priority,
            simulate,
            synthesize_entries: true,
            backup_dir: self.backup_dir(),
        }
    }
}

fn label(title: TitleId) -> String {
    format!("Game {title}")
}

// ─── Full runs ──────────────────────────────────────────────────────

#[test]
fn test_newest_sync_copies_both_ways_and_adds_entry() {
    let fx = Fixture::new(OLD, NEW);

    let report = sync_saves(
        &fx.layout,
        fx.settings(PriorityMode::Newest, false),
        5,
        &label,
        None,
    )
    .unwrap();
    assert!(report.failures.is_empty());
    assert!(!report.simulated);

    // The yuzu-only title got a fresh save folder after the highest index
    assert_eq!(report.synthesized.len(), 1);
    assert_eq!(report.synthesized[0].title_id, tid(YUZU_ONLY));
    assert_eq!(report.synthesized[0].save_dir_id, SaveDirId::new(3));
    // One backup, from the append; the result was already in order
    assert_eq!(report.archive_backups.len(), 1);
    assert!(report.archive_backups[0].exists());

    let index = ArchiveReader::read(&fx.layout.archive_path())
        .unwrap()
        .save_index();
    assert_eq!(index.get(tid(YUZU_ONLY)), Some(SaveDirId::new(3)));

    // B newer: Ryujinx save copied into yuzu, mtime kept
    let known = report
        .outcomes
        .iter()
        .find(|o| o.title_id == tid(KNOWN))
        .unwrap();
    assert_eq!(known.decision.reason, Reason::BNewer);
    assert_eq!(known.label, "Game 0100000000010000");
    fx.temp
        .child(fx.yuzu(KNOWN).join("save.bin"))
        .assert("ryujinx");
    assert_eq!(mtime(&fx.yuzu(KNOWN).join("save.bin")), at(NEW));

    // The overwritten yuzu tree was backed up first
    let backup = known.backup.as_ref().unwrap();
    assert!(backup.starts_with(fx.backup_dir()));
    assert!(backup.ends_with(Path::new("yuzu").join(KNOWN)));
    fx.temp.child(backup.join("save.bin")).assert("yuzu");

    // B missing: yuzu save copied into the new Ryujinx folder
    let new = report
        .outcomes
        .iter()
        .find(|o| o.title_id == tid(YUZU_ONLY))
        .unwrap();
    assert_eq!(new.decision.direction, Some(Direction::AToB));
    assert_eq!(new.decision.reason, Reason::BMissing);
    assert!(new.backup.is_none());
    fx.temp
        .child(fx.ryujinx(3).join("data/slot1"))
        .assert("only");
    assert_eq!(report.copy_count(), 2);
}

#[test]
fn test_second_run_is_in_sync() {
    let fx = Fixture::new(OLD, NEW);
    let settings = fx.settings(PriorityMode::Newest, false);
    sync_saves(&fx.layout, settings.clone(), 5, &label, None).unwrap();
    let archive_after_first = std::fs::read(fx.layout.archive_path()).unwrap();

    let report = sync_saves(&fx.layout, settings, 5, &label, None).unwrap();
    assert!(report.synthesized.is_empty());
    assert!(report.archive_backups.is_empty());
    assert_eq!(report.copy_count(), 0);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.decision.reason == Reason::InSync));
    assert_eq!(
        std::fs::read(fx.layout.archive_path()).unwrap(),
        archive_after_first
    );
}

#[test]
fn test_simulate_changes_nothing() {
    let fx = Fixture::new(OLD, NEW);
    let archive_path = fx.layout.archive_path();
    let archive_before = std::fs::read(&archive_path).unwrap();

    let report = sync_saves(
        &fx.layout,
        fx.settings(PriorityMode::Newest, true),
        5,
        &label,
        None,
    )
    .unwrap();
    assert!(report.simulated);

    // Decisions are still reported, including the planned title
    assert_eq!(report.synthesized.len(), 1);
    assert!(report.archive_backups.is_empty());
    let new = report
        .outcomes
        .iter()
        .find(|o| o.title_id == tid(YUZU_ONLY))
        .unwrap();
    assert_eq!(new.decision.reason, Reason::BMissing);
    assert_eq!(new.destination.as_deref(), Some(fx.ryujinx(3).as_path()));
    assert!(report.outcomes.iter().all(|o| o.copied.is_none()));

    assert_eq!(std::fs::read(&archive_path).unwrap(), archive_before);
    assert!(BackupRotation::for_archive(&archive_path, 5)
        .list()
        .unwrap()
        .is_empty());
    fx.temp
        .child(fx.yuzu(KNOWN).join("save.bin"))
        .assert("yuzu");
    fx.temp.child(fx.ryujinx(3)).assert(predicate::path::missing());
    fx.temp.child(fx.backup_dir()).assert(predicate::path::missing());
}

#[test]
fn test_priority_ryujinx_overrides_newer_yuzu() {
    let fx = Fixture::new(NEW, OLD);
    let mut settings = fx.settings(PriorityMode::PreferB, false);
    settings.synthesize_entries = false;

    let report = sync_saves(&fx.layout, settings, 5, &label, None).unwrap();
    assert!(report.synthesized.is_empty());
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].decision.reason, Reason::PriorityB);
    fx.temp
        .child(fx.yuzu(KNOWN).join("save.bin"))
        .assert("ryujinx");
    // Not in the archive, so left alone
    fx.temp.child(fx.ryujinx(3)).assert(predicate::path::missing());
}

#[test]
fn test_missing_archive_aborts() {
    let fx = Fixture::new(OLD, NEW);
    std::fs::remove_file(fx.layout.archive_path()).unwrap();

    let err = sync_saves(
        &fx.layout,
        fx.settings(PriorityMode::Newest, false),
        5,
        &label,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, ToolError::MissingPrerequisite(_)));
    fx.temp
        .child(fx.yuzu(KNOWN).join("save.bin"))
        .assert("yuzu");
    fx.temp.child(fx.backup_dir()).assert(predicate::path::missing());
}

#[test]
fn test_missing_profile_store_aborts() {
    let fx = Fixture::new(OLD, NEW);
    std::fs::remove_file(fx.layout.profile_store_path()).unwrap();
    let archive_before = std::fs::read(fx.layout.archive_path()).unwrap();

    let err = sync_saves(
        &fx.layout,
        fx.settings(PriorityMode::Newest, false),
        5,
        &label,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, ToolError::MissingPrerequisite(_)));
    assert_eq!(
        std::fs::read(fx.layout.archive_path()).unwrap(),
        archive_before
    );
}

#[test]
fn test_unsorted_archive_is_backed_up_before_sorting() {
    let fx = Fixture::new(OLD, NEW);
    // Every yuzu title is already known, but the records are out of order
    let unsorted = Archive {
        header: ArchiveHeader {
            reserved: [0; 8],
            entry_count: 0,
        },
        entries: vec![
            ArchiveEntry::synthesize(tid(YUZU_ONLY), 3),
            ArchiveEntry::synthesize(tid(KNOWN), 2),
            ArchiveEntry::synthesize(TitleId::SYSTEM, 1),
        ],
        trailer: Vec::new(),
    };
    let archive_path = fx.layout.archive_path();
    let original = unsorted.to_bytes();
    std::fs::write(&archive_path, &original).unwrap();

    let report = sync_saves(
        &fx.layout,
        fx.settings(PriorityMode::Newest, false),
        5,
        &label,
        None,
    )
    .unwrap();
    assert!(report.synthesized.is_empty());

    let backups = BackupRotation::for_archive(&archive_path, 5).list().unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(report.archive_backups, vec![backups[0].1.clone()]);
    assert_eq!(std::fs::read(&backups[0].1).unwrap(), original);

    let sorted = ArchiveReader::read(&archive_path).unwrap();
    assert_eq!(sorted.entries[0].title_id(), TitleId::SYSTEM);
    assert_eq!(sorted.entries[2].title_id(), tid(YUZU_ONLY));
}

// ─── Engine ─────────────────────────────────────────────────────────

fn pair(temp: &TempDir, title: &str) -> TitlePair {
    TitlePair {
        title_id: tid(title),
        label: title.to_string(),
        a_dir: temp.path().join("a").join(title),
        b_dir: temp.path().join("b").join(title),
    }
}

fn engine(temp: &TempDir) -> SyncPolicyEngine {
    SyncPolicyEngine::new(SyncSettings {
        priority: PriorityMode::Newest,
        simulate: false,
        synthesize_entries: false,
        backup_dir: temp.path().join("backups"),
    })
}

#[test]
fn test_failed_title_does_not_stop_run() {
    let temp = TempDir::new().unwrap();
    let broken = pair(&temp, "0100000000010000");
    let good = pair(&temp, "0100000000020000");

    // A is a plain file where the save folder should be: copying B into it fails
    write_file(&broken.b_dir.join("save.bin"), "b", NEW);
    write_file(&broken.a_dir, "not a folder", OLD);
    write_file(&good.a_dir.join("save.bin"), "a", NEW);

    let report = engine(&temp).run(&[broken.clone(), good.clone()], None);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].title_id, broken.title_id);
    assert_eq!(
        report.failures[0].decision.map(|d| d.reason),
        Some(Reason::AMissing)
    );

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].decision.reason, Reason::BMissing);
    temp.child(good.b_dir.join("save.bin")).assert("a");
    assert!(!report.cancelled);
}

#[test]
fn test_progress_callback_can_cancel() {
    let temp = TempDir::new().unwrap();
    let pairs: Vec<TitlePair> = ["0100000000010000", "0100000000020000", "0100000000030000"]
        .iter()
        .map(|t| pair(&temp, t))
        .collect();
    for p in &pairs {
        write_file(&p.a_dir.join("save.bin"), "a", NEW);
    }

    let seen = std::cell::RefCell::new(Vec::new());
    let report = engine(&temp).run(
        &pairs,
        Some(&|done: usize, total: usize, label: &str| {
            seen.borrow_mut().push((done, total, label.to_string()));
            false
        }),
    );

    assert!(report.cancelled);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(
        seen.into_inner(),
        vec![(1, 3, "0100000000010000".to_string())]
    );
    temp.child(pairs[0].b_dir.join("save.bin")).assert("a");
    temp.child(&pairs[1].b_dir).assert(predicate::path::missing());
}

#[test]
fn test_source_missing_under_priority_copies_nothing() {
    let temp = TempDir::new().unwrap();
    let p = pair(&temp, "0100000000010000");
    write_file(&p.b_dir.join("save.bin"), "b", NEW);

    let mut engine = SyncPolicyEngine::new(SyncSettings {
        priority: PriorityMode::PreferA,
        simulate: false,
        synthesize_entries: false,
        backup_dir: temp.path().join("backups"),
    });
    let report = engine.run(std::slice::from_ref(&p), None);
    assert!(report.failures.is_empty());

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.decision.reason, Reason::PriorityA);
    assert!(outcome.source_missing);
    assert!(!outcome.copies());
    assert!(outcome.copied.is_none());
    assert_eq!(report.copy_count(), 0);
    temp.child(p.b_dir.join("save.bin")).assert("b");
    temp.child("backups").assert(predicate::path::missing());
}

#[test]
fn test_simulate_does_not_count_missing_source() {
    let temp = TempDir::new().unwrap();
    let missing = pair(&temp, "0100000000010000");
    let present = pair(&temp, "0100000000020000");
    write_file(&missing.b_dir.join("save.bin"), "b", NEW);
    write_file(&present.a_dir.join("save.bin"), "a", NEW);

    let mut engine = SyncPolicyEngine::new(SyncSettings {
        priority: PriorityMode::PreferA,
        simulate: true,
        synthesize_entries: false,
        backup_dir: temp.path().join("backups"),
    });
    let report = engine.run(&[missing, present.clone()], None);
    assert_eq!(report.copy_count(), 1);
    assert!(report.outcomes[0].source_missing);
    assert!(report.outcomes[1].copies());
    temp.child(&present.b_dir).assert(predicate::path::missing());
}

#[test]
fn test_mtimes_within_tolerance_are_in_sync() {
    let temp = TempDir::new().unwrap();
    let p = pair(&temp, "0100000000010000");
    write_file(&p.a_dir.join("save.bin"), "a", NEW);
    write_file(&p.b_dir.join("save.bin"), "b", NEW + 1);

    let outcome = engine(&temp).sync_title(&p).unwrap();
    assert_eq!(outcome.decision.reason, Reason::InSync);
    assert!(outcome.destination.is_none());
    temp.child(p.a_dir.join("save.bin")).assert("a");
}
