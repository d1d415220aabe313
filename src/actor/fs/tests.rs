use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;

use super::debouncer::{DEBOUNCE_MS, Debouncer, Slot};
use super::*;
use crate::core::{Target, Targets};
use crate::utils::path::normalize_path;

fn make_event(paths: Vec<PathBuf>, kind: notify::EventKind) -> notify::Event {
    notify::Event {
        kind,
        paths,
        attrs: Default::default(),
    }
}

fn modify_kind() -> notify::EventKind {
    notify::EventKind::Modify(notify::event::ModifyKind::Data(
        notify::event::DataChange::Any,
    ))
}

fn create_kind() -> notify::EventKind {
    notify::EventKind::Create(notify::event::CreateKind::File)
}

fn remove_kind() -> notify::EventKind {
    notify::EventKind::Remove(notify::event::RemoveKind::File)
}

fn metadata_kind() -> notify::EventKind {
    notify::EventKind::Modify(notify::event::ModifyKind::Metadata(
        notify::event::MetadataKind::WriteTime,
    ))
}

/// `ui/src`, `game/src` and a sibling `ui/src-old`, all with one file.
fn make_project() -> (TempDir, PathBuf, WatchSet) {
    let temp = TempDir::new().unwrap();
    let root = normalize_path(temp.path());
    for dir in ["ui/src", "ui/src-old", "game/src"] {
        fs::create_dir_all(root.join(dir)).unwrap();
    }
    fs::write(root.join("ui/src/app.ts"), "export {}").unwrap();
    fs::write(root.join("ui/src/app.css"), "body {}").unwrap();
    fs::write(root.join("ui/src-old/app.ts"), "").unwrap();
    fs::write(root.join("game/src/game.ts"), "export {}").unwrap();

    let watch_set = WatchSet::new([
        (Target::Ui, root.join("ui/src")),
        (Target::Game, root.join("game/src")),
    ]);
    (temp, root, watch_set)
}

fn window() -> Duration {
    Duration::from_millis(DEBOUNCE_MS)
}

// =============================================================================
// Debouncer
// =============================================================================

#[test]
fn test_debouncer_idle() {
    let mut debouncer = Debouncer::new();
    let now = Instant::now();
    assert_eq!(debouncer.take_due(now), Targets::empty());
    assert!(debouncer.sleep_duration(now) >= Duration::from_secs(3600));
}

#[test]
fn test_window_starts_at_first_event_and_fires_once() {
    let mut debouncer = Debouncer::new();
    let t0 = Instant::now();

    debouncer.on_change(Targets::UI, t0);
    debouncer.on_change(Targets::UI, t0 + Duration::from_millis(50));
    debouncer.on_change(Targets::UI, t0 + Duration::from_millis(450));
    assert_eq!(
        debouncer.slot(Target::Ui),
        Slot::Pending { deadline: t0 + window() }
    );

    assert_eq!(debouncer.take_due(t0 + Duration::from_millis(499)), Targets::empty());
    assert_eq!(debouncer.take_due(t0 + window()), Targets::UI);
    assert_eq!(debouncer.slot(Target::Ui), Slot::Idle);
    assert_eq!(debouncer.take_due(t0 + Duration::from_secs(5)), Targets::empty());
}

#[test]
fn test_targets_debounce_independently() {
    let mut debouncer = Debouncer::new();
    let t0 = Instant::now();

    debouncer.on_change(Targets::UI, t0);
    debouncer.on_change(Targets::GAME, t0 + Duration::from_millis(300));

    assert_eq!(debouncer.take_due(t0 + window()), Targets::UI);
    assert_eq!(debouncer.slot(Target::Game), Slot::Pending {
        deadline: t0 + Duration::from_millis(800)
    });
    assert_eq!(
        debouncer.take_due(t0 + Duration::from_millis(800)),
        Targets::GAME
    );
}

#[test]
fn test_event_at_deadline_is_not_lost() {
    let mut debouncer = Debouncer::new();
    let t0 = Instant::now();
    let deadline = t0 + window();

    debouncer.on_change(Targets::UI, t0);
    // Arrives at the deadline, before the tick: absorbed into the firing window.
    debouncer.on_change(Targets::UI, deadline);
    assert_eq!(debouncer.take_due(deadline), Targets::UI);

    // Arrives right after the tick: opens a new window.
    debouncer.on_change(Targets::UI, deadline);
    assert_eq!(debouncer.slot(Target::Ui), Slot::Pending {
        deadline: deadline + window()
    });
    assert_eq!(debouncer.take_due(deadline + window()), Targets::UI);
}

#[test]
fn test_overlapping_change_opens_both_windows() {
    let mut debouncer = Debouncer::with_window(Duration::from_millis(100));
    let t0 = Instant::now();
    debouncer.on_change(Targets::all(), t0);
    assert_eq!(debouncer.sleep_duration(t0), Duration::from_millis(100));
    assert_eq!(
        debouncer.take_due(t0 + Duration::from_millis(100)),
        Targets::all()
    );
}

#[test]
fn test_sleep_duration_tracks_earliest_deadline() {
    let mut debouncer = Debouncer::new();
    let t0 = Instant::now();
    debouncer.on_change(Targets::GAME, t0);
    debouncer.on_change(Targets::UI, t0 + Duration::from_millis(200));

    assert_eq!(
        debouncer.sleep_duration(t0 + Duration::from_millis(200)),
        Duration::from_millis(300)
    );
    // Overdue deadlines still sleep a minimal tick.
    assert_eq!(
        debouncer.sleep_duration(t0 + Duration::from_secs(2)),
        Duration::from_millis(1)
    );
}

// =============================================================================
// Classifier
// =============================================================================

#[test]
fn test_classify_uses_path_containment() {
    let (_temp, root, watch_set) = make_project();

    assert_eq!(watch_set.classify(&root.join("ui/src/app.ts")), Targets::UI);
    assert_eq!(watch_set.classify(&root.join("ui/src/deep/x/y.ts")), Targets::UI);
    assert_eq!(watch_set.classify(&root.join("game/src/game.ts")), Targets::GAME);
    assert_eq!(watch_set.classify(&root.join("ui/src")), Targets::UI);
    // Shares a string prefix with `ui/src` but is a sibling directory.
    assert_eq!(watch_set.classify(&root.join("ui/src-old/app.ts")), Targets::empty());
    assert_eq!(watch_set.classify(&root.join("ui/other.ts")), Targets::empty());
}

#[test]
fn test_classify_overlapping_paths() {
    let (_temp, root, _) = make_project();
    let shared = root.join("shared");
    fs::create_dir_all(&shared).unwrap();
    let watch_set = WatchSet::new([
        (Target::Ui, shared.clone()),
        (Target::Game, shared.clone()),
        (Target::Game, root.join("game/src")),
    ]);

    assert_eq!(watch_set.classify(&shared.join("types.ts")), Targets::all());
    assert_eq!(watch_set.roots().len(), 2);
    assert_eq!(watch_set.paths(Target::Game).count(), 2);
}

#[test]
fn test_single_file_watch_path() {
    let (_temp, root, _) = make_project();
    let file = root.join("game/src/game.ts");
    let watch_set = WatchSet::new([(Target::Game, file.clone())]);
    assert_eq!(watch_set.classify(&file), Targets::GAME);
    assert_eq!(watch_set.classify(&root.join("game/src/other.ts")), Targets::empty());
}

#[test]
fn test_write_kinds() {
    assert!(is_write(&modify_kind()));
    assert!(is_write(&create_kind()));
    assert!(!is_write(&remove_kind()));
    assert!(!is_write(&metadata_kind()));
    assert!(!is_write(&notify::EventKind::Modify(
        notify::event::ModifyKind::Name(notify::event::RenameMode::From)
    )));
    assert!(is_write(&notify::EventKind::Modify(
        notify::event::ModifyKind::Name(notify::event::RenameMode::To)
    )));
    assert!(is_write(&notify::EventKind::Modify(
        notify::event::ModifyKind::Name(notify::event::RenameMode::Both)
    )));
}

#[test]
fn test_rename_over_watched_file_is_attributed() {
    let (_temp, root, _) = make_project();
    let file = root.join("game/src/game.ts");
    let watch_set = WatchSet::new([(Target::Game, file.clone())]);

    let both = make_event(
        vec![root.join("game/src/game.ts.new"), file.clone()],
        notify::EventKind::Modify(notify::event::ModifyKind::Name(
            notify::event::RenameMode::Both,
        )),
    );
    assert_eq!(
        classify_event(&both, &watch_set),
        vec![ChangeEvent {
            path: file,
            targets: Targets::GAME
        }]
    );
}

#[test]
fn test_attach_points_watch_file_through_parent() {
    let (_temp, root, _) = make_project();
    fs::write(root.join("game/rules.json"), "{}").unwrap();
    fs::write(root.join("game/board.json"), "{}").unwrap();
    let watch_set = WatchSet::new([
        (Target::Ui, root.join("ui/src")),
        (Target::Ui, root.join("ui/src/app.ts")),
        (Target::Game, root.join("game/rules.json")),
        (Target::Game, root.join("game/board.json")),
    ]);

    let points = attach_points(&watch_set).unwrap();
    assert_eq!(
        points,
        vec![
            (root.join("ui/src"), notify::RecursiveMode::Recursive),
            (root.join("game"), notify::RecursiveMode::NonRecursive),
        ]
    );
}

#[test]
fn test_attach_points_missing_file_is_fatal() {
    let (_temp, root, _) = make_project();
    let watch_set = WatchSet::new([(Target::Game, root.join("game/missing.json"))]);
    match attach_points(&watch_set) {
        Err(WatchError::Setup { path, .. }) => assert!(path.ends_with("game/missing.json")),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_classify_event_filters() {
    let (_temp, root, watch_set) = make_project();

    let changes = classify_event(
        &make_event(
            vec![
                root.join("ui/src/app.ts"),
                root.join("ui/src/.app.ts.swp"),
                root.join("ui/src/app.ts~"),
                root.join("elsewhere.ts"),
                root.join("game/src/game.ts"),
            ],
            modify_kind(),
        ),
        &watch_set,
    );
    assert_eq!(
        changes,
        vec![
            ChangeEvent {
                path: root.join("ui/src/app.ts"),
                targets: Targets::UI
            },
            ChangeEvent {
                path: root.join("game/src/game.ts"),
                targets: Targets::GAME
            },
        ]
    );

    let removed = make_event(vec![root.join("ui/src/app.ts")], remove_kind());
    assert!(classify_event(&removed, &watch_set).is_empty());
}

// =============================================================================
// FsActor (real watcher)
// =============================================================================

async fn spawn_actor(
    watch_set: WatchSet,
    window: Duration,
) -> (
    mpsc::Receiver<BuildMsg>,
    CancellationToken,
    tokio::task::JoinHandle<()>,
) {
    let (tx, rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();
    let actor = FsActor::new(watch_set, tx, shutdown.clone())
        .unwrap()
        .with_debounce(window);
    let handle = tokio::spawn(actor.run());
    (rx, shutdown, handle)
}

#[tokio::test]
async fn test_burst_of_ui_writes_triggers_one_ui_rebuild() {
    let (_temp, root, watch_set) = make_project();
    let (mut rx, shutdown, handle) = spawn_actor(watch_set, Duration::from_millis(300)).await;

    let started = std::time::Instant::now();
    fs::write(root.join("ui/src/app.ts"), "export const a = 1").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    fs::write(root.join("ui/src/app.css"), "body { color: red }").unwrap();

    let msg = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert_eq!(msg, Some(BuildMsg::Rebuild(Targets::UI)));
    assert!(started.elapsed() >= Duration::from_millis(250));

    // Nothing else: no second UI request, no Game request.
    assert!(timeout(Duration::from_millis(800), rx.recv()).await.is_err());

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_writes_to_both_modules_trigger_both() {
    let (_temp, root, watch_set) = make_project();
    let (mut rx, shutdown, handle) = spawn_actor(watch_set, Duration::from_millis(200)).await;

    fs::write(root.join("ui/src/app.ts"), "1").unwrap();
    fs::write(root.join("game/src/game.ts"), "2").unwrap();

    let mut seen = Targets::empty();
    for _ in 0..2 {
        match timeout(Duration::from_secs(5), rx.recv()).await.unwrap() {
            Some(BuildMsg::Rebuild(targets)) => seen |= targets,
            other => panic!("unexpected message: {other:?}"),
        }
    }
    assert_eq!(seen, Targets::all());

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_single_file_survives_atomic_save() {
    let (_temp, root, _) = make_project();
    let rules = root.join("game/rules.json");
    fs::write(&rules, "{}").unwrap();
    let watch_set = WatchSet::new([(Target::Game, rules.clone())]);
    let (mut rx, shutdown, handle) = spawn_actor(watch_set, Duration::from_millis(100)).await;

    // Editor-style save: write a sibling, then rename it over the file.
    let staged = root.join("game/rules.json.new");
    fs::write(&staged, r#"{"v":1}"#).unwrap();
    fs::rename(&staged, &rules).unwrap();
    let msg = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert_eq!(msg, Some(BuildMsg::Rebuild(Targets::GAME)));

    // The replaced file is still watched.
    tokio::time::sleep(Duration::from_millis(200)).await;
    fs::write(&rules, r#"{"v":2}"#).unwrap();
    let msg = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert_eq!(msg, Some(BuildMsg::Rebuild(Targets::GAME)));

    // Siblings in the parent directory are not watched.
    fs::write(root.join("game/notes.txt"), "x").unwrap();
    assert!(timeout(Duration::from_millis(500), rx.recv()).await.is_err());

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_missing_watch_path_is_fatal() {
    let (_temp, root, _) = make_project();
    let watch_set = WatchSet::new([
        (Target::Ui, root.join("ui/src")),
        (Target::Game, root.join("game/does-not-exist")),
    ]);
    let (tx, _rx) = mpsc::channel(1);

    match FsActor::new(watch_set, tx, CancellationToken::new()) {
        Err(WatchError::Setup { path, .. }) => assert!(path.ends_with("game/does-not-exist")),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("watching a missing path must fail"),
    }
}

#[tokio::test]
async fn test_actor_stops_when_build_actor_is_gone() {
    let (_temp, root, watch_set) = make_project();
    let (rx, _shutdown, handle) = spawn_actor(watch_set, Duration::from_millis(50)).await;
    drop(rx);

    fs::write(root.join("ui/src/app.ts"), "x").unwrap();
    timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}
