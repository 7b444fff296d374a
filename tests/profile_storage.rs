use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use profiler_store::{
    storage::{ClientTimingRecord, CustomTimingRecord, SessionRecord, TimingRecord},
    ClientTiming, ClientTimings, CustomTiming, Database, ExecuteType, FlatStore, ListOrder,
    ListQuery, ProfileStorage, Session, StorageError, Timing, UpsertOutcome,
};

fn open(dir: &tempfile::TempDir) -> ProfileStorage<Database> {
    let db = Database::new(dir.path().join("profiler.db")).unwrap();
    ProfileStorage::new(db)
}

fn custom(command: &str, kind: ExecuteType, start_ms: f64) -> CustomTiming {
    let mut timing = CustomTiming::new(command, kind, start_ms);
    timing.duration_ms = Some(1.5);
    timing
}

/// root
/// ├── render (start 20)
/// └── query (start 5)
///     └── fetch (start 6)
fn sample_session() -> Session {
    let mut session = Session::new("GET /home", "web-01");
    session.user = Some("alice".into());
    session.duration_ms = 42.0;
    session.custom_links_json = Some(r#"{"trace":"/t/1"}"#.into());

    let mut root = Timing::new("GET /home", 0.0).with_duration(42.0);
    let render = Timing::new("render", 20.0).with_duration(10.0);
    let mut query = Timing::new("query", 5.0).with_duration(12.0);
    query.add_custom_timing("mongo", custom("db.users.find()", ExecuteType::Read, 9.0));
    query.add_custom_timing("mongo", custom("db.users.count()", ExecuteType::Read, 6.5));
    query.add_custom_timing("redis", custom("GET user:1", ExecuteType::Command, 7.0));
    let mut fetch = Timing::new("fetch", 6.0).with_duration(2.0);
    fetch.add_custom_timing("http", custom("GET /api", ExecuteType::None, 6.1));
    query.add_child(fetch);
    root.add_child(render);
    root.add_child(query);
    session.root = Some(root);

    session.client_timings = Some(ClientTimings {
        redirect_count: 1,
        timings: vec![
            ClientTiming::new("domComplete", 30.0, 0.0),
            ClientTiming::new("requestStart", 2.0, 3.0),
        ],
    });
    session
}

#[tokio::test]
async fn round_trip_rebuilds_tree_in_start_order() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open(&dir);
    let mut session = sample_session();

    storage.save(&mut session).await.unwrap();
    let loaded = storage.load(session.id).await.unwrap().unwrap();

    assert_eq!(loaded.id, session.id);
    assert_eq!(loaded.name, session.name);
    assert_eq!(loaded.started, session.started);
    assert_eq!(loaded.duration_ms, 42.0);
    assert_eq!(loaded.user.as_deref(), Some("alice"));
    assert_eq!(loaded.machine_name, "web-01");
    assert_eq!(loaded.custom_links_json, session.custom_links_json);
    assert!(!loaded.has_user_viewed);

    let root = loaded.root.as_ref().unwrap();
    let names: Vec<_> = root.children.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["query", "render"]);

    let query = &root.children[0];
    assert_eq!(query.start_ms, 5.0);
    assert_eq!(query.duration_ms, 12.0);
    assert_eq!(query.children.len(), 1);
    assert_eq!(query.children[0].name, "fetch");
    assert_eq!(query.children[0].custom_timings["http"][0].execute_type, ExecuteType::None);

    let mongo: Vec<_> = query.custom_timings["mongo"]
        .iter()
        .map(|c| c.command_string.as_str())
        .collect();
    assert_eq!(mongo, ["db.users.count()", "db.users.find()"]);
    assert_eq!(query.custom_timings["redis"].len(), 1);
    assert_eq!(query.custom_timings["mongo"][0].duration_ms, Some(1.5));

    let client = loaded.client_timings.as_ref().unwrap();
    assert_eq!(client.redirect_count, 1);
    let client_names: Vec<_> = client.timings.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(client_names, ["requestStart", "domComplete"]);
    assert!(client.timings.iter().all(|t| t.session_id == Some(session.id)));
    assert_eq!(loaded.timing_count(), 4);
}

#[tokio::test]
async fn save_assigns_client_timing_ids_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open(&dir);
    let mut session = sample_session();

    storage.save(&mut session).await.unwrap();

    let client = session.client_timings.as_ref().unwrap();
    assert!(client.timings.iter().all(|t| t.id.is_some()));
    assert!(client.timings.iter().all(|t| t.session_id == Some(session.id)));
}

#[tokio::test]
async fn second_save_keeps_the_first_timing_tree() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open(&dir);
    let mut first = sample_session();
    storage.save(&mut first).await.unwrap();

    let mut second = first.clone();
    second.name = "renamed".into();
    second.root = Some(Timing::new("a different tree", 0.0).with_duration(1.0));
    storage.save(&mut second).await.unwrap();

    let loaded = storage.load(first.id).await.unwrap().unwrap();
    assert_eq!(loaded.name, "renamed");
    let root = loaded.root.unwrap();
    assert_eq!(root.name, "GET /home");
    assert_eq!(root.children.len(), 2);
}

#[tokio::test]
async fn second_save_replaces_client_timings() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open(&dir);
    let mut session = sample_session();
    storage.save(&mut session).await.unwrap();

    session.client_timings = Some(ClientTimings {
        redirect_count: 3,
        timings: vec![ClientTiming::new("loadEventEnd", 50.0, 1.0)],
    });
    storage.save(&mut session).await.unwrap();

    let loaded = storage.load(session.id).await.unwrap().unwrap();
    let client = loaded.client_timings.unwrap();
    assert_eq!(client.redirect_count, 3);
    assert_eq!(client.timings.len(), 1);
    assert_eq!(client.timings[0].name, "loadEventEnd");
}

#[tokio::test]
async fn save_without_client_timings_keeps_stored_ones() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open(&dir);
    let mut session = sample_session();
    session.client_timings = Some(ClientTimings {
        redirect_count: 3,
        timings: vec![ClientTiming::new("requestStart", 2.0, 3.0)],
    });
    storage.save(&mut session).await.unwrap();

    session.client_timings = None;
    session.duration_ms = 50.0;
    storage.save(&mut session).await.unwrap();

    let loaded = storage.load(session.id).await.unwrap().unwrap();
    assert_eq!(loaded.duration_ms, 50.0);
    let client = loaded.client_timings.unwrap();
    assert_eq!(client.redirect_count, 3);
    assert_eq!(client.timings.len(), 1);
    assert_eq!(client.timings[0].name, "requestStart");
}

#[tokio::test]
async fn rootless_first_save_never_gains_a_tree() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open(&dir);
    let mut session = sample_session();
    let tree = session.root.take().unwrap();
    assert!(tree.has_children());
    storage.save(&mut session).await.unwrap();

    session.root = Some(tree);
    storage.save(&mut session).await.unwrap();

    let loaded = storage.load(session.id).await.unwrap().unwrap();
    assert!(loaded.root.is_none());
    assert!(loaded.client_timings.is_some());
}

#[tokio::test]
async fn resubmitted_client_timings_update_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open(&dir);
    let mut session = sample_session();
    storage.save(&mut session).await.unwrap();

    let client = session.client_timings.as_mut().unwrap();
    client.timings[0].duration_ms = 99.0;
    let updated_id = client.timings[0].id;
    storage.save(&mut session).await.unwrap();

    let loaded = storage.load(session.id).await.unwrap().unwrap();
    let timings = loaded.client_timings.unwrap().timings;
    assert_eq!(timings.len(), 2);
    let updated = timings.iter().find(|t| t.id == updated_id).unwrap();
    assert_eq!(updated.duration_ms, 99.0);
}

#[tokio::test]
async fn equal_start_offsets_are_ordered_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open(&dir);

    let id_a = Uuid::from_u128(0xA);
    let id_b = Uuid::from_u128(0xB);
    let id_c = Uuid::from_u128(0xC);

    let mut root = Timing::new("root", 0.0);
    // Insert order deliberately disagrees with the expected order.
    for (id, name, start) in [(id_b, "B", 5.0), (id_a, "A", 5.0), (id_c, "C", 2.0)] {
        let mut child = Timing::new(name, start);
        child.id = id;
        root.add_child(child);
    }
    let mut session = Session::new("ties", "web-01");
    session.root = Some(root);
    storage.save(&mut session).await.unwrap();

    for _ in 0..3 {
        let loaded = storage.load(session.id).await.unwrap().unwrap();
        let ids: Vec<_> = loaded.root.unwrap().children.iter().map(|t| t.id).collect();
        assert_eq!(ids, [id_c, id_a, id_b]);
    }
}

#[tokio::test]
async fn dangling_root_reference_loads_without_root() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open(&dir);

    let record = SessionRecord {
        id: Uuid::new_v4(),
        name: "half saved".into(),
        started: Utc::now(),
        machine_name: "web-02".into(),
        user: None,
        root_timing_id: Some(Uuid::new_v4()),
        duration_ms: 3.0,
        custom_links_json: None,
        client_timings_redirect_count: None,
        has_user_viewed: false,
    };
    let outcome = storage.store().replace_session(&record).await.unwrap();
    assert_eq!(outcome, UpsertOutcome::Inserted);

    let loaded = storage.load(record.id).await.unwrap().unwrap();
    assert!(loaded.root.is_none());
    assert!(loaded.client_timings.is_none());
}

#[tokio::test]
async fn redirect_count_alone_yields_empty_client_timings() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open(&dir);

    let mut session = Session::new("redirected", "web-01");
    session.client_timings = Some(ClientTimings {
        redirect_count: 2,
        timings: Vec::new(),
    });
    storage.save(&mut session).await.unwrap();

    let loaded = storage.load(session.id).await.unwrap().unwrap();
    assert!(loaded.root.is_none());
    assert_eq!(
        loaded.client_timings,
        Some(ClientTimings {
            redirect_count: 2,
            timings: Vec::new(),
        })
    );
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open(&dir);
    assert!(storage.load(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn viewed_flag_controls_unviewed_listing() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open(&dir);

    let mut mine = Session::new("mine", "web-01");
    mine.user = Some("bob".into());
    mine.has_user_viewed = true;
    let mut theirs = Session::new("theirs", "web-01");
    theirs.user = Some("carol".into());
    storage.save(&mut mine).await.unwrap();
    storage.save(&mut theirs).await.unwrap();

    assert!(storage.list_unviewed_ids("bob").await.unwrap().is_empty());

    storage.mark_unviewed("bob", mine.id).await.unwrap();
    assert_eq!(storage.list_unviewed_ids("bob").await.unwrap(), [mine.id]);

    storage.mark_viewed("bob", mine.id).await.unwrap();
    assert!(storage.list_unviewed_ids("bob").await.unwrap().is_empty());
    assert_eq!(storage.list_unviewed_ids("carol").await.unwrap(), [theirs.id]);

    // Unknown ids are ignored rather than failing.
    storage.mark_viewed("bob", Uuid::new_v4()).await.unwrap();
}

#[tokio::test]
async fn list_filters_orders_and_limits_by_start_time() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open(&dir);
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    let mut ids = Vec::new();
    for minute in 0..5 {
        let mut session = Session::new(format!("req {minute}"), "web-01");
        session.started = base + Duration::minutes(minute);
        storage.save(&mut session).await.unwrap();
        ids.push(session.id);
    }

    let newest_first = storage
        .list_ids(10, None, None, ListOrder::Descending)
        .await
        .unwrap();
    assert_eq!(newest_first, ids.iter().rev().copied().collect::<Vec<_>>());

    let window = storage
        .list_ids(
            10,
            Some(base + Duration::minutes(1)),
            Some(base + Duration::minutes(4)),
            ListOrder::Ascending,
        )
        .await
        .unwrap();
    assert_eq!(window, ids[2..4]);

    let limited = storage
        .list_ids(2, Some(base), None, ListOrder::Ascending)
        .await
        .unwrap();
    assert_eq!(limited, ids[1..3]);
}

#[tokio::test]
async fn cancelled_token_stops_before_touching_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open(&dir);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut session = sample_session();
    let err = storage.save_with_cancel(&mut session, &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(storage.load(session.id).await.unwrap().is_none());

    let err = storage.load_with_cancel(session.id, &cancel).await.unwrap_err();
    assert!(matches!(err, StorageError::Cancelled));
}

/// Delegates to a real database and cancels the token once children are requested.
struct CancelOnChildren {
    inner: Database,
    cancel: CancellationToken,
    child_lookups: Arc<AtomicUsize>,
}

#[async_trait]
impl FlatStore for CancelOnChildren {
    async fn find_session(&self, id: Uuid) -> Result<Option<SessionRecord>> {
        FlatStore::find_session(&self.inner, id).await
    }
    async fn replace_session(&self, record: &SessionRecord) -> Result<UpsertOutcome> {
        FlatStore::replace_session(&self.inner, record).await
    }
    async fn set_session_viewed(&self, id: Uuid, viewed: bool) -> Result<bool> {
        FlatStore::set_session_viewed(&self.inner, id, viewed).await
    }
    async fn find_unviewed_session_ids(&self, user: &str) -> Result<Vec<Uuid>> {
        FlatStore::find_unviewed_session_ids(&self.inner, user).await
    }
    async fn find_session_ids(&self, query: &ListQuery) -> Result<Vec<Uuid>> {
        FlatStore::find_session_ids(&self.inner, query).await
    }
    async fn find_timing(&self, id: Uuid) -> Result<Option<TimingRecord>> {
        FlatStore::find_timing(&self.inner, id).await
    }
    async fn find_child_timings(&self, parent_id: Uuid) -> Result<Vec<TimingRecord>> {
        self.child_lookups.fetch_add(1, Ordering::SeqCst);
        self.cancel.cancel();
        FlatStore::find_child_timings(&self.inner, parent_id).await
    }
    async fn insert_timing(&self, record: &TimingRecord) -> Result<()> {
        FlatStore::insert_timing(&self.inner, record).await
    }
    async fn find_custom_timings(&self, timing_id: Uuid) -> Result<Vec<CustomTimingRecord>> {
        FlatStore::find_custom_timings(&self.inner, timing_id).await
    }
    async fn insert_custom_timing(&self, record: &CustomTimingRecord) -> Result<()> {
        FlatStore::insert_custom_timing(&self.inner, record).await
    }
    async fn find_client_timings(&self, session_id: Uuid) -> Result<Vec<ClientTimingRecord>> {
        FlatStore::find_client_timings(&self.inner, session_id).await
    }
    async fn replace_client_timing(&self, record: &ClientTimingRecord) -> Result<UpsertOutcome> {
        FlatStore::replace_client_timing(&self.inner, record).await
    }
    async fn delete_client_timings_except(&self, session_id: Uuid, keep: &[Uuid]) -> Result<usize> {
        FlatStore::delete_client_timings_except(&self.inner, session_id, keep).await
    }
}

#[tokio::test]
async fn cancellation_mid_load_is_not_a_partial_tree() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("profiler.db")).unwrap();
    let mut session = sample_session();
    ProfileStorage::new(db.clone()).save(&mut session).await.unwrap();

    let cancel = CancellationToken::new();
    let lookups = Arc::new(AtomicUsize::new(0));
    let storage = ProfileStorage::new(CancelOnChildren {
        inner: db,
        cancel: cancel.clone(),
        child_lookups: lookups.clone(),
    });

    let err = storage
        .load_with_cancel(session.id, &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(lookups.load(Ordering::SeqCst), 1);
}
