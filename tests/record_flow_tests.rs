use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use record_service::ids::IdGenerator;
use record_service::storage::StorageResult;
use record_service::{
    Claims, Datastore, DatastoreRecordRepository, EventBus, EventBusConfig, InMemoryRecordStore,
    Record, RecordBusiness, RecordRepository, RecordSave, RecordStore, RequestContext,
    ServiceError,
};

/// Counts lookups so tests can tell whether a call reached storage.
#[derive(Clone, Default)]
struct CountingStore {
    inner: InMemoryRecordStore,
    lookups: Arc<AtomicUsize>,
}

#[async_trait]
impl RecordStore for CountingStore {
    async fn ensure_schema(&self) -> StorageResult<()> {
        self.inner.ensure_schema().await
    }

    async fn upsert(&self, record: &Record) -> StorageResult<u64> {
        self.inner.upsert(record).await
    }

    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Record>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_id(id).await
    }

    async fn find_by_name(&self, name: &str) -> StorageResult<Option<Record>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_name(name).await
    }

    async fn row_count(&self) -> StorageResult<usize> {
        self.inner.row_count().await
    }
}

struct FixedId(&'static str);

impl IdGenerator for FixedId {
    fn generate(&self) -> String {
        self.0.to_string()
    }
}

struct Harness {
    business: RecordBusiness,
    bus: Arc<EventBus>,
    store: CountingStore,
}

fn harness_with(config: EventBusConfig, ids: Option<Arc<dyn IdGenerator>>) -> Harness {
    let store = CountingStore::default();
    let repository: Arc<dyn RecordRepository> = Arc::new(DatastoreRecordRepository::new(
        Datastore::new(Arc::new(store.clone())),
    ));
    let bus = Arc::new(
        EventBus::builder(config)
            .register(RecordSave::new(Arc::clone(&repository)))
            .build()
            .expect("bus should build"),
    );

    let mut builder = RecordBusiness::builder()
        .event_bus(Arc::clone(&bus))
        .repository(repository);
    if let Some(ids) = ids {
        builder = builder.id_generator(ids);
    }

    Harness {
        business: builder.build().expect("business should build"),
        bus,
        store,
    }
}

fn harness() -> Harness {
    harness_with(EventBusConfig::inline(), None)
}

fn tenant_context() -> RequestContext {
    RequestContext::background().with_claims(
        Claims::new("user-1")
            .tenant("T1")
            .partition("P1")
            .access("A1"),
    )
}

#[tokio::test]
async fn store_then_get_returns_the_same_record() {
    let h = harness();
    let ctx = tenant_context();

    let stored = h.business.store(&ctx, "Alpha").await.unwrap();
    assert!(!stored.id.is_empty());
    assert_eq!(stored.tenant_id.as_deref(), Some("T1"));
    assert_eq!(stored.name, "Alpha");

    let fetched = h.business.get(&ctx, &stored.id).await.unwrap();
    assert_eq!(fetched, stored);
}

#[tokio::test]
async fn persisted_ownership_matches_the_caller_exactly() {
    let h = harness();

    let stored = h.business.store(&tenant_context(), "Alpha").await.unwrap();
    let row = h.store.inner.find_by_id(&stored.id).await.unwrap().unwrap();

    assert_eq!(row.tenant_id.as_deref(), Some("T1"));
    assert_eq!(row.partition_id.as_deref(), Some("P1"));
    assert_eq!(row.access_id.as_deref(), Some("A1"));
}

#[tokio::test]
async fn anonymous_store_leaves_ownership_empty() {
    let h = harness();

    let stored = h
        .business
        .store(&RequestContext::background(), "Anon")
        .await
        .unwrap();
    assert!(stored.ownership().is_empty());

    let row = h.store.inner.find_by_id(&stored.id).await.unwrap().unwrap();
    assert!(row.ownership().is_empty());
}

#[tokio::test]
async fn empty_name_is_accepted() {
    let h = harness();
    let stored = h
        .business
        .store(&RequestContext::background(), "")
        .await
        .unwrap();
    assert_eq!(h.business.get(&RequestContext::background(), &stored.id).await.unwrap().name, "");
}

#[tokio::test]
async fn get_with_empty_id_never_reaches_storage() {
    let h = harness();

    let err = h
        .business
        .get(&RequestContext::background(), "")
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::InvalidArgument(_)));
    assert_eq!(h.store.lookups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn get_unknown_id_is_not_found() {
    let h = harness();
    let err = h
        .business
        .get(&RequestContext::background(), "does-not-exist")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn forced_identifier_resolves_to_the_latest_name() {
    let h = harness_with(EventBusConfig::inline(), Some(Arc::new(FixedId("forced-1"))));
    let ctx = tenant_context();

    h.business.store(&ctx, "first").await.unwrap();
    h.business.store(&ctx, "second").await.unwrap();

    assert_eq!(h.store.row_count().await.unwrap(), 1);
    assert_eq!(h.business.get(&ctx, "forced-1").await.unwrap().name, "second");
}

#[tokio::test]
async fn concurrent_stores_with_forced_identifier_leave_one_row() {
    let h = harness_with(
        EventBusConfig::queued(16, 4),
        Some(Arc::new(FixedId("forced-2"))),
    );
    let ctx = tenant_context();

    let (first, second) = futures::join!(
        h.business.store(&ctx, "first"),
        h.business.store(&ctx, "second")
    );
    first.unwrap();
    second.unwrap();
    h.bus.shutdown().await;

    assert_eq!(h.store.row_count().await.unwrap(), 1);
    let name = h.business.get(&ctx, "forced-2").await.unwrap().name;
    assert!(name == "first" || name == "second");
}

#[tokio::test]
async fn queued_store_becomes_readable_after_drain() {
    let h = harness_with(EventBusConfig::queued(64, 2), None);
    let ctx = tenant_context();

    let mut stored = Vec::new();
    for i in 0..20 {
        stored.push(h.business.store(&ctx, &format!("record-{i}")).await.unwrap());
    }
    h.bus.shutdown().await;

    for record in stored {
        assert_eq!(h.business.get(&ctx, &record.id).await.unwrap(), record);
    }
    assert_eq!(h.bus.stats().delivered, 20);
}

#[tokio::test]
async fn cancelled_context_fails_store_and_persists_nothing() {
    let h = harness();
    let (ctx, handle) = tenant_context().cancellable();
    handle.cancel();

    let err = h.business.store(&ctx, "Alpha").await.unwrap_err();

    assert!(matches!(err, ServiceError::Cancelled));
    assert_eq!(h.store.row_count().await.unwrap(), 0);
    assert_eq!(h.bus.stats().published, 0);
}

#[tokio::test]
async fn store_without_save_handler_is_a_publish_error() {
    let store = InMemoryRecordStore::new();
    let repository: Arc<dyn RecordRepository> = Arc::new(DatastoreRecordRepository::new(
        Datastore::new(Arc::new(store.clone())),
    ));
    let bus = Arc::new(EventBus::builder(EventBusConfig::inline()).build().unwrap());
    let business = RecordBusiness::builder()
        .event_bus(bus)
        .repository(repository)
        .build()
        .unwrap();

    let err = business
        .store(&RequestContext::background(), "Alpha")
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::EventPublish(_)));
    assert_eq!(store.row_count().await.unwrap(), 0);
}

#[tokio::test]
async fn store_after_shutdown_is_a_publish_error() {
    let h = harness_with(EventBusConfig::queued(8, 1), None);
    h.bus.shutdown().await;

    let err = h
        .business
        .store(&RequestContext::background(), "late")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::EventPublish(_)));
}

#[test]
fn business_requires_its_collaborators() {
    let store = InMemoryRecordStore::new();
    let repository: Arc<dyn RecordRepository> =
        Arc::new(DatastoreRecordRepository::new(Datastore::new(Arc::new(store))));

    let err = RecordBusiness::builder()
        .repository(repository)
        .build()
        .err()
        .expect("missing bus must fail");
    assert!(matches!(err, ServiceError::Initialization(_)));
}
