//! Fetch-then-persist orchestration for both ingestion modes.
//!
//! Anonymous callers get the agent's answer back but nothing is stored for
//! them. Identified callers always leave a trace: a failed fetch still writes
//! a failed snapshot (enumeration) or a failed query record (pid lookup).

use axum::http::Uri;
use procchain_types::{
    IterationOutcome, OwnerId, ProcessInfo, QueryOutcome, SnapshotId, SnapshotKind, SnapshotView,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::auth::authorize;
use crate::chain::{fold_chain, persist_descriptor};
use crate::db::{NewQueryRecord, NewSnapshot, QueryStore, RecordStore, SnapshotStore};
use crate::error::{ServiceError, StoreError};
use crate::fetch::ProcessSource;

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub source_url: String,
    pub kind: SnapshotKind,
    pub pid: Option<i64>,
    /// Existing snapshot a pid lookup is appended to.
    pub snapshot_id: Option<SnapshotId>,
    pub owner: Option<OwnerId>,
}

impl IngestRequest {
    pub fn iteration(source_url: impl Into<String>, owner: Option<OwnerId>) -> Self {
        Self {
            source_url: source_url.into(),
            kind: SnapshotKind::Iteration,
            pid: None,
            snapshot_id: None,
            owner,
        }
    }

    pub fn query(
        source_url: impl Into<String>,
        pid: i64,
        snapshot_id: Option<SnapshotId>,
        owner: Option<OwnerId>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            kind: SnapshotKind::Query,
            pid: Some(pid),
            snapshot_id,
            owner,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Validated {
    Iteration {
        source_url: String,
        owner: Option<OwnerId>,
    },
    Query {
        source_url: String,
        pid: u32,
        target: Option<SnapshotId>,
        owner: Option<OwnerId>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Ingested {
    Iteration(IterationOutcome),
    Query(QueryOutcome),
}

pub fn ingest<S, P>(store: &S, source: &P, request: IngestRequest) -> Result<Ingested, ServiceError>
where
    S: SnapshotStore + RecordStore + QueryStore + ?Sized,
    P: ProcessSource + ?Sized,
{
    match validate(request)? {
        Validated::Iteration { source_url, owner } => {
            ingest_iteration(store, source, &source_url, owner).map(Ingested::Iteration)
        }
        Validated::Query {
            source_url,
            pid,
            target,
            owner,
        } => ingest_query(store, source, &source_url, pid, target, owner).map(Ingested::Query),
    }
}

fn validate(request: IngestRequest) -> Result<Validated, ServiceError> {
    let source_url = request.source_url.trim().to_owned();
    validate_source_url(&source_url)?;

    match request.kind {
        SnapshotKind::Iteration => {
            if request.snapshot_id.is_some() {
                return Err(ServiceError::Validation(String::from(
                    "snapshotId is only accepted for pid lookups",
                )));
            }
            Ok(Validated::Iteration {
                source_url,
                owner: request.owner,
            })
        }
        SnapshotKind::Query => {
            let pid = request
                .pid
                .ok_or_else(|| ServiceError::Validation(String::from("pid is required")))?;
            let pid = u32::try_from(pid)
                .ok()
                .filter(|pid| *pid > 0)
                .ok_or_else(|| {
                    ServiceError::Validation(format!("pid must be a positive 32-bit integer, got {pid}"))
                })?;
            if request.snapshot_id.is_some() && request.owner.is_none() {
                return Err(ServiceError::AccessDenied(String::from(
                    "anonymous callers cannot append to a snapshot",
                )));
            }
            Ok(Validated::Query {
                source_url,
                pid,
                target: request.snapshot_id,
                owner: request.owner,
            })
        }
    }
}

/// Accepts `http://host…` and `https://host…` only.
pub fn validate_source_url(source_url: &str) -> Result<(), ServiceError> {
    if source_url.is_empty() {
        return Err(ServiceError::Validation(String::from("webhook url is required")));
    }
    let uri = source_url.parse::<Uri>().map_err(|error| {
        ServiceError::Validation(format!("invalid webhook url {source_url}: {error}"))
    })?;
    let scheme = uri.scheme_str().unwrap_or_default();
    if !(scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")) {
        return Err(ServiceError::Validation(format!(
            "webhook url must use http or https: {source_url}"
        )));
    }
    if uri.host().is_none_or(str::is_empty) {
        return Err(ServiceError::Validation(format!(
            "webhook url has no host: {source_url}"
        )));
    }
    Ok(())
}

fn ingest_iteration<S, P>(
    store: &S,
    source: &P,
    source_url: &str,
    owner: Option<OwnerId>,
) -> Result<IterationOutcome, ServiceError>
where
    S: SnapshotStore + RecordStore + QueryStore + ?Sized,
    P: ProcessSource + ?Sized,
{
    let processes = match source.iterate(source_url) {
        Ok(processes) => processes,
        Err(error) => {
            warn!(source_url, %error, "process enumeration failed");
            if let Some(owner) = owner {
                let failed = store.create_snapshot(&NewSnapshot::failed(
                    Some(owner),
                    source_url,
                    SnapshotKind::Iteration,
                    error.to_string(),
                ))?;
                info!(snapshot_id = %failed.id, owner = %owner, "failed snapshot recorded");
            }
            return Err(error);
        }
    };
    let received = count(processes.len());

    let Some(owner) = owner else {
        return Ok(IterationOutcome {
            snapshot: None,
            received,
            persisted: 0,
            skipped: 0,
            broken_links: 0,
            record_ids: Vec::new(),
            processes,
        });
    };

    let snapshot = store.create_snapshot(&NewSnapshot::succeeded(
        Some(owner),
        source_url,
        SnapshotKind::Iteration,
        received,
    ))?;
    let chain = fold_chain(store, snapshot.id, Some(owner), &processes);
    let snapshot = store.finalize_process_count(snapshot.id, owner, chain.persisted_count())?;

    info!(
        snapshot_id = %snapshot.id,
        owner = %owner,
        received,
        persisted = chain.persisted.len(),
        skipped = chain.skipped,
        broken_links = chain.broken_links,
        "iteration snapshot stored"
    );

    Ok(IterationOutcome {
        snapshot: Some(snapshot),
        received,
        persisted: chain.persisted_count(),
        skipped: chain.skipped,
        broken_links: chain.broken_links,
        record_ids: chain.persisted,
        processes,
    })
}

fn ingest_query<S, P>(
    store: &S,
    source: &P,
    source_url: &str,
    pid: u32,
    target: Option<SnapshotId>,
    owner: Option<OwnerId>,
) -> Result<QueryOutcome, ServiceError>
where
    S: SnapshotStore + RecordStore + QueryStore + ?Sized,
    P: ProcessSource + ?Sized,
{
    if let (Some(target), Some(owner)) = (target, owner) {
        check_target(store, target, owner)?;
    }

    let process = match source.by_pid(source_url, pid) {
        Ok(process) => process,
        Err(error) => {
            warn!(source_url, pid, %error, "process lookup failed");
            if let Some(owner) = owner {
                store.insert_query(&NewQueryRecord::failed(
                    Some(owner),
                    target,
                    source_url,
                    pid,
                    error.to_string(),
                ))?;
            }
            return Err(error);
        }
    };

    let Some(owner) = owner else {
        return Ok(QueryOutcome {
            snapshot: None,
            query: None,
            record_id: None,
            process,
        });
    };

    let (snapshot, link) = match target {
        Some(target) => {
            let link = match store_descriptor(store, target, owner, &process) {
                Ok(link) => link,
                Err(error) => {
                    return Err(descriptor_failed(store, target, owner, source_url, pid, error));
                }
            };
            (append_to(store, target, owner)?, link)
        }
        None => {
            let snapshot = store.create_snapshot(&NewSnapshot::succeeded(
                Some(owner),
                source_url,
                SnapshotKind::Query,
                1,
            ))?;
            match store_descriptor(store, snapshot.id, owner, &process) {
                Ok(link) => (snapshot, link),
                Err(error) => {
                    let message = error.to_string();
                    if let Err(e) = store.mark_snapshot_failed(snapshot.id, owner, &message) {
                        warn!(snapshot_id = %snapshot.id, %e, "failed to mark query snapshot failed");
                    }
                    let error = descriptor_failed(store, snapshot.id, owner, source_url, pid, error);
                    return Err(error);
                }
            }
        }
    };

    let query = store.insert_query(&NewQueryRecord::succeeded(
        Some(owner),
        snapshot.id,
        source_url,
        pid,
        link.record_id,
    ))?;

    info!(
        snapshot_id = %snapshot.id,
        owner = %owner,
        pid,
        record_id = %link.record_id,
        appended = target.is_some(),
        "query stored"
    );

    Ok(QueryOutcome {
        snapshot: Some(snapshot),
        query: Some(query),
        record_id: Some(link.record_id),
        process,
    })
}

fn check_target<S: SnapshotStore + ?Sized>(
    store: &S,
    target: SnapshotId,
    owner: OwnerId,
) -> Result<SnapshotView, ServiceError> {
    let snapshot = store.get_snapshot(target)?;
    authorize(Some(owner), snapshot.owner_id, &format!("snapshot {target}"))?;
    Ok(snapshot)
}

/// Bumps the target's count once its record is stored. A zero-row update is
/// re-checked so the caller learns whether the snapshot vanished or changed
/// hands.
fn append_to<S: SnapshotStore + ?Sized>(
    store: &S,
    target: SnapshotId,
    owner: OwnerId,
) -> Result<SnapshotView, ServiceError> {
    match store.increment_process_count(target, owner) {
        Ok(snapshot) => Ok(snapshot),
        Err(StoreError::NotFound(what)) => {
            check_target(store, target, owner)?;
            Err(ServiceError::NotFound(what))
        }
        Err(error) => Err(error.into()),
    }
}

fn store_descriptor<S: RecordStore + ?Sized>(
    store: &S,
    snapshot_id: SnapshotId,
    owner: OwnerId,
    process: &ProcessInfo,
) -> Result<procchain_types::ProcessLink, StoreError> {
    persist_descriptor(store, snapshot_id, Some(owner), None, process)
}

/// Leaves a failed query record behind and turns the store error into the
/// one surfaced to the caller.
fn descriptor_failed<S: QueryStore + ?Sized>(
    store: &S,
    snapshot_id: SnapshotId,
    owner: OwnerId,
    source_url: &str,
    pid: u32,
    error: StoreError,
) -> ServiceError {
    warn!(snapshot_id = %snapshot_id, pid, %error, "failed to persist queried process");
    if let Err(e) = store.insert_query(&NewQueryRecord::failed(
        Some(owner),
        Some(snapshot_id),
        source_url,
        pid,
        error.to_string(),
    )) {
        warn!(snapshot_id = %snapshot_id, pid, %e, "failed to record failed query");
    }
    ServiceError::Storage(error.to_string())
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use procchain_types::{ProcessLink, QueryRecordView, RecordId};

    use super::*;
    use crate::db::testing::temp_db;
    use crate::db::{Db, NewProcessRecord};

    const AGENT: &str = "http://agent.local:8080";

    struct FakeSource {
        answer: Result<Vec<ProcessInfo>, ServiceError>,
        calls: Cell<usize>,
    }

    impl FakeSource {
        fn ok(processes: Vec<ProcessInfo>) -> Self {
            Self {
                answer: Ok(processes),
                calls: Cell::new(0),
            }
        }

        fn failing(error: ServiceError) -> Self {
            Self {
                answer: Err(error),
                calls: Cell::new(0),
            }
        }
    }

    impl ProcessSource for FakeSource {
        fn iterate(&self, _base_url: &str) -> Result<Vec<ProcessInfo>, ServiceError> {
            self.calls.set(self.calls.get() + 1);
            self.answer.clone()
        }

        fn by_pid(&self, _base_url: &str, pid: u32) -> Result<ProcessInfo, ServiceError> {
            self.calls.set(self.calls.get() + 1);
            let processes = self.answer.clone()?;
            processes
                .into_iter()
                .find(|process| process.process_id == pid)
                .ok_or_else(|| ServiceError::Upstream(format!("process {pid} not found")))
        }
    }

    /// Delegates to a real database, failing the record inserts listed.
    struct FlakyDb {
        inner: Db,
        inserts: Cell<usize>,
        fail_inserts: Vec<usize>,
    }

    impl SnapshotStore for FlakyDb {
        fn create_snapshot(&self, snapshot: &NewSnapshot) -> Result<SnapshotView, StoreError> {
            self.inner.create_snapshot(snapshot)
        }

        fn get_snapshot(&self, id: SnapshotId) -> Result<SnapshotView, StoreError> {
            self.inner.get_snapshot(id)
        }

        fn finalize_process_count(
            &self,
            id: SnapshotId,
            owner: OwnerId,
            process_count: u32,
        ) -> Result<SnapshotView, StoreError> {
            self.inner.finalize_process_count(id, owner, process_count)
        }

        fn increment_process_count(
            &self,
            id: SnapshotId,
            owner: OwnerId,
        ) -> Result<SnapshotView, StoreError> {
            self.inner.increment_process_count(id, owner)
        }

        fn mark_snapshot_failed(
            &self,
            id: SnapshotId,
            owner: OwnerId,
            error: &str,
        ) -> Result<SnapshotView, StoreError> {
            self.inner.mark_snapshot_failed(id, owner, error)
        }
    }

    impl RecordStore for FlakyDb {
        fn insert_record(&self, record: &NewProcessRecord<'_>) -> Result<ProcessLink, StoreError> {
            let attempt = self.inserts.get();
            self.inserts.set(attempt + 1);
            if self.fail_inserts.contains(&attempt) {
                return Err(StoreError::Backend(String::from("disk full")));
            }
            self.inner.insert_record(record)
        }

        fn set_next_link(&self, record: RecordId, next: &ProcessLink) -> Result<(), StoreError> {
            self.inner.set_next_link(record, next)
        }

        fn set_previous_link(
            &self,
            record: RecordId,
            previous: &ProcessLink,
        ) -> Result<(), StoreError> {
            self.inner.set_previous_link(record, previous)
        }
    }

    impl QueryStore for FlakyDb {
        fn insert_query(&self, query: &NewQueryRecord) -> Result<QueryRecordView, StoreError> {
            self.inner.insert_query(query)
        }
    }

    fn sample() -> Vec<ProcessInfo> {
        vec![
            ProcessInfo::named(4, "System"),
            ProcessInfo::named(88, "smss.exe"),
            ProcessInfo::named(4242, "svc.exe"),
        ]
    }

    fn row_count(db: &Db, table: &str) -> i64 {
        db.open()
            .expect("open")
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .expect("count rows")
    }

    fn iteration(outcome: Ingested) -> IterationOutcome {
        match outcome {
            Ingested::Iteration(outcome) => outcome,
            Ingested::Query(_) => panic!("expected an iteration outcome"),
        }
    }

    fn query(outcome: Ingested) -> QueryOutcome {
        match outcome {
            Ingested::Query(outcome) => outcome,
            Ingested::Iteration(_) => panic!("expected a query outcome"),
        }
    }

    #[test]
    fn rejects_bad_requests_before_fetching() {
        let (_scratch, db) = temp_db("ingest-validation");
        let source = FakeSource::ok(sample());
        let owner = Some(OwnerId::new(1));
        let bad = [
            IngestRequest::iteration("", owner),
            IngestRequest::iteration("ftp://agent.local", owner),
            IngestRequest::iteration("http://", owner),
            IngestRequest::iteration("https://:8080/x", owner),
            IngestRequest::iteration("http://a b/", owner),
            IngestRequest::iteration("http:/agent.local", owner),
            IngestRequest::query(AGENT, 0, None, owner),
            IngestRequest::query(AGENT, -4, None, owner),
            IngestRequest::query(AGENT, i64::from(u32::MAX) + 1, None, owner),
            IngestRequest {
                snapshot_id: Some(SnapshotId::new(1)),
                ..IngestRequest::iteration(AGENT, owner)
            },
        ];
        for request in bad {
            let err = ingest(&db, &source, request.clone()).expect_err("must be rejected");
            assert_eq!(err.kind(), "validation", "request {request:?}");
        }
        assert_eq!(source.calls.get(), 0);
    }

    #[test]
    fn accepts_urls_with_ports_and_paths() {
        for url in [
            "http://agent.local",
            "HTTPS://agent.local:8443/base/",
            "http://user@10.0.0.5:8080",
            "http://[::1]:8080/",
        ] {
            validate_source_url(url).expect(url);
        }
    }

    #[test]
    fn anonymous_iteration_stores_nothing() {
        let (_scratch, db) = temp_db("ingest-anonymous");
        let source = FakeSource::ok(sample());
        let outcome = iteration(
            ingest(&db, &source, IngestRequest::iteration(AGENT, None)).expect("ingest"),
        );
        assert!(outcome.snapshot.is_none());
        assert_eq!(outcome.received, 3);
        assert_eq!(outcome.persisted, 0);
        assert_eq!(outcome.processes.len(), 3);
        assert_eq!(row_count(&db, "snapshots"), 0);
        assert_eq!(row_count(&db, "process_records"), 0);
    }

    #[test]
    fn identified_iteration_stores_linked_snapshot() {
        let (_scratch, db) = temp_db("ingest-iteration");
        let owner = OwnerId::new(1);
        let source = FakeSource::ok(sample());
        let outcome = iteration(
            ingest(&db, &source, IngestRequest::iteration(AGENT, Some(owner))).expect("ingest"),
        );
        let snapshot = outcome.snapshot.expect("snapshot stored");
        assert!(snapshot.success);
        assert_eq!(snapshot.process_count, 3);
        assert_eq!(snapshot.owner_id, Some(owner));
        assert_eq!(outcome.persisted, 3);

        let records = db.list_snapshot_records(snapshot.id).expect("records");
        assert_eq!(records.len(), 3);
        assert_eq!(
            records[0].next_process.as_ref().map(|link| link.record_id),
            Some(records[1].id)
        );
    }

    #[test]
    fn failed_enumeration_is_recorded_for_identified_callers_only() {
        let (_scratch, db) = temp_db("ingest-iteration-failed");
        let source = FakeSource::failing(ServiceError::Upstream(String::from("connection refused")));

        let err = ingest(&db, &source, IngestRequest::iteration(AGENT, None)).expect_err("fails");
        assert_eq!(err.kind(), "upstream");
        assert_eq!(row_count(&db, "snapshots"), 0);

        let owner = OwnerId::new(1);
        let err = ingest(&db, &source, IngestRequest::iteration(AGENT, Some(owner)))
            .expect_err("fails");
        assert_eq!(err.kind(), "upstream");
        let snapshots = db.list_snapshots(owner, None).expect("list");
        assert_eq!(snapshots.len(), 1);
        assert!(!snapshots[0].success);
        assert_eq!(snapshots[0].process_count, 0);
        assert!(
            snapshots[0]
                .error
                .as_deref()
                .is_some_and(|error| error.contains("connection refused"))
        );
    }

    #[test]
    fn partial_persistence_finalizes_count_to_stored_records() {
        let (_scratch, db) = temp_db("ingest-partial");
        let store = FlakyDb {
            inner: db.clone(),
            inserts: Cell::new(0),
            fail_inserts: vec![1],
        };
        let owner = OwnerId::new(1);
        let source = FakeSource::ok(sample());
        let outcome = iteration(
            ingest(&store, &source, IngestRequest::iteration(AGENT, Some(owner))).expect("ingest"),
        );
        assert_eq!(outcome.received, 3);
        assert_eq!(outcome.persisted, 2);
        assert_eq!(outcome.skipped, 1);
        let snapshot = outcome.snapshot.expect("snapshot");
        assert_eq!(snapshot.process_count, 2);
        assert!(snapshot.success);
    }

    #[test]
    fn pid_lookup_creates_query_snapshot() {
        let (_scratch, db) = temp_db("ingest-query");
        let owner = OwnerId::new(1);
        let source = FakeSource::ok(sample());
        let outcome = query(
            ingest(&db, &source, IngestRequest::query(AGENT, 4242, None, Some(owner)))
                .expect("ingest"),
        );
        let snapshot = outcome.snapshot.expect("snapshot");
        assert_eq!(snapshot.kind, SnapshotKind::Query);
        assert_eq!(snapshot.process_count, 1);

        let stored = outcome.query.expect("query record");
        assert!(stored.success);
        assert_eq!(stored.requested_pid, 4242);
        assert_eq!(stored.snapshot_id, Some(snapshot.id));
        assert_eq!(stored.process_record_id, outcome.record_id);

        let record = db
            .get_record(outcome.record_id.expect("record id"))
            .expect("record");
        assert_eq!(record.process.process_name, "svc.exe");
        assert_eq!(record.position, 0);
    }

    #[test]
    fn pid_lookup_appends_to_owned_snapshot() {
        let (_scratch, db) = temp_db("ingest-append");
        let owner = OwnerId::new(1);
        let source = FakeSource::ok(sample());
        let first = query(
            ingest(&db, &source, IngestRequest::query(AGENT, 4, None, Some(owner))).expect("first"),
        );
        let target = first.snapshot.expect("snapshot").id;

        let second = query(
            ingest(&db, &source, IngestRequest::query(AGENT, 88, Some(target), Some(owner)))
                .expect("append"),
        );
        let snapshot = second.snapshot.expect("snapshot");
        assert_eq!(snapshot.id, target);
        assert_eq!(snapshot.process_count, 2);
        let record = db
            .get_record(second.record_id.expect("record id"))
            .expect("record");
        assert_eq!(record.position, 1);
        assert_eq!(db.list_snapshot_queries(target).expect("queries").len(), 2);
    }

    #[test]
    fn appending_to_foreign_snapshot_is_denied_without_fetching() {
        let (_scratch, db) = temp_db("ingest-append-foreign");
        let alice = OwnerId::new(1);
        let bob = OwnerId::new(2);
        let snapshot = db
            .create_snapshot(&NewSnapshot::succeeded(Some(alice), AGENT, SnapshotKind::Query, 1))
            .expect("snapshot");
        let source = FakeSource::ok(sample());

        let err = ingest(&db, &source, IngestRequest::query(AGENT, 4, Some(snapshot.id), Some(bob)))
            .expect_err("denied");
        assert_eq!(err.kind(), "access_denied");
        assert_eq!(source.calls.get(), 0);
        assert_eq!(db.get_snapshot(snapshot.id).expect("reload").process_count, 1);

        let err = ingest(&db, &source, IngestRequest::query(AGENT, 4, Some(snapshot.id), None))
            .expect_err("anonymous append");
        assert_eq!(err.kind(), "access_denied");

        let err = ingest(
            &db,
            &source,
            IngestRequest::query(AGENT, 4, Some(SnapshotId::new(999)), Some(alice)),
        )
        .expect_err("missing target");
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn failed_lookup_is_recorded_against_target() {
        let (_scratch, db) = temp_db("ingest-query-failed");
        let owner = OwnerId::new(1);
        let snapshot = db
            .create_snapshot(&NewSnapshot::succeeded(Some(owner), AGENT, SnapshotKind::Query, 1))
            .expect("snapshot");
        let source = FakeSource::ok(sample());

        let err = ingest(&db, &source, IngestRequest::query(AGENT, 777, Some(snapshot.id), Some(owner)))
            .expect_err("unknown pid");
        assert_eq!(err.kind(), "upstream");
        let err = ingest(&db, &source, IngestRequest::query(AGENT, 777, None, Some(owner)))
            .expect_err("unknown pid");
        assert_eq!(err.kind(), "upstream");

        let queries = db.list_queries(owner).expect("queries");
        assert_eq!(queries.len(), 2);
        assert!(queries.iter().all(|query| !query.success && query.process_record_id.is_none()));
        assert!(queries.iter().any(|query| query.snapshot_id == Some(snapshot.id)));
        assert!(queries.iter().any(|query| query.snapshot_id.is_none()));
        assert_eq!(db.get_snapshot(snapshot.id).expect("reload").process_count, 1);
        assert_eq!(row_count(&db, "process_records"), 0);
    }

    #[test]
    fn descriptor_failure_in_query_mode_leaves_failed_query() {
        let (_scratch, db) = temp_db("ingest-query-storage");
        let store = FlakyDb {
            inner: db.clone(),
            inserts: Cell::new(0),
            fail_inserts: vec![0],
        };
        let owner = OwnerId::new(1);
        let source = FakeSource::ok(sample());

        let err = ingest(&store, &source, IngestRequest::query(AGENT, 4, None, Some(owner)))
            .expect_err("storage failure");
        assert_eq!(err.kind(), "storage");
        let queries = db.list_queries(owner).expect("queries");
        assert_eq!(queries.len(), 1);
        assert!(!queries[0].success);
        let snapshot_id = queries[0].snapshot_id.expect("query points at its snapshot");

        let snapshot = db.get_snapshot(snapshot_id).expect("snapshot");
        assert!(!snapshot.success);
        assert!(snapshot.error.as_deref().is_some_and(|error| error.contains("disk full")));
        assert_eq!(snapshot.process_count, 0);
        assert_eq!(row_count(&db, "process_records"), 0);
    }

    #[test]
    fn descriptor_failure_on_append_leaves_count_alone() {
        let (_scratch, db) = temp_db("ingest-append-storage");
        let store = FlakyDb {
            inner: db.clone(),
            inserts: Cell::new(0),
            fail_inserts: vec![1],
        };
        let owner = OwnerId::new(1);
        let source = FakeSource::ok(sample());
        let first = query(
            ingest(&store, &source, IngestRequest::query(AGENT, 4, None, Some(owner)))
                .expect("first lookup"),
        );
        let target = first.snapshot.expect("snapshot").id;

        let err = ingest(
            &store,
            &source,
            IngestRequest::query(AGENT, 88, Some(target), Some(owner)),
        )
        .expect_err("storage failure");
        assert_eq!(err.kind(), "storage");

        let snapshot = db.get_snapshot(target).expect("reload");
        assert!(snapshot.success);
        assert_eq!(snapshot.process_count, 1);
        assert_eq!(db.list_snapshot_records(target).expect("records").len(), 1);
        let queries = db.list_snapshot_queries(target).expect("queries");
        assert_eq!(queries.len(), 2);
        assert_eq!(queries.iter().filter(|query| !query.success).count(), 1);
    }

    #[test]
    fn empty_enumeration_finalizes_zero_count() {
        let (_scratch, db) = temp_db("ingest-empty");
        let owner = OwnerId::new(1);
        let source = FakeSource::ok(Vec::new());
        let outcome = iteration(
            ingest(&db, &source, IngestRequest::iteration(AGENT, Some(owner))).expect("ingest"),
        );
        assert_eq!(outcome.received, 0);
        assert_eq!(outcome.persisted, 0);
        let snapshot = outcome.snapshot.expect("snapshot stored");
        assert!(snapshot.success);
        assert_eq!(snapshot.process_count, 0);
        assert_eq!(row_count(&db, "process_records"), 0);
    }

    #[test]
    fn failed_anonymous_lookup_stores_nothing() {
        let (_scratch, db) = temp_db("ingest-query-anonymous-failed");
        let source = FakeSource::failing(ServiceError::Upstream(String::from("agent down")));
        let err = ingest(&db, &source, IngestRequest::query(AGENT, 4, None, None))
            .expect_err("fails");
        assert_eq!(err.kind(), "upstream");

        let source = FakeSource::ok(sample());
        let err = ingest(&db, &source, IngestRequest::query(AGENT, 777, None, None))
            .expect_err("unknown pid");
        assert_eq!(err.kind(), "upstream");

        assert_eq!(row_count(&db, "snapshots"), 0);
        assert_eq!(row_count(&db, "process_records"), 0);
        assert_eq!(row_count(&db, "query_records"), 0);
    }

    #[test]
    fn anonymous_lookup_returns_descriptor_only() {
        let (_scratch, db) = temp_db("ingest-query-anonymous");
        let source = FakeSource::ok(sample());
        let outcome = query(
            ingest(&db, &source, IngestRequest::query(AGENT, 88, None, None)).expect("ingest"),
        );
        assert_eq!(outcome.process.process_name, "smss.exe");
        assert!(outcome.snapshot.is_none());
        assert!(outcome.query.is_none());
        assert_eq!(row_count(&db, "query_records"), 0);
    }
}
