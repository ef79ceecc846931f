use std::sync::Arc;

use axum::Router;
use axum::http::header::HeaderName;
use axum::response::IntoResponse;
use axum::routing::{get, post};

use crate::api::processes::{
    api_delete_record, api_query_history, api_record, api_records, api_records_by_pid,
};
use crate::api::snapshots::{
    api_delete_snapshot, api_snapshot, api_snapshot_chain, api_snapshot_processes,
    api_snapshot_queries, api_snapshots, api_snapshots_by_kind,
};
use crate::api::statistics::api_statistics;
use crate::api::webhook::{api_iterate_processes, api_process_by_pid};
use crate::db::Db;
use crate::fetch::ProcessSource;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    pub source: Arc<dyn ProcessSource + Send + Sync>,
    pub owner_header: HeaderName,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/webhook/iterate-processes", post(api_iterate_processes))
        .route("/api/v1/webhook/process-by-pid", post(api_process_by_pid))
        .route("/api/v1/processes", get(api_records))
        .route("/api/v1/processes/snapshots", get(api_snapshots))
        .route("/api/v1/processes/snapshots/kind/{kind}", get(api_snapshots_by_kind))
        .route("/api/v1/processes/snapshots/type/{kind}", get(api_snapshots_by_kind))
        .route(
            "/api/v1/processes/snapshots/{id}",
            get(api_snapshot).delete(api_delete_snapshot),
        )
        .route(
            "/api/v1/processes/snapshots/{id}/processes",
            get(api_snapshot_processes),
        )
        .route("/api/v1/processes/snapshots/{id}/chain", get(api_snapshot_chain))
        .route(
            "/api/v1/processes/snapshots/{id}/queries",
            get(api_snapshot_queries),
        )
        .route("/api/v1/processes/queries/history", get(api_query_history))
        .route("/api/v1/processes/statistics", get(api_statistics))
        .route("/api/v1/processes/pid/{pid}", get(api_records_by_pid))
        .route(
            "/api/v1/processes/{id}",
            get(api_record).delete(api_delete_record),
        )
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    "ok"
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::time::Duration;

    use procchain_types::{
        IterationOutcome, OwnerId, ProcessInfo, QueryOutcome, SnapshotKind,
        SnapshotProcessesResponse, SnapshotView, StatisticsResponse,
    };
    use tokio::net::TcpListener;

    use super::*;
    use crate::auth::DEFAULT_OWNER_HEADER;
    use crate::db::testing::temp_db;
    use crate::error::ServiceError;

    struct StaticSource(Vec<ProcessInfo>);

    impl ProcessSource for StaticSource {
        fn iterate(&self, _base_url: &str) -> Result<Vec<ProcessInfo>, ServiceError> {
            Ok(self.0.clone())
        }

        fn by_pid(&self, _base_url: &str, pid: u32) -> Result<ProcessInfo, ServiceError> {
            self.0
                .iter()
                .find(|process| process.process_id == pid)
                .cloned()
                .ok_or_else(|| ServiceError::Upstream(format!("process {pid} not found")))
        }
    }

    struct Reply {
        status: u16,
        body: String,
    }

    async fn spawn_app(test_name: &str) -> String {
        let (scratch, db) = temp_db(test_name);
        let state = AppState {
            db: Arc::new(db),
            source: Arc::new(StaticSource(vec![
                ProcessInfo::named(4, "System"),
                ProcessInfo::named(88, "smss.exe"),
                ProcessInfo::named(4242, "svc.exe"),
            ])),
            owner_header: HeaderName::from_static(DEFAULT_OWNER_HEADER),
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _scratch = scratch;
            axum::serve(listener, build_router(state))
                .await
                .expect("serve");
        });
        format!("http://{addr}")
    }

    async fn call(method: &str, url: String, owner: Option<i64>, body: Option<&str>) -> Reply {
        let method = method.to_owned();
        let body = body.map(str::to_owned);
        tokio::task::spawn_blocking(move || {
            let agent = ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(10))
                .build();
            let mut request = agent.request(&method, &url);
            if let Some(owner) = owner {
                request = request.set(DEFAULT_OWNER_HEADER, &owner.to_string());
            }
            let result = match body {
                Some(body) => request
                    .set("Content-Type", "application/json")
                    .send_string(&body),
                None => request.call(),
            };
            let resp = match result {
                Ok(resp) => resp,
                Err(ureq::Error::Status(_, resp)) => resp,
                Err(ureq::Error::Transport(err)) => panic!("transport error for {url}: {err}"),
            };
            let status = resp.status();
            let mut body = String::new();
            resp.into_reader()
                .read_to_string(&mut body)
                .expect("read body");
            Reply { status, body }
        })
        .await
        .expect("join request")
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let base = spawn_app("app-health").await;
        let reply = call("GET", format!("{base}/health"), None, None).await;
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, "ok");
    }

    #[tokio::test]
    async fn owner_routes_require_identity() {
        let base = spawn_app("app-unauthenticated").await;
        let reply = call("GET", format!("{base}/api/v1/processes/snapshots"), None, None).await;
        assert_eq!(reply.status, 401);
        assert!(reply.body.contains("\"kind\":\"unauthenticated\""), "{}", reply.body);
    }

    #[tokio::test]
    async fn ingest_then_browse_the_chain() {
        let base = spawn_app("app-ingest").await;
        let agent = "http%3A%2F%2Fagent.local%3A8080";

        let reply = call(
            "POST",
            format!("{base}/api/v1/webhook/iterate-processes?webhookurl={agent}"),
            Some(7),
            None,
        )
        .await;
        assert_eq!(reply.status, 200, "{}", reply.body);
        let outcome: IterationOutcome = serde_json::from_str(&reply.body).expect("outcome json");
        assert_eq!(outcome.persisted, 3);
        let snapshot = outcome.snapshot.expect("snapshot");
        assert_eq!(snapshot.owner_id, Some(OwnerId::new(7)));

        let reply = call(
            "GET",
            format!("{base}/api/v1/processes/snapshots/{}/chain", snapshot.id),
            Some(7),
            None,
        )
        .await;
        assert_eq!(reply.status, 200, "{}", reply.body);
        let chain: SnapshotProcessesResponse = serde_json::from_str(&reply.body).expect("chain");
        let names: Vec<&str> = chain
            .processes
            .iter()
            .map(|record| record.process.process_name.as_str())
            .collect();
        assert_eq!(names, ["System", "smss.exe", "svc.exe"]);

        let reply = call(
            "GET",
            format!("{base}/api/v1/processes/snapshots/{}", snapshot.id),
            Some(8),
            None,
        )
        .await;
        assert_eq!(reply.status, 403);

        let reply = call(
            "DELETE",
            format!("{base}/api/v1/processes/snapshots/{}", snapshot.id),
            Some(7),
            None,
        )
        .await;
        assert_eq!(reply.status, 204);
    }

    #[tokio::test]
    async fn pid_lookup_feeds_statistics() {
        let base = spawn_app("app-query").await;
        let url = format!(
            "{base}/api/v1/webhook/process-by-pid?webhookurl=http%3A%2F%2Fagent.local"
        );

        let reply = call("POST", url.clone(), Some(7), Some(r#"{"pid": 4242}"#)).await;
        assert_eq!(reply.status, 200, "{}", reply.body);
        let outcome: QueryOutcome = serde_json::from_str(&reply.body).expect("query outcome");
        assert_eq!(outcome.process.process_name, "svc.exe");

        let reply = call("POST", url.clone(), Some(7), Some(r#"{"pid": 0}"#)).await;
        assert_eq!(reply.status, 400);
        let reply = call("POST", url.clone(), Some(7), Some("not json")).await;
        assert_eq!(reply.status, 400);
        let reply = call("POST", url, Some(7), Some(r#"{"pid": 31337}"#)).await;
        assert_eq!(reply.status, 502);

        let reply = call(
            "GET",
            format!("{base}/api/v1/processes/statistics?limit=5"),
            Some(7),
            None,
        )
        .await;
        assert_eq!(reply.status, 200, "{}", reply.body);
        let stats: StatisticsResponse = serde_json::from_str(&reply.body).expect("stats");
        assert_eq!(stats.total_queries, 2);
        assert_eq!(stats.most_queried_processes.len(), 1);
        assert_eq!(stats.most_queried_processes[0].process_id, 4242);
    }

    #[tokio::test]
    async fn missing_webhook_url_is_a_validation_error() {
        let base = spawn_app("app-missing-url").await;
        let reply = call(
            "POST",
            format!("{base}/api/v1/webhook/iterate-processes"),
            None,
            None,
        )
        .await;
        assert_eq!(reply.status, 400);
        assert!(reply.body.contains("\"kind\":\"validation\""), "{}", reply.body);
    }

    #[tokio::test]
    async fn snapshots_filter_by_kind_under_both_paths() {
        let base = spawn_app("app-by-kind").await;
        let reply = call(
            "POST",
            format!("{base}/api/v1/webhook/process-by-pid?webhookurl=http%3A%2F%2Fagent.local"),
            Some(7),
            Some(r#"{"pid": 88}"#),
        )
        .await;
        assert_eq!(reply.status, 200, "{}", reply.body);
        let reply = call(
            "POST",
            format!("{base}/api/v1/webhook/iterate-processes?webhookurl=http%3A%2F%2Fagent.local"),
            Some(7),
            None,
        )
        .await;
        assert_eq!(reply.status, 200, "{}", reply.body);

        for segment in ["kind", "type"] {
            let reply = call(
                "GET",
                format!("{base}/api/v1/processes/snapshots/{segment}/query"),
                Some(7),
                None,
            )
            .await;
            assert_eq!(reply.status, 200, "{}", reply.body);
            let snapshots: Vec<SnapshotView> =
                serde_json::from_str(&reply.body).expect("snapshot list");
            assert_eq!(snapshots.len(), 1, "{segment}");
            assert_eq!(snapshots[0].kind, SnapshotKind::Query);
        }

        let reply = call(
            "GET",
            format!("{base}/api/v1/processes/snapshots/type/bogus"),
            Some(7),
            None,
        )
        .await;
        assert_eq!(reply.status, 400);
    }
}
