use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

mod mesh;

pub const PATH_OK: &str = "/ok";
pub const PATH_FAIL: &str = "/fail";
pub const PATH_HANG: &str = "/hang";
pub const PATH_STATUS: &str = "/status/{code}";

/// Latency of the `/ok` route.
pub const OK_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    orders_created: Arc<AtomicU64>,
    saw_bearer_auth: Arc<AtomicU64>,
    saw_json_content_type: Arc<AtomicU64>,
}

impl TestServerStats {
    fn inc_requests_total(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    fn next_order_id(&self) -> u64 {
        self.orders_created.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn inc_saw_bearer_auth(&self) {
        self.saw_bearer_auth.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_saw_json_content_type(&self) {
        self.saw_json_content_type.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn orders_created(&self) -> u64 {
        self.orders_created.load(Ordering::Relaxed)
    }

    pub fn saw_bearer_auth(&self) -> u64 {
        self.saw_bearer_auth.load(Ordering::Relaxed)
    }

    pub fn saw_json_content_type(&self) -> u64 {
        self.saw_json_content_type.load(Ordering::Relaxed)
    }
}

/// Runtime knobs shared by every mesh route.
#[derive(Debug, Clone, Default)]
pub struct MeshBehavior {
    forced_status: Arc<AtomicU16>,
    delay_ms: Arc<AtomicU64>,
}

impl MeshBehavior {
    /// Makes every mesh route answer with `status` (e.g. 500). `None` restores normal answers.
    pub fn force_status(&self, status: Option<u16>) {
        self.forced_status
            .store(status.unwrap_or(0), Ordering::Relaxed);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn forced_status(&self) -> Option<StatusCode> {
        match self.forced_status.load(Ordering::Relaxed) {
            0 => None,
            code => StatusCode::from_u16(code).ok(),
        }
    }

    pub(crate) async fn delay(&self) {
        let ms = self.delay_ms.load(Ordering::Relaxed);
        if ms > 0 {
            sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct AppState {
    pub(crate) stats: TestServerStats,
    pub(crate) behavior: MeshBehavior,
}

#[derive(Debug, Clone)]
pub struct TestServerUrls {
    pub base_url: String,
    pub ok: String,
    pub fail: String,
    pub hang: String,
}

impl TestServerUrls {
    pub fn new(base_url: String) -> Self {
        Self {
            ok: format!("{base_url}{PATH_OK}"),
            fail: format!("{base_url}{PATH_FAIL}"),
            hang: format!("{base_url}{PATH_HANG}"),
            base_url,
        }
    }

    pub fn status(&self, code: u16) -> String {
        format!("{}/status/{code}", self.base_url)
    }
}

async fn handle_ok(State(state): State<AppState>) -> &'static str {
    state.stats.inc_requests_total();
    sleep(OK_DELAY).await;
    "ok"
}

async fn handle_fail(State(state): State<AppState>) -> (StatusCode, &'static str) {
    state.stats.inc_requests_total();
    (StatusCode::INTERNAL_SERVER_ERROR, "fail")
}

async fn handle_hang(State(state): State<AppState>) -> &'static str {
    state.stats.inc_requests_total();
    sleep(Duration::from_secs(3600)).await;
    "late"
}

async fn handle_status(State(state): State<AppState>, Path(code): Path<u16>) -> StatusCode {
    state.stats.inc_requests_total();
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

pub fn router(stats: TestServerStats, behavior: MeshBehavior) -> Router {
    let state = AppState { stats, behavior };
    Router::new()
        .route(PATH_OK, get(handle_ok))
        .route(PATH_FAIL, get(handle_fail))
        .route(PATH_HANG, get(handle_hang))
        .route(PATH_STATUS, get(handle_status))
        .merge(mesh::routes())
        .with_state(state)
}

/// In-process mock of the e-commerce mesh plus a few utility routes, bound to an ephemeral
/// loopback port.
pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    urls: TestServerUrls,
    stats: TestServerStats,
    behavior: MeshBehavior,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let behavior = MeshBehavior::default();
        let app = router(stats.clone(), behavior.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        let base_url = format!("http://{addr}");
        let urls = TestServerUrls::new(base_url.clone());

        Ok(Self {
            addr,
            base_url,
            urls,
            stats,
            behavior,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub fn behavior(&self) -> &MeshBehavior {
        &self.behavior
    }

    /// Stops accepting connections. In-flight `/hang` requests are cut off rather than
    /// awaited.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let abort = task.abort_handle();
            if tokio::time::timeout(Duration::from_millis(500), task)
                .await
                .is_err()
            {
                abort.abort();
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
