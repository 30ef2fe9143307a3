//! End-to-end tests against a real listener and a file-backed log

use futures::future::join_all;
use qrgate::audit::{AuditLog, FileStore};
use qrgate::WindowPolicy;
use qrgate_server::actor::LimiterSettings;
use qrgate_server::config::{StoreConfig, StoreType};
use qrgate_server::engines::{Engines, OcrLanguage, QrCodeEncoder, RqrrDecoder, UnavailableOcr};
use qrgate_server::journal::JournalActor;
use qrgate_server::metrics::Metrics;
use qrgate_server::orchestrator::{Orchestrator, OrchestratorSettings};
use qrgate_server::store::create_rate_limiter;
use qrgate_server::transport::http::{self, HttpOptions};
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct TestServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<anyhow::Result<()>>,
    journal: JoinHandle<()>,
}

impl TestServer {
    async fn start(log_path: &Path, store_type: StoreType) -> Self {
        let metrics = Arc::new(Metrics::new());
        let limiter = create_rate_limiter(
            &StoreConfig {
                store_type,
                capacity: 1_000,
                cleanup_interval: 60,
                cleanup_probability: 100,
            },
            LimiterSettings {
                policy: WindowPolicy::per_minute(5),
                sweep_interval: Duration::from_secs(60),
            },
            64,
            Arc::clone(&metrics),
        );

        let log = AuditLog::new(FileStore::open(log_path).unwrap()).unwrap();
        let (journal, journal_task) = JournalActor::spawn(64, log);

        let orchestrator = Orchestrator::new(
            limiter,
            journal,
            Engines {
                encoder: Arc::new(QrCodeEncoder::default()),
                decoder: Arc::new(RqrrDecoder),
                ocr: Arc::new(UnavailableOcr::new("OCR is not installed")),
            },
            metrics,
            OrchestratorSettings {
                default_languages: vec![OcrLanguage::En, OcrLanguage::ChSim],
                engine_timeout: Duration::from_secs(10),
            },
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, signal) = oneshot::channel::<()>();
        let app = http::router(
            orchestrator,
            HttpOptions {
                audit_access: false,
                ..HttpOptions::default()
            },
        );
        let server = tokio::spawn(http::serve(listener, app, async move {
            let _ = signal.await;
        }));

        TestServer {
            addr,
            shutdown,
            server,
            journal: journal_task,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Stop serving and wait until the log has been synced
    async fn stop(self) {
        let _ = self.shutdown.send(());
        tokio_test::assert_ok!(self.server.await.unwrap());
        self.journal.await.unwrap();
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}

fn generate_form(text: &str) -> Form {
    Form::new().text("text", text.to_string())
}

#[tokio::test]
async fn test_rate_limit_over_http() {
    let dir = TempDir::new().unwrap();
    let server = TestServer::start(&dir.path().join("audit.jsonl"), StoreType::Periodic).await;
    let api = client();

    let mut png = Vec::new();
    for i in 0..5 {
        let response = tokio_test::assert_ok!(
            api
                .post(server.url("/generate"))
                .multipart(generate_form(&format!("code {i}")))
                .send()
                .await
        );
        assert_eq!(response.status(), StatusCode::OK);
        png = response.bytes().await.unwrap().to_vec();
    }

    let response = api
        .post(server.url("/generate"))
        .multipart(generate_form("one too many"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["category"], "rate_limited");
    assert_eq!(body["code"], 429);

    // Decoding has its own budget
    let response = api
        .post(server.url("/decode"))
        .multipart(Form::new().part("image", Part::bytes(png).file_name("code.png")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["decoded"], "code 4");
    assert_eq!(body["compressed"], false);

    let logs: serde_json::Value = api
        .get(server.url("/logs?action=generate_error"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let logs = logs.as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["client_key"], "127.0.0.1");
    assert_eq!(logs[0]["detail"]["kind"], "rate_limited");

    drop(api);
    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_calls_respect_limit() {
    let dir = TempDir::new().unwrap();
    let server =
        TestServer::start(&dir.path().join("audit.jsonl"), StoreType::Probabilistic).await;
    let api = client();

    let calls = (0..20).map(|i| {
        api
            .post(server.url("/generate"))
            .multipart(generate_form(&format!("burst {i}")))
            .send()
    });
    let statuses: Vec<StatusCode> = join_all(calls)
        .await
        .into_iter()
        .map(|r| r.unwrap().status())
        .collect();

    let ok = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let limited = statuses
        .iter()
        .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
        .count();
    assert_eq!(ok, 5);
    assert_eq!(limited, 15);

    let stats: serde_json::Value = api
        .get(server.url("/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total"], 20);
    assert_eq!(stats["actions"]["generate"], 5);
    assert_eq!(stats["actions"]["generate_error"], 15);
    assert_eq!(stats["unique_clients"], 1);

    drop(api);
    server.stop().await;
}

#[tokio::test]
async fn test_log_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("audit.jsonl");

    let server = TestServer::start(&path, StoreType::Periodic).await;
    let api = client();
    for text in ["first", "second"] {
        let response = api
            .post(server.url("/generate"))
            .multipart(generate_form(text))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = api
        .post(server.url("/decode"))
        .multipart(Form::new().part("image", Part::bytes(b"not an image".to_vec())))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    drop(api);
    server.stop().await;

    let server = TestServer::start(&path, StoreType::Periodic).await;
    let api = client();

    let stats: serde_json::Value = api
        .get(server.url("/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total"], 3);
    assert_eq!(stats["actions"]["generate"], 2);
    assert_eq!(stats["actions"]["decode_error"], 1);
    assert_eq!(stats["actions"]["ocr"], 0);

    let response = api.get(server.url("/logs/export")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=logs.csv"
    );
    let csv = response.text().await.unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "timestamp,action,client_key,detail");
    assert_eq!(
        lines.iter().filter(|l| l.contains(",127.0.0.1,")).count(),
        3
    );
    assert!(lines[1].contains(",generate,127.0.0.1,text_len=5 "));
    assert!(lines[2].contains(",generate,127.0.0.1,text_len=6 "));
    assert!(csv.contains(",decode_error,127.0.0.1,"));

    drop(api);
    server.stop().await;
}
