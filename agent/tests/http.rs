use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mdmagent::config::{ConfigFetcher, ConfigStore, FetchResult};
use mdmagent::filesys::dir::Dir;
use mdmagent::filesys::file::File;
use mdmagent::http::{HttpClient, HttpConfigSource, HttpDownloader, HttpRemoteLog};
use mdmagent::platform::{DownloadProgress, Downloader, RemoteLog, RemoteLogLevel};
use mdmagent::storage::device::DeviceIdentity;

const CONFIG_PATH: &str = "/rest/public/sync/configuration/dev-1";

fn client() -> HttpClient {
    HttpClient::new(Duration::from_secs(5)).unwrap()
}

async fn fetcher(dir: &TempDir) -> (ConfigFetcher, Arc<ConfigStore>) {
    let store = Arc::new(
        ConfigStore::load(File::new(dir.path().join("config.json")))
            .await
            .unwrap(),
    );
    let source = Arc::new(HttpConfigSource::new(client()));
    (
        ConfigFetcher::new(source, store.clone(), Duration::ZERO),
        store,
    )
}

#[tokio::test]
async fn test_fetch_falls_back_to_secondary() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&primary)
        .await;
    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "data": {"title": "fleet", "files": [{"path": "a.txt", "url": "http://x/a"}]}
        })))
        .expect(1)
        .mount(&secondary)
        .await;

    let dir = TempDir::new().unwrap();
    let (fetcher, store) = fetcher(&dir).await;
    let identity = DeviceIdentity {
        device_id: "dev-1".into(),
        project: String::new(),
        base_url: primary.uri(),
        secondary_base_url: Some(secondary.uri()),
    };

    let result = fetcher.fetch(&identity).await.unwrap();
    assert!(matches!(&result, FetchResult::Success(config) if config.title.as_deref() == Some("fleet")));

    let stored = store.current().await.unwrap();
    assert_eq!(stored.config.files.len(), 1);
}

#[tokio::test]
async fn test_fetch_uses_project_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/rest/public/sync/configuration/dev-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "ERROR", "message": "error.notfound.device"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (fetcher, store) = fetcher(&dir).await;
    let identity = DeviceIdentity {
        device_id: "dev-1".into(),
        project: "acme".into(),
        base_url: server.uri(),
        secondary_base_url: None,
    };

    assert_eq!(
        fetcher.fetch(&identity).await.unwrap(),
        FetchResult::Rejected("error.notfound.device".to_string())
    );
    assert!(store.current().await.is_none());
}

#[tokio::test]
async fn test_fetch_malformed_body_is_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>captive portal</html>"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (fetcher, store) = fetcher(&dir).await;
    let identity = DeviceIdentity::new("dev-1", server.uri());

    assert!(matches!(
        fetcher.fetch(&identity).await.unwrap(),
        FetchResult::NetworkUnreachable(_)
    ));
    assert!(store.current().await.is_none());
}

#[tokio::test]
async fn test_download_streams_to_scratch_dir() {
    let server = MockServer::start().await;
    let body = vec![7u8; 256 * 1024];
    Mock::given(method("GET"))
        .and(path("/files/blob.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let scratch = Dir::new(dir.path().join("downloads"));
    scratch.create().await.unwrap();
    let downloader = HttpDownloader::new(client(), scratch);

    let seen: Mutex<Vec<DownloadProgress>> = Mutex::new(Vec::new());
    let on_progress = |progress: DownloadProgress| seen.lock().unwrap().push(progress);
    let temp = downloader
        .download_to_temp(&format!("{}/files/blob.bin", server.uri()), &on_progress)
        .await
        .unwrap();

    assert!(temp.starts_with(dir.path().join("downloads")));
    assert_eq!(tokio::fs::read(&temp).await.unwrap(), body);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.last().map(|p| p.pct), Some(100));
    assert_eq!(seen.last().map(|p| p.current), Some(body.len() as u64));
}

#[tokio::test]
async fn test_failed_download_leaves_nothing_behind() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/missing.bin"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let scratch = Dir::new(dir.path().join("downloads"));
    scratch.create().await.unwrap();
    let downloader = HttpDownloader::new(client(), scratch);

    let result = downloader
        .download_to_temp(&format!("{}/files/missing.bin", server.uri()), &|_: DownloadProgress| {})
        .await;
    assert!(result.is_err());

    let mut entries = tokio::fs::read_dir(dir.path().join("downloads")).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn test_remote_log_posts_entries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/plugins/devicelog/log/dev-1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let remote_log = HttpRemoteLog::new(client(), &server.uri(), "", "dev-1");
    remote_log.log(RemoteLogLevel::Warn, "Configuration server unreachable".to_string());

    let mut received = Vec::new();
    for _ in 0..50 {
        received = server.received_requests().await.unwrap_or_default();
        if !received.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(received.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body[0]["level"], "warn");
    assert_eq!(body[0]["message"], "Configuration server unreachable");
}
