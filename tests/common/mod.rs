//! Common test utilities for ptarchive integration tests

#![allow(dead_code)]

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use ptarchive::{ArchiveRetriever, Config, Credentials, Event};
use serde_json::json;
use tokio::sync::broadcast;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Token every mocked endpoint requires
pub const TEST_TOKEN: &str = "integration-token";

/// Sample log lines, one of which mentions sshd twice
pub const SAMPLE_LOG: &str = "\
2019-06-01T10:00:01Z web-1 nginx: GET /health 200
2019-06-01T10:00:02Z web-1 sshd: Accepted publickey for deploy
2019-06-01T10:00:03Z web-2 nginx: GET /api/orders 502
2019-06-01T10:00:04Z web-2 sshd: Failed password for root
";

/// Gzip `data` into a single member
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

/// File name of the archive covering `hour` on 2019-06-01
pub fn archive_name(hour: u32) -> String {
    format!("2019-06-01-{hour:02}.tsv.gz")
}

/// Download path of the archive covering `hour`
pub fn download_path(hour: u32) -> String {
    format!("/archives/{hour:02}/download")
}

/// Catalog listing one archive per hour in `hours`, linked to `server`
pub fn catalog_json(server: &MockServer, hours: impl IntoIterator<Item = u32>) -> serde_json::Value {
    let entries: Vec<_> = hours
        .into_iter()
        .map(|hour| {
            json!({
                "start": format!("2019-06-01T{hour:02}:00:00Z"),
                "end": format!("2019-06-01T{hour:02}:59:59Z"),
                "filename": archive_name(hour),
                "filesize": 1000 + hour,
                "_links": {
                    "download": { "href": format!("{}{}", server.uri(), download_path(hour)) }
                }
            })
        })
        .collect();
    serde_json::Value::Array(entries)
}

/// Mount the catalog at `/api/v1/archives.json`
pub async fn mount_catalog(server: &MockServer, listing: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/v1/archives.json"))
        .and(header("X-Papertrail-Token", TEST_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing))
        .expect(1)
        .mount(server)
        .await;
}

/// Mount an archive body that must be requested exactly once
pub async fn mount_archive(server: &MockServer, hour: u32, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(download_path(hour)))
        .and(header("X-Papertrail-Token", TEST_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(1)
        .mount(server)
        .await;
}

/// Mount a failing archive endpoint
pub async fn mount_failure(server: &MockServer, hour: u32, status: u16) {
    Mock::given(method("GET"))
        .and(path(download_path(hour)))
        .respond_with(ResponseTemplate::new(status))
        .expect(1)
        .mount(server)
        .await;
}

/// Config pointing at the mock server's API
pub fn config_for(server: &MockServer) -> Config {
    Config {
        api_base_url: format!("{}/api/v1", server.uri()),
        ..Config::default()
    }
}

/// Retriever authenticated with [`TEST_TOKEN`]
pub fn retriever(config: Config) -> ArchiveRetriever {
    ArchiveRetriever::with_credentials(config, &Credentials::new(TEST_TOKEN))
        .expect("retriever should build")
}

/// Every buffered event up to and including `RunFinished`
pub fn drain_events(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        let finished = matches!(event, Event::RunFinished { .. });
        collected.push(event);
        if finished {
            break;
        }
    }
    collected
}
