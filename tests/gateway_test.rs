// End-to-end tests for the gateway: real listener, real client, in-memory store.

use std::sync::Arc;

use tokio::net::TcpListener;

use vodgate::core::config::AppConfig;
use vodgate::gateway::router::{build_router, AppState};
use vodgate::storage::memory::InMemoryStore;
use vodgate::vod::Manifest;

fn seeded_store() -> Arc<InMemoryStore> {
    let store = InMemoryStore::new();
    store.put_object(
        "my-bucket",
        "musics/music/music1.txt",
        "some nice music",
        "text/plain",
    );
    store.put_object(
        "my-bucket",
        "musics/music/music2.txt",
        "some nicer music",
        "text/plain",
    );
    store.put_object(
        "my-bucket",
        "videos/video/28043_1_video_1080p.mp4",
        "1080p",
        "video/mp4",
    );
    store.put_object(
        "my-bucket",
        "videos/video/77071_1_caption_wg_240p_001f8ea7.vtt",
        "captions",
        "text/vtt",
    );
    store.put_object(
        "my-bucket",
        "videos/video/video1_480p.mp4",
        "480p",
        "video/mp4",
    );
    store.put_object(
        "my-bucket",
        "videos/video/video1_720p.mp4",
        "720p",
        "video/mp4",
    );
    store.put_object(
        "other-bucket",
        "musics/music/music3.txt",
        "even better music",
        "text/plain",
    );
    Arc::new(store)
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.bucket_name = "my-bucket".to_string();
    config.proxy.endpoint = "/proxy/".to_string();
    config.proxy.timeout_secs = 5;
    config.map.endpoint = "/map/".to_string();
    config.map.regex_filters.insert(
        String::new(),
        r"((240|360|424|480|720|1080)p\.mp4)|\.(vtt)$".to_string(),
    );
    config
}

async fn start_server(config: AppConfig, store: Arc<InMemoryStore>) -> String {
    let state = AppState::new(config, store, None).unwrap();
    let app = build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{addr}")
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_healthcheck() {
    let addr = start_server(test_config(), seeded_store()).await;
    let resp = reqwest::get(&addr).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "");
}

#[tokio::test]
async fn test_unrouted_path_is_not_found() {
    let addr = start_server(test_config(), seeded_store()).await;
    let resp = reqwest::get(format!("{addr}/what")).await.unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.text().await.unwrap(), "not found\n");
}

#[tokio::test]
async fn test_proxy_root_is_a_healthcheck() {
    let addr = start_server(test_config(), seeded_store()).await;
    let resp = reqwest::get(format!("{addr}/proxy/")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "");
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let addr = start_server(test_config(), seeded_store()).await;
    let resp = reqwest::get(&addr).await.unwrap();
    assert!(resp.headers().contains_key("x-request-id"));
}

// ---------------------------------------------------------------------------
// Range proxy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_proxy_download_file() {
    let addr = start_server(test_config(), seeded_store()).await;
    let resp = reqwest::get(format!("{addr}/proxy/musics/music/music1.txt"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["accept-ranges"], "bytes");
    assert_eq!(resp.headers()["content-length"], "15");
    assert_eq!(resp.headers()["content-type"], "text/plain");
    assert!(resp.headers().contains_key("last-modified"));
    assert!(resp.headers().contains_key("date"));
    assert!(!resp.headers().contains_key("content-range"));
    assert_eq!(resp.text().await.unwrap(), "some nice music");
}

#[tokio::test]
async fn test_proxy_download_range() {
    let addr = start_server(test_config(), seeded_store()).await;
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{addr}/proxy/musics/music/music2.txt"))
        .header("Range", "bytes=2-10")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 206);
    assert_eq!(resp.headers()["accept-ranges"], "bytes");
    assert_eq!(resp.headers()["content-range"], "bytes 2-10/16");
    // Inclusive range: bytes 2 through 10 of a 16-byte object is 9 bytes.
    assert_eq!(resp.headers()["content-length"], "9");
    assert_eq!(resp.text().await.unwrap(), "me nicer ");
}

#[tokio::test]
async fn test_proxy_head_reports_full_size() {
    let addr = start_server(test_config(), seeded_store()).await;
    let client = reqwest::Client::new();
    let resp = client
        .head(format!("{addr}/proxy/musics/music/music2.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["accept-ranges"], "bytes");
    assert_eq!(resp.headers()["content-length"], "16");
    assert_eq!(resp.text().await.unwrap(), "");
}

#[tokio::test]
async fn test_proxy_head_and_get_headers_agree() {
    let addr = start_server(test_config(), seeded_store()).await;
    let client = reqwest::Client::new();
    let url = format!("{addr}/proxy/musics/music/music1.txt");

    let head = client.head(&url).send().await.unwrap();
    let get = client.get(&url).send().await.unwrap();

    for name in ["content-type", "accept-ranges", "content-length"] {
        assert_eq!(head.headers()[name], get.headers()[name], "header {name}");
    }
}

#[tokio::test]
async fn test_proxy_object_not_found() {
    let addr = start_server(test_config(), seeded_store()).await;
    let resp = reqwest::get(format!("{addr}/proxy/musics/music/some-music.txt"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(
        resp.text().await.unwrap(),
        "object does not exist: my-bucket/musics/music/some-music.txt\n"
    );
}

#[tokio::test]
async fn test_proxy_head_object_not_found_has_no_body() {
    let addr = start_server(test_config(), seeded_store()).await;
    let client = reqwest::Client::new();
    let resp = client
        .head(format!("{addr}/proxy/musics/music/some-music.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.text().await.unwrap(), "");
}

#[tokio::test]
async fn test_proxy_bucket_not_found() {
    let mut config = test_config();
    config.bucket_name = "some-bucket".to_string();
    let addr = start_server(config, seeded_store()).await;
    let resp = reqwest::get(format!("{addr}/proxy/whatever")).await.unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(
        resp.text().await.unwrap(),
        "bucket does not exist: some-bucket\n"
    );
}

#[tokio::test]
async fn test_proxy_method_not_allowed() {
    let addr = start_server(test_config(), seeded_store()).await;
    let client = reqwest::Client::new();
    for req in [
        client.post(format!("{addr}/proxy/whatever")),
        client.put(format!("{addr}/proxy/whatever")),
    ] {
        let resp = req.send().await.unwrap();
        assert_eq!(resp.status(), 405);
        assert_eq!(resp.text().await.unwrap(), "method not allowed\n");
    }
}

#[tokio::test]
async fn test_proxy_bucket_on_path() {
    let mut config = test_config();
    config.proxy.bucket_on_path = true;
    let addr = start_server(config, seeded_store()).await;
    let resp = reqwest::get(format!(
        "{addr}/proxy/other-bucket/musics/music/music3.txt"
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "even better music");
}

#[tokio::test]
async fn test_proxy_forwards_upstream_cache_control() {
    let store = seeded_store();
    store.put_object_with_cache_control(
        "my-bucket",
        "musics/music/cached.txt",
        "cached bytes",
        "text/plain",
        "public, max-age=3600",
    );
    let addr = start_server(test_config(), store).await;

    let resp = reqwest::get(format!("{addr}/proxy/musics/music/cached.txt"))
        .await
        .unwrap();
    assert_eq!(resp.headers()["cache-control"], "public, max-age=3600");

    // Objects without an upstream value carry no Cache-Control at all.
    let resp = reqwest::get(format!("{addr}/proxy/musics/music/music1.txt"))
        .await
        .unwrap();
    assert!(!resp.headers().contains_key("cache-control"));
}

#[tokio::test]
async fn test_proxy_malformed_range_serves_whole_object() {
    let addr = start_server(test_config(), seeded_store()).await;
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{addr}/proxy/musics/music/music1.txt"))
        .header("Range", "bytes=abc-def")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "some nice music");
}

// ---------------------------------------------------------------------------
// Manifest mapper
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_map_list_of_files() {
    let addr = start_server(test_config(), seeded_store()).await;
    let resp = reqwest::get(format!("{addr}/map/videos/video/")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "application/json");

    let manifest: Manifest = resp.json().await.unwrap();
    let paths: Vec<&str> = manifest
        .sequences
        .iter()
        .map(|s| s.clips[0].path.as_str())
        .collect();
    assert_eq!(
        paths,
        vec![
            "/my-bucket/videos/video/28043_1_video_1080p.mp4",
            "/my-bucket/videos/video/77071_1_caption_wg_240p_001f8ea7.vtt",
            "/my-bucket/videos/video/video1_480p.mp4",
            "/my-bucket/videos/video/video1_720p.mp4",
        ]
    );
    for sequence in &manifest.sequences {
        assert_eq!(sequence.clips.len(), 1);
        assert_eq!(sequence.clips[0].clip_type, "source");
    }
}

#[tokio::test]
async fn test_map_empty_list() {
    let addr = start_server(test_config(), seeded_store()).await;
    let resp = reqwest::get(format!("{addr}/map/musics/musyc")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), r#"{"sequences":[]}"#);
}

#[tokio::test]
async fn test_map_method_not_allowed() {
    let addr = start_server(test_config(), seeded_store()).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{addr}/map/musics"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 405);
    assert_eq!(resp.text().await.unwrap(), "method not allowed\n");
}

#[tokio::test]
async fn test_map_empty_prefix() {
    let addr = start_server(test_config(), seeded_store()).await;
    let resp = reqwest::get(format!("{addr}/map/")).await.unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(resp.text().await.unwrap(), "prefix cannot be empty\n");
}

#[tokio::test]
async fn test_map_missing_bucket_is_server_error() {
    let mut config = test_config();
    config.bucket_name = "some-bucket".to_string();
    let addr = start_server(config, seeded_store()).await;
    let resp = reqwest::get(format!("{addr}/map/whatever")).await.unwrap();
    assert_eq!(resp.status(), 500);
}

#[tokio::test]
async fn test_map_extension_split() {
    let mut config = test_config();
    config.map.extension_split = true;
    let addr = start_server(config, seeded_store()).await;

    let resp = reqwest::get(format!("{addr}/map/videos/video/video1.mp4"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let manifest: Manifest = resp.json().await.unwrap();
    let paths: Vec<&str> = manifest
        .sequences
        .iter()
        .map(|s| s.clips[0].path.as_str())
        .collect();
    assert_eq!(
        paths,
        vec![
            "/my-bucket/videos/video/video1_480p.mp4",
            "/my-bucket/videos/video/video1_720p.mp4",
        ]
    );
}

#[tokio::test]
async fn test_map_extra_resources() {
    let mut config = test_config();
    config.map.extra_resources_token = "extra".to_string();
    let addr = start_server(config, seeded_store()).await;

    let resp = reqwest::get(format!(
        "{addr}/map/videos/video/?extra=/ads/bumper.mp4,/ads/outro.mp4"
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 200);
    let manifest: Manifest = resp.json().await.unwrap();
    assert_eq!(manifest.sequences.len(), 6);
    assert_eq!(manifest.sequences[4].clips[0].path, "/ads/bumper.mp4");
    assert_eq!(manifest.sequences[5].clips[0].path, "/ads/outro.mp4");
}

#[tokio::test]
async fn test_map_chapter_breaks() {
    let addr = start_server(test_config(), seeded_store()).await;
    let resp = reqwest::get(format!("{addr}/map/videos/video/?breaks=1:00,2:30"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let manifest: Manifest = resp.json().await.unwrap();

    assert_eq!(manifest.sequences.len(), 4);
    for sequence in &manifest.sequences {
        let clips = &sequence.clips;
        assert_eq!(clips.len(), 3);
        assert_eq!((clips[0].clip_from, clips[0].clip_to), (Some(0), Some(60_000)));
        assert_eq!(
            (clips[1].clip_from, clips[1].clip_to),
            (Some(60_000), Some(150_000))
        );
        assert_eq!((clips[2].clip_from, clips[2].clip_to), (Some(150_000), None));
    }
}

#[tokio::test]
async fn test_map_chapter_breaks_sentinel_means_none() {
    let addr = start_server(test_config(), seeded_store()).await;
    let resp = reqwest::get(format!("{addr}/map/videos/video/?breaks=_"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let manifest: Manifest = resp.json().await.unwrap();
    for sequence in &manifest.sequences {
        assert_eq!(sequence.clips.len(), 1);
        assert!(sequence.clips[0].clip_from.is_none());
    }
}

#[tokio::test]
async fn test_map_is_idempotent_bytewise() {
    let addr = start_server(test_config(), seeded_store()).await;
    let url = format!("{addr}/map/videos/video/");
    let first = reqwest::get(&url).await.unwrap().text().await.unwrap();
    let second = reqwest::get(&url).await.unwrap().text().await.unwrap();
    assert_eq!(first, second);
}
