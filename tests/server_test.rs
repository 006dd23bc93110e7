// Integration test for the RelayServer — end-to-end over real sockets with a
// fake extractor script standing in for the real binary.
#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use audio_relay::extractor::provision::BinaryProvisioner;
use audio_relay::server::handler::{RelayServer, SharedProvisioner};

/// Write an executable shell script into `dir` and return its path.
fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Fake extractor: answers `--get-title` with a noisy title, otherwise
/// records its arguments and emits a short audio payload.
fn fake_extractor(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "yt-dlp",
        r#"if [ "$1" = "--get-title" ]; then
    echo "Example Song!"
    exit 0
fi
echo "$@" > "$(dirname "$0")/args.txt"
printf 'AUDIODATA-0123456789'
"#,
    )
}

async fn start_server(binary_path: PathBuf) -> RelayServer {
    let provisioner: SharedProvisioner = Arc::new(BinaryProvisioner::new(
        binary_path,
        "http://127.0.0.1:9/unused".to_string(),
    ));
    RelayServer::start("127.0.0.1:0", provisioner).await.unwrap()
}

#[tokio::test]
async fn test_health_route() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(fake_extractor(dir.path())).await;

    let resp = reqwest::get(format!("http://127.0.0.1:{}/", server.port()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.unwrap().contains("Online"));

    server.shutdown();
}

#[tokio::test]
async fn test_missing_url_param_is_400() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(fake_extractor(dir.path())).await;

    let resp = reqwest::get(format!("http://127.0.0.1:{}/download", server.port()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // No subprocess ran: the fake extractor never recorded arguments.
    assert!(!dir.path().join("args.txt").exists());

    server.shutdown();
}

#[tokio::test]
async fn test_absent_binary_is_500_with_retry_guidance() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path().join("yt-dlp")).await;

    let resp = reqwest::get(format!(
        "http://127.0.0.1:{}/download?url=https://www.youtube.com/watch?v=abc123",
        server.port()
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 500);
    assert!(resp.text().await.unwrap().contains("retry"));

    server.shutdown();
}

#[tokio::test]
async fn test_download_streams_audio_with_attachment_filename() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(fake_extractor(dir.path())).await;

    // Playlist context in the request URL must not reach the extractor.
    let resp = reqwest::get(format!(
        "http://127.0.0.1:{}/download?url=https%3A%2F%2Fwww.youtube.com%2Fwatch%3Fv%3DdQw4w9WgXcQ%26list%3DPL123",
        server.port()
    ))
    .await
    .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-disposition").unwrap(),
        "attachment; filename=\"Example Song.mp3\""
    );
    assert_eq!(resp.headers().get("content-type").unwrap(), "audio/mpeg");

    let body = resp.bytes().await.unwrap();
    assert_eq!(&body[..], b"AUDIODATA-0123456789");

    let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
    assert!(args.contains("--no-playlist"));
    assert!(args.contains("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
    assert!(!args.contains("list=PL123"));

    server.shutdown();
}

#[tokio::test]
async fn test_extractor_failure_before_bytes_is_500() {
    let dir = tempfile::tempdir().unwrap();
    let binary = write_script(
        dir.path(),
        "yt-dlp",
        r#"if [ "$1" = "--get-title" ]; then
    echo "Example Song"
    exit 0
fi
exit 3
"#,
    );
    let server = start_server(binary).await;

    let resp = reqwest::get(format!(
        "http://127.0.0.1:{}/download?url=https://www.youtube.com/watch?v=abc123",
        server.port()
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 500);

    server.shutdown();
}

#[tokio::test]
async fn test_client_abort_kills_extractor() {
    let dir = tempfile::tempdir().unwrap();
    // Extractor that records its pid and streams forever.
    let binary = write_script(
        dir.path(),
        "yt-dlp",
        r#"if [ "$1" = "--get-title" ]; then
    echo "Example Song"
    exit 0
fi
echo $$ > "$(dirname "$0")/pid"
while :; do
    printf 'xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx'
    sleep 0.05
done
"#,
    );
    let server = start_server(binary).await;

    let mut resp = reqwest::get(format!(
        "http://127.0.0.1:{}/download?url=https://www.youtube.com/watch?v=abc123",
        server.port()
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 200);

    // Read one chunk so the stream is live, then abort the connection.
    let chunk = resp.chunk().await.unwrap();
    assert!(chunk.is_some_and(|c| !c.is_empty()));
    drop(resp);

    let pid: i32 = std::fs::read_to_string(dir.path().join("pid"))
        .unwrap()
        .trim()
        .parse()
        .unwrap();

    // The subprocess must be gone within a bounded grace period.
    let mut alive = true;
    for _ in 0..100 {
        let status = std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .status()
            .unwrap();
        if !status.success() {
            alive = false;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!alive, "extractor process {pid} survived client abort");

    server.shutdown();
}

#[tokio::test]
async fn test_title_failure_falls_back_to_default_name() {
    let dir = tempfile::tempdir().unwrap();
    let binary = write_script(
        dir.path(),
        "yt-dlp",
        r#"if [ "$1" = "--get-title" ]; then
    exit 1
fi
printf 'AUDIODATA'
"#,
    );
    let server = start_server(binary).await;

    let resp = reqwest::get(format!(
        "http://127.0.0.1:{}/download?url=https://www.youtube.com/watch?v=abc123",
        server.port()
    ))
    .await
    .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-disposition").unwrap(),
        "attachment; filename=\"youtube-audio.mp3\""
    );
    assert_eq!(&resp.bytes().await.unwrap()[..], b"AUDIODATA");

    server.shutdown();
}
