//! Abort and Stall Tests
//!
//! The engine tracks a single "current transfer" slot. These tests cover
//! aborting through it and flows that never resolve.

mod common;

use async_trait::async_trait;
use common::{sign_body, uploader, Event, RecordingHooks};
use direct_uploadr::config::UploaderOptions;
use direct_uploadr::upload::{
    FlowOutcome, ReadyState, S3Uploader, SignResult, SignedUrlProvider, UploadError, UploadFile,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_signer(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/sign-s3"))
        .and(wiremock::matchers::query_param("objectName", "slow.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(sign_body(&format!("{}/bucket/slow.bin", server.uri()))),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sign-s3"))
        .and(wiremock::matchers::query_param("objectName", "quick.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(sign_body(&format!("{}/bucket/quick.bin", server.uri()))),
        )
        .mount(server)
        .await;
}

/// Poll until a transfer has registered itself as abortable, then abort it
async fn abort_when_started(uploader: &S3Uploader) {
    for _ in 0..250 {
        if uploader.abort_upload() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no transfer started");
}

#[tokio::test]
async fn test_abort_triggers_transport_error() {
    let server = MockServer::start().await;
    mount_signer(&server).await;
    Mock::given(method("PUT"))
        .and(path("/bucket/slow.bin"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let hooks = RecordingHooks::new();
    let uploader = uploader(UploaderOptions::new().server(server.uri()), hooks.clone());

    let batch = uploader.handle(vec![UploadFile::new("slow.bin", "data")]);
    abort_when_started(&uploader).await;

    let outcomes = tokio::time::timeout(Duration::from_secs(5), batch.join())
        .await
        .expect("aborted transfer should end promptly");

    match &outcomes[0] {
        FlowOutcome::Failed(UploadError::Transport { context }) => {
            assert_eq!(context.status, 0);
            assert_eq!(context.ready_state, ReadyState::Unsent);
        }
        other => panic!("expected transport failure, got {:?}", other),
    }

    let errors = hooks.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "XHR error");
    assert!(hooks.finishes().is_empty());
}

#[tokio::test]
async fn test_abort_targets_latest_transfer_only() {
    let server = MockServer::start().await;
    mount_signer(&server).await;
    Mock::given(method("PUT"))
        .and(path("/bucket/quick.bin"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(1500)))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/bucket/slow.bin"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let hooks = RecordingHooks::new();
    let uploader = uploader(UploaderOptions::new().server(server.uri()), hooks.clone());

    let first = uploader.handle(vec![UploadFile::new("quick.bin", "a")]);
    tokio::time::sleep(Duration::from_millis(300)).await;
    let second = uploader.handle(vec![UploadFile::new("slow.bin", "b")]);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(uploader.abort_upload());

    let second = tokio::time::timeout(Duration::from_secs(5), second.join())
        .await
        .unwrap();
    assert!(second[0].is_failed());

    // The earlier transfer is not reachable through the slot
    let first = tokio::time::timeout(Duration::from_secs(10), first.join())
        .await
        .unwrap();
    assert!(first[0].is_finished());

    assert_eq!(hooks.errors().len(), 1);
    assert_eq!(hooks.errors()[0].1, "slow.bin");
}

struct NeverSigns;

#[async_trait]
impl SignedUrlProvider for NeverSigns {
    async fn get_signed_url(&self, _file: &UploadFile) -> Result<SignResult, UploadError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_unresolved_provider_stalls_without_timeout() {
    let hooks = RecordingHooks::new();
    let uploader = S3Uploader::builder(UploaderOptions::new())
        .hooks(hooks.clone())
        .signed_url_provider(Arc::new(NeverSigns))
        .build()
        .unwrap();

    let batch = uploader.handle(vec![UploadFile::new("stuck.txt", "x")]);
    let joined = tokio::time::timeout(Duration::from_millis(300), batch.join()).await;
    assert!(joined.is_err(), "flow should still be pending");

    assert_eq!(
        hooks.events_for("stuck.txt"),
        vec![
            Event::Start("stuck.txt".into()),
            Event::Progress(
                0,
                direct_uploadr::upload::ProgressStatus::Waiting,
                "stuck.txt".into()
            ),
        ]
    );
    assert!(!uploader.abort_upload());
}

struct FailingSigner;

#[async_trait]
impl SignedUrlProvider for FailingSigner {
    async fn get_signed_url(&self, _file: &UploadFile) -> Result<SignResult, UploadError> {
        Err(UploadError::Provider("quota exceeded".into()))
    }
}

#[tokio::test]
async fn test_provider_failure_reported_without_context() {
    let hooks = RecordingHooks::new();
    let uploader = S3Uploader::builder(UploaderOptions::new())
        .hooks(hooks.clone())
        .signed_url_provider(Arc::new(FailingSigner))
        .build()
        .unwrap();

    let outcome = uploader.upload(UploadFile::new("a.txt", "x")).await;
    assert!(outcome.is_failed());

    let errors = hooks.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "Signing provider error: quota exceeded");
    assert!(errors[0].2.is_none());
}
