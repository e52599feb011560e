mod common;

use common::{FakeBackend, Harness};
use shared::{
    CaptureError, ClientMessage, DaemonMessage, DetectorPreset, NoticeLevel,
};
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test]
async fn predict_without_hands_never_reaches_the_backend() {
    let mut harness = Harness::start(FakeBackend::new());
    harness.show_hands(0).await;

    let reply = harness
        .command(ClientMessage::Predict { model: "m1".to_string() })
        .await;

    assert!(matches!(reply, DaemonMessage::Error(e) if e == CaptureError::no_hand()));
    assert_eq!(harness.backend.predict_calls(), 0);
    harness.shutdown().await;
}

#[tokio::test]
async fn predict_with_a_hand_keeps_the_last_prediction() {
    let mut harness = Harness::start(FakeBackend::new());
    harness.show_hands(1).await;

    let reply = harness
        .command(ClientMessage::Predict { model: "m1".to_string() })
        .await;
    match reply {
        DaemonMessage::Prediction(prediction) => {
            assert_eq!(prediction.label, "A");
            assert_eq!(prediction.alternatives.len(), 2);
        }
        other => panic!("unexpected reply: {:?}", other),
    }
    assert_eq!(harness.backend.predict_calls(), 1);

    let status = harness.status().await;
    assert_eq!(status.last_prediction.map(|p| p.label), Some("A".to_string()));
    harness.shutdown().await;
}

#[tokio::test]
async fn predict_requires_a_model() {
    let mut harness = Harness::start(FakeBackend::new());
    harness.show_hands(1).await;

    let reply = harness
        .command(ClientMessage::Predict { model: " ".to_string() })
        .await;
    assert!(matches!(reply, DaemonMessage::Error(CaptureError::Validation(_))));
    assert_eq!(harness.backend.predict_calls(), 0);
    harness.shutdown().await;
}

#[tokio::test]
async fn single_capture_uploads_the_selected_label() {
    let mut harness = Harness::start(FakeBackend::new());
    harness.show_hands(1).await;
    harness
        .command(ClientMessage::SelectCategory("numeros".to_string()))
        .await;
    harness.command(ClientMessage::SelectLabel("7".to_string())).await;

    let reply = harness.command(ClientMessage::CaptureSample).await;
    assert!(matches!(reply, DaemonMessage::SampleCaptured { label } if label == "7"));

    let uploads = harness.backend.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].category, "numeros");

    let status = harness.status().await;
    assert_eq!(status.samples.map(|s| s.total_samples), Some(1));
    assert!(status
        .notices
        .iter()
        .any(|n| n.level == NoticeLevel::Success && n.text.contains('7')));
    harness.shutdown().await;
}

#[tokio::test]
async fn failed_single_capture_reports_the_backend_error() {
    let backend = FakeBackend::new();
    backend.fail_upload(0);
    let mut harness = Harness::start(backend);
    harness.show_hands(1).await;

    let reply = harness.command(ClientMessage::CaptureSample).await;
    assert!(matches!(reply, DaemonMessage::Error(CaptureError::Remote(_))));

    let reply = harness.command(ClientMessage::CaptureSample).await;
    assert!(matches!(reply, DaemonMessage::SampleCaptured { .. }));
    assert_eq!(harness.backend.total_samples(), 1);
    harness.shutdown().await;
}

#[tokio::test]
async fn category_switch_resets_the_label() {
    let harness = Harness::start(FakeBackend::new());

    let reply = harness
        .command(ClientMessage::SelectCategory("abecedario".to_string()))
        .await;
    assert!(matches!(reply, DaemonMessage::Selection(s) if s.label == "A"));

    let reply = harness.command(ClientMessage::SelectLabel("Q".to_string())).await;
    assert!(matches!(reply, DaemonMessage::Selection(s) if s.label == "Q"));

    let reply = harness
        .command(ClientMessage::SelectCategory("vocales".to_string()))
        .await;
    assert!(matches!(reply, DaemonMessage::Selection(s) if s.label == "A"));

    let reply = harness.command(ClientMessage::SelectLabel("Q".to_string())).await;
    assert!(matches!(reply, DaemonMessage::Error(CaptureError::Validation(_))));

    let reply = harness
        .command(ClientMessage::SelectCategory("colores".to_string()))
        .await;
    assert!(matches!(reply, DaemonMessage::Error(CaptureError::Validation(_))));
    assert_eq!(harness.status().await.selection.category, "vocales");
    harness.shutdown().await;
}

#[tokio::test]
async fn clear_then_list_is_empty() {
    let mut harness = Harness::start(FakeBackend::new());
    harness.show_hands(1).await;
    harness.command(ClientMessage::CaptureSample).await;
    harness.command(ClientMessage::CaptureSample).await;

    let reply = harness.command(ClientMessage::ClearSamples).await;
    assert!(matches!(reply, DaemonMessage::SamplesCleared));

    match harness.command(ClientMessage::ListSamples).await {
        DaemonMessage::Samples(samples) => {
            assert_eq!(samples.total_samples, 0);
            assert!(samples.samples_per_class.is_empty());
        }
        other => panic!("unexpected reply: {:?}", other),
    }
    harness.shutdown().await;
}

#[tokio::test]
async fn training_on_no_samples_leaves_models_unchanged() {
    let harness = Harness::start(FakeBackend::new());

    let reply = harness
        .command(ClientMessage::Train { name: "m1".to_string() })
        .await;
    match reply {
        DaemonMessage::Error(CaptureError::Remote(detail)) => {
            assert!(detail.contains("No samples available"))
        }
        other => panic!("unexpected reply: {:?}", other),
    }

    assert!(matches!(
        harness.command(ClientMessage::ListModels).await,
        DaemonMessage::Models(models) if models.is_empty()
    ));
    let status = harness.status().await;
    assert!(status.models.is_empty());
    assert!(status.notices.iter().any(|n| n.level == NoticeLevel::Error));
    harness.shutdown().await;
}

#[tokio::test]
async fn train_and_delete_refresh_the_model_list() {
    let mut harness = Harness::start(FakeBackend::new());
    harness.show_hands(1).await;
    harness.command(ClientMessage::CaptureSample).await;

    let reply = harness
        .command(ClientMessage::Train { name: "m1".to_string() })
        .await;
    assert!(matches!(reply, DaemonMessage::ModelTrained(model) if model.n_samples == 1));
    let models = harness.status().await.models;
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].classes, vec!["A".to_string()]);

    let reply = harness
        .command(ClientMessage::DeleteModel { name: "m1".to_string() })
        .await;
    assert!(matches!(reply, DaemonMessage::ModelDeleted(name) if name == "m1"));
    assert!(harness.status().await.models.is_empty());

    let reply = harness
        .command(ClientMessage::DeleteModel { name: "m1".to_string() })
        .await;
    assert!(matches!(reply, DaemonMessage::Error(CaptureError::Remote(_))));
    harness.shutdown().await;
}

#[tokio::test]
async fn train_requires_a_name() {
    let harness = Harness::start(FakeBackend::new());
    let reply = harness
        .command(ClientMessage::Train { name: String::new() })
        .await;
    assert!(matches!(reply, DaemonMessage::Error(CaptureError::Validation(_))));
    harness.shutdown().await;
}

#[tokio::test]
async fn preset_is_handed_to_the_detector() {
    let mut harness = Harness::start(FakeBackend::new());

    let reply = harness
        .command(ClientMessage::ApplyPreset(DetectorPreset::Precise))
        .await;
    assert!(matches!(reply, DaemonMessage::DetectorConfigured(o) if o.max_hands == 1));

    assert!(harness.detector.has_changed().unwrap());
    let options = *harness.detector.borrow_and_update();
    assert_eq!(options, DetectorPreset::Precise.options());
    assert_eq!(harness.status().await.detector, options);
    harness.shutdown().await;
}

#[tokio::test]
async fn remote_commands_work_without_capture() {
    let harness = Harness::with_surface(
        FakeBackend::new(),
        Err(CaptureError::Initialization("no camera".to_string())),
    );

    let reply = harness.command(ClientMessage::StartRecording).await;
    assert!(matches!(reply, DaemonMessage::Error(CaptureError::Initialization(_))));
    let reply = harness.command(ClientMessage::CaptureSample).await;
    assert!(matches!(reply, DaemonMessage::Error(CaptureError::Initialization(_))));

    assert!(matches!(
        harness.command(ClientMessage::ListSamples).await,
        DaemonMessage::Samples(_)
    ));
    let status = harness.status().await;
    assert!(!status.capture_enabled);
    assert_eq!(status.detection.status, "Waiting for detection...");
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn notices_expire() {
    let harness = Harness::start(FakeBackend::new());
    harness
        .command(ClientMessage::Train { name: "m1".to_string() })
        .await;
    assert!(!harness.status().await.notices.is_empty());

    sleep(Duration::from_secs(6)).await;
    assert!(harness.status().await.notices.is_empty());
    harness.shutdown().await;
}
