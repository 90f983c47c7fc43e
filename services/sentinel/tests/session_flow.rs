use chrono::{Duration, TimeZone, Utc};
use fence_sentinel::{
    run_feed, Config, FrameSource, PartialSnapshot, SensorState, Session, SessionCommand,
    SinkKind, TestPatternDevice,
};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

fn session_with_downloads(dir: &TempDir) -> Arc<Session> {
    let mut config = Config::default();
    config.capture.download_dir = dir.path().join("downloads");
    let frames = Arc::new(FrameSource::new(Arc::new(TestPatternDevice::new(160, 120))));
    Arc::new(Session::new(&config, frames))
}

#[tokio::test]
async fn feed_drives_reduction_loop_in_order() {
    let tmp = TempDir::new().unwrap();
    let session = session_with_downloads(&tmp);

    let input = concat!(
        "{\"online\": true, \"fenceActive\": true, \"temperature\": 18.5}\n",
        "{\"fenceActive\": false}\n",
        "{\"vibration\": \"ACTIVE\"}\n",
        "{\"online\": false}\n",
    );

    let (tx, rx) = mpsc::channel(4);

    let runner = tokio::spawn({
        let session = session.clone();
        async move { session.run(rx).await }
    });
    let stats = assert_ok!(run_feed(input.as_bytes(), tx).await);
    runner.await.unwrap();

    assert_eq!(stats.snapshots, 4);

    let state = session.state();
    let messages: Vec<&str> = state.log.iter().rev().map(|e| e.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "ESP32 Connection Established",
            "Fence Power DISARMED",
            "Fence Vibration Detected",
            "ESP32 Connection Lost",
        ]
    );
    assert_eq!(state.history.len(), 4);
    assert!(state.history.iter().all(|p| p.temp == 18.5));
}

#[tokio::test]
async fn cooldown_windows_across_alarm_kinds() {
    let tmp = TempDir::new().unwrap();
    let session = session_with_downloads(&tmp);
    assert_ok!(session.apply(SessionCommand::StartCamera).await);

    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 22, 0, 0).unwrap();

    let first = session.process(
        &PartialSnapshot::default().with_pir(SensorState::Active),
        t0,
    );
    let within = session.process(
        &PartialSnapshot::default().with_smoke(420.0),
        t0 + Duration::milliseconds(2000),
    );
    let after = session.process(
        &PartialSnapshot::default().with_fence_current(7.2),
        t0 + Duration::milliseconds(8000),
    );

    assert_eq!(first.captures.len(), 1);
    assert!(within.captures.is_empty());
    // Motion and smoke still hold, high current joins them.
    assert_eq!(after.captures.len(), 3);

    let mut names = Vec::new();
    for handle in first.captures.into_iter().chain(after.captures) {
        let artifact = handle.await.unwrap().unwrap();
        assert_eq!(artifact.sink, SinkKind::Fallback);
        names.push(
            artifact
                .path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned(),
        );
    }
    names.sort();
    assert_eq!(
        names,
        vec![
            "Image_Detected_High_Current.png",
            "Image_Detected_Motion (1).png",
            "Image_Detected_Motion.png",
            "Image_Detected_Smoke.png",
        ]
    );
}

#[tokio::test]
async fn revoked_directory_falls_back_to_downloads() {
    let tmp = TempDir::new().unwrap();
    let session = session_with_downloads(&tmp);
    let linked = tmp.path().join("evidence");
    std::fs::create_dir(&linked).unwrap();

    assert_ok!(session.apply(SessionCommand::StartCamera).await);
    assert_ok!(session.apply(SessionCommand::LinkDirectory(linked.clone())).await);

    // Access to the linked location disappears.
    std::fs::remove_dir(&linked).unwrap();

    let processed = session.process(
        &PartialSnapshot::default().with_box_tamper(SensorState::Active),
        Utc::now(),
    );
    assert_eq!(processed.captures.len(), 1);

    for handle in processed.captures {
        let artifact = handle.await.unwrap().unwrap();
        assert_eq!(artifact.sink, SinkKind::Fallback);
        assert!(artifact.path.starts_with(tmp.path().join("downloads")));
    }
}

#[tokio::test]
async fn operator_commands_take_effect_in_line_order() {
    let tmp = TempDir::new().unwrap();
    let session = session_with_downloads(&tmp);
    let linked = tmp.path().join("evidence");
    std::fs::create_dir(&linked).unwrap();

    let input = format!(
        ":camera on\n:link {}\n{{\"boxTamper\": \"ACTIVE\"}}\n",
        linked.display()
    );

    let (tx, rx) = mpsc::channel(4);
    let runner = tokio::spawn({
        let session = session.clone();
        async move { session.run(rx).await }
    });
    let stats = assert_ok!(run_feed(input.as_bytes(), tx).await);
    runner.await.unwrap();

    assert_eq!(stats.commands, 2);
    assert_eq!(session.stats().capture_batches, 1);
    assert!(linked.join("Image_Detected_Control_Box.png").exists());

    session.shutdown().await;
    assert!(!session.pipeline().has_primary());
    assert!(!session.pipeline().frames().is_active());
}
