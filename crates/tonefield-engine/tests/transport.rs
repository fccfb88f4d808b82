mod support;

use std::sync::Arc;

use tokio::sync::watch;
use tonefield_engine::{
    StopOptions, TransportConfig, TransportError, TransportLoop, TransportStatus,
    VisualizerFrameData,
};
use tonefield_plugin_api::{PluginError, Size};

use support::{FakeSpec, Probe, TEST_TIMEOUT, direct_handles, eventually, point};

fn transport() -> TransportLoop {
    TransportLoop::new(TransportConfig::default(), VisualizerFrameData::new())
}

async fn wait_status(
    rx: &mut watch::Receiver<TransportStatus>,
    predicate: impl FnMut(&TransportStatus) -> bool,
) -> TransportStatus {
    tokio::time::timeout(TEST_TIMEOUT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for transport status")
        .expect("transport status channel closed")
        .clone()
}

#[tokio::test(flavor = "multi_thread")]
async fn processes_batches_and_flushes_on_stop() {
    let probe = Probe::new();
    let (detector, feed) = FakeSpec::new("cam").fed();
    let handles = direct_handles(&probe, detector, FakeSpec::new("img"), FakeSpec::new("syn"));
    let mut transport = transport();
    let mut presence = transport.subscribe_presence();

    transport.start(handles).expect("start transport");
    feed.send(Ok(vec![point(1, 10.0, 20.0), point(2, 30.0, 40.0)]))
        .expect("send batch");
    probe.wait_for("sonification:syn:process:2").await;
    eventually(|| transport.frame_data().tones().len() == 2).await;

    assert!(transport.status().is_running());
    assert!(*presence.borrow_and_update());
    let frame = transport.frame_data().snapshot();
    assert_eq!(frame.points.len(), 2);
    assert_eq!(frame.samples.len(), 2);
    assert_eq!(frame.tones.len(), 2);
    let analyser = frame.analyser.expect("analyser published");
    assert_eq!(analyser.downcast_ref::<String>().map(String::as_str), Some("syn"));

    transport.stop(StopOptions::FLUSH).await;

    assert!(transport.status().is_stopped());
    assert_eq!(probe.count("sonification:syn:process:0"), 1);
    assert!(!*presence.borrow());
    let frame = transport.frame_data().snapshot();
    assert!(frame.points.is_empty());
    assert!(frame.samples.is_empty());
    assert!(frame.tones.is_empty());
    assert!(frame.analyser.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn points_outside_the_canvas_are_not_sampled() {
    let probe = Probe::new();
    let (detector, feed) = FakeSpec::new("cam").fed();
    let handles = direct_handles(&probe, detector, FakeSpec::new("img"), FakeSpec::new("syn"));
    let mut transport = TransportLoop::new(
        TransportConfig {
            canvas_size: Some(Size::new(100.0, 100.0)),
        },
        VisualizerFrameData::new(),
    );

    transport.start(handles).expect("start transport");
    feed.send(Ok(vec![point(1, 50.0, 50.0), point(2, 150.0, 50.0)]))
        .expect("send batch");
    probe.wait_for("sonification:syn:process:1").await;

    assert!(probe.contains("sampling:img:sample:1"));
    assert_eq!(transport.frame_data().points().len(), 2);
    transport.stop(StopOptions::default()).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_failure_stops_the_loop_with_an_error() {
    let probe = Probe::new();
    let (detector, feed) = FakeSpec::new("cam").fed();
    let handles = direct_handles(
        &probe,
        detector,
        FakeSpec::new("img").failing_at("sample"),
        FakeSpec::new("syn"),
    );
    let mut transport = transport();
    let mut status = transport.subscribe_status();

    transport.start(handles).expect("start transport");
    feed.send(Ok(vec![point(1, 1.0, 1.0)])).expect("send batch");
    let failed = wait_status(&mut status, |status| status.error().is_some()).await;

    assert!(matches!(
        failed,
        TransportStatus::Error(TransportError::Sampling(PluginError::Failure(_)))
    ));
    assert!(!probe.contains("sonification:syn:process:1"));

    transport.stop(StopOptions::default()).await;
    assert!(transport.status().error().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_sampler_aborts_the_loop_with_an_error() {
    let probe = Probe::new();
    let (detector, feed) = FakeSpec::new("cam").fed();
    let handles = direct_handles(
        &probe,
        detector,
        FakeSpec::new("img").panicking_at("sample"),
        FakeSpec::new("syn"),
    );
    let mut transport = transport();
    let mut status = transport.subscribe_status();

    transport.start(handles).expect("start transport");
    feed.send(Ok(vec![point(1, 1.0, 1.0)])).expect("send batch");
    let failed = wait_status(&mut status, |status| status.error().is_some()).await;

    match failed {
        TransportStatus::Error(TransportError::Aborted(message)) => {
            assert!(message.contains("img sample panicked"), "{message}");
        },
        other => panic!("unexpected status {other:?}"),
    }
    assert!(!probe.contains("sonification:syn:process:1"));

    transport.stop(StopOptions::default()).await;
    assert!(matches!(
        transport.status(),
        TransportStatus::Error(TransportError::Aborted(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn detection_error_is_reported() {
    let probe = Probe::new();
    let (detector, feed) = FakeSpec::new("cam").fed();
    let handles = direct_handles(&probe, detector, FakeSpec::new("img"), FakeSpec::new("syn"));
    let mut transport = transport();
    let mut status = transport.subscribe_status();

    transport.start(handles).expect("start transport");
    feed.send(Err(PluginError::Failure("camera lost".to_string())))
        .expect("send error");
    let failed = wait_status(&mut status, |status| status.error().is_some()).await;

    assert!(matches!(
        failed,
        TransportStatus::Error(TransportError::Detection(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_signal_from_the_sequence_exits_silently() {
    let probe = Probe::new();
    let (detector, feed) = FakeSpec::new("cam").fed();
    let handles = direct_handles(&probe, detector, FakeSpec::new("img"), FakeSpec::new("syn"));
    let mut transport = transport();
    let mut status = transport.subscribe_status();

    transport.start(handles).expect("start transport");
    wait_status(&mut status, TransportStatus::is_running).await;
    feed.send(Err(PluginError::Cancelled)).expect("send cancellation");
    wait_status(&mut status, TransportStatus::is_stopped).await;

    assert!(!probe.contains("sampling:img:sample:0"));
    transport.stop(StopOptions::default()).await;
    assert!(transport.status().is_stopped());
}

#[tokio::test(flavor = "multi_thread")]
async fn ended_sequence_stops_cleanly_and_allows_a_restart() {
    let probe = Probe::new();
    let (detector, feed) = FakeSpec::new("cam").fed();
    let handles = direct_handles(&probe, detector, FakeSpec::new("img"), FakeSpec::new("syn"));
    let mut transport = transport();
    let mut status = transport.subscribe_status();

    transport.start(handles.clone()).expect("start transport");
    wait_status(&mut status, TransportStatus::is_running).await;
    drop(feed);
    wait_status(&mut status, TransportStatus::is_stopped).await;
    transport.stop(StopOptions::default()).await;
    assert!(transport.status().is_stopped());

    transport.start(handles).expect("restart after the sequence ended");
    probe.wait_for_count("detection:cam:points", 2).await;
    transport.stop(StopOptions::default()).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_is_idempotent_and_start_rejects_a_live_run() {
    let probe = Probe::new();
    let handles = direct_handles(
        &probe,
        FakeSpec::new("cam"),
        FakeSpec::new("img"),
        FakeSpec::new("syn"),
    );
    let mut transport = transport();

    transport.stop(StopOptions::FLUSH).await;
    assert!(probe.entries().is_empty());

    transport.start(handles.clone()).expect("start transport");
    assert_eq!(
        transport.start(handles),
        Err(TransportError::AlreadyRunning)
    );

    transport.stop(StopOptions::FLUSH).await;
    transport.stop(StopOptions::FLUSH).await;
    assert_eq!(probe.count("sonification:syn:process:0"), 1);
    assert!(transport.status().is_stopped());
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_handles_restarts_only_on_a_reference_change() {
    let probe = Probe::new();
    let first = direct_handles(
        &probe,
        FakeSpec::new("cam-a"),
        FakeSpec::new("img-a"),
        FakeSpec::new("syn-a"),
    );
    let second = direct_handles(
        &probe,
        FakeSpec::new("cam-b"),
        FakeSpec::new("img-a"),
        FakeSpec::new("syn-a"),
    );
    let mut transport = transport();

    transport
        .sync_handles(Some(first.clone()), true)
        .await
        .expect("sync first");
    transport
        .sync_handles(Some(first.clone()), true)
        .await
        .expect("sync first again");
    probe.wait_for("detection:cam-a:points").await;
    assert_eq!(probe.count("detection:cam-a:points"), 1);
    assert!(transport.is_running_against(&first));

    transport
        .sync_handles(Some(second.clone()), true)
        .await
        .expect("sync second");
    probe.wait_for("detection:cam-b:points").await;
    assert_eq!(probe.count("sonification:syn-a:process:0"), 1);
    assert!(transport.is_running_against(&second));
    assert!(!transport.is_running_against(&first));

    transport.sync_handles(None, false).await.expect("sync none");
    assert!(transport.handles().is_none());
    assert!(transport.status().is_stopped());
}

#[tokio::test(flavor = "multi_thread")]
async fn shared_frame_data_is_visible_to_other_readers() {
    let probe = Probe::new();
    let (detector, feed) = FakeSpec::new("cam").fed();
    let handles = direct_handles(&probe, detector, FakeSpec::new("img"), FakeSpec::new("syn"));
    let frame = VisualizerFrameData::new();
    let mut transport = TransportLoop::new(TransportConfig::default(), Arc::clone(&frame));

    transport.start(handles).expect("start transport");
    feed.send(Ok(vec![point(9, 3.0, 4.0)])).expect("send batch");
    probe.wait_for("sonification:syn:process:1").await;
    eventually(|| !frame.tones().is_empty()).await;

    assert!(frame.has_points());
    assert_eq!(frame.tones().first().map(|tone| tone.point_id), Some(9));
    transport.stop(StopOptions::default()).await;
    assert!(frame.has_points());
}
