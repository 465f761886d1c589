//! Push-to-talk session tests
//!
//! Drives the controller with mock peripherals and a scripted transport;
//! no audio hardware or network is involved.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use common::{MockInput, MockOutput, MockPin, MockTransport, audio_response, result_response};
use lantern_device::assistant::proto::converse_request;
use lantern_device::assistant::{ConversationTransport, PushToTalkController};
use lantern_device::audio::{AudioInput, AudioOutput};
use lantern_device::gpio::{DigitalOutput, TriggerEvent};
use lantern_device::prefs::Prefs;

struct Harness {
    transport: Arc<MockTransport>,
    input: Arc<MockInput>,
    output: Arc<MockOutput>,
    led: Arc<MockPin>,
    trigger: mpsc::Sender<TriggerEvent>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    prefs: Prefs,
    _data_dir: tempfile::TempDir,
}

fn spawn_harness() -> Harness {
    let transport = Arc::new(MockTransport::default());
    let input = Arc::new(MockInput::default());
    let output = Arc::new(MockOutput::default());
    let led = Arc::new(MockPin::default());
    let data_dir = tempfile::tempdir().unwrap();
    let prefs = Prefs::open(data_dir.path());

    let controller = PushToTalkController::new(
        Arc::clone(&transport) as Arc<dyn ConversationTransport>,
        Arc::clone(&input) as Arc<dyn AudioInput>,
        Arc::clone(&output) as Arc<dyn AudioOutput>,
        Arc::clone(&led) as Arc<dyn DigitalOutput>,
        prefs.clone(),
        prefs.volume_percentage(),
    );

    let (trigger, trigger_rx) = mpsc::channel(16);
    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(controller.run(trigger_rx, shutdown_rx));

    Harness {
        transport,
        input,
        output,
        led,
        trigger,
        shutdown,
        task,
        prefs,
        _data_dir: data_dir,
    }
}

/// Let the controller and pump tasks settle
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn sessions_never_overlap() {
    let h = spawn_harness();

    h.trigger.send(TriggerEvent::Pressed).await.unwrap();
    settle().await;
    assert_eq!(h.transport.session_count(), 1);
    assert_eq!(h.input.starts(), 1);

    // A second press while streaming is ignored.
    h.trigger.send(TriggerEvent::Pressed).await.unwrap();
    settle().await;
    assert_eq!(h.transport.session_count(), 1);

    h.trigger.send(TriggerEvent::Released).await.unwrap();
    settle().await;
    assert_eq!(h.input.stops(), 1);
    assert_eq!(h.output.resume_count(), 1);

    // The first session's write-handle is gone before the next press can
    // open a stream.
    let mut probe = h.transport.probe(0);
    assert!(probe.outbound.recv().await.is_none());

    h.trigger.send(TriggerEvent::Pressed).await.unwrap();
    settle().await;
    assert_eq!(h.transport.session_count(), 2);

    h.shutdown.send(true).unwrap();
    h.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn begin_carries_latest_state_token() {
    let h = spawn_harness();

    h.trigger.send(TriggerEvent::Pressed).await.unwrap();
    settle().await;

    // The assistant hands back a continuation token mid-session.
    let probe = h.transport.probe(0);
    probe
        .inbound
        .send(Ok(result_response(b"turn-1", 0, "")))
        .await
        .unwrap();
    settle().await;

    h.trigger.send(TriggerEvent::Released).await.unwrap();
    settle().await;
    h.trigger.send(TriggerEvent::Pressed).await.unwrap();
    settle().await;

    let begins = h.transport.begins.lock().unwrap().clone();
    assert_eq!(begins.len(), 2);
    assert_eq!(begins[0].0, None);
    assert_eq!(begins[1].0, Some(b"turn-1".to_vec()));

    h.shutdown.send(true).unwrap();
    h.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn captured_frames_flow_to_the_stream_in_order() {
    let h = spawn_harness();

    h.trigger.send(TriggerEvent::Pressed).await.unwrap();
    settle().await;

    h.input.push_frame(vec![1; 8]);
    h.input.push_frame(vec![2; 8]);
    settle().await;

    let mut probe = h.transport.probe(0);
    for expected in [vec![1u8; 8], vec![2u8; 8]] {
        let frame = probe.outbound.recv().await.unwrap();
        match frame.payload {
            Some(converse_request::Payload::AudioIn(data)) => assert_eq!(data, expected),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    h.shutdown.send(true).unwrap();
    h.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn read_error_aborts_frame_loop_without_killing_session() {
    let h = spawn_harness();

    h.trigger.send(TriggerEvent::Pressed).await.unwrap();
    settle().await;

    h.input.push_error("device gone");
    // Frames queued after the error must never be sent.
    h.input.push_frame(vec![9; 8]);
    settle().await;

    let mut probe = h.transport.probe(0);
    assert!(probe.outbound.try_recv().is_err());

    // The session still finalizes normally on release.
    h.trigger.send(TriggerEvent::Released).await.unwrap();
    settle().await;
    assert_eq!(h.input.stops(), 1);
    assert!(probe.outbound.recv().await.is_none());

    h.shutdown.send(true).unwrap();
    h.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn volume_zero_is_unchanged_nonzero_applies_and_persists() {
    let h = spawn_harness();

    h.trigger.send(TriggerEvent::Pressed).await.unwrap();
    settle().await;
    let probe = h.transport.probe(0);

    probe
        .inbound
        .send(Ok(result_response(b"", 0, "")))
        .await
        .unwrap();
    settle().await;
    assert_eq!(h.output.last_gain(), None);
    assert_eq!(h.prefs.volume_percentage(), 100);

    probe
        .inbound
        .send(Ok(result_response(b"", 40, "")))
        .await
        .unwrap();
    settle().await;
    assert_eq!(h.output.last_gain(), Some(0.4));
    assert_eq!(h.prefs.volume_percentage(), 40);

    h.shutdown.send(true).unwrap();
    h.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn audio_out_plays_and_led_clears_on_completion() {
    let h = spawn_harness();

    h.trigger.send(TriggerEvent::Pressed).await.unwrap();
    settle().await;
    assert_eq!(h.led.last(), Some(true));

    let probe = h.transport.probe(0);
    probe
        .inbound
        .send(Ok(audio_response(&[7u8; 32])))
        .await
        .unwrap();
    settle().await;
    assert_eq!(h.output.written.lock().unwrap().as_slice(), [vec![7u8; 32]]);

    h.trigger.send(TriggerEvent::Released).await.unwrap();
    settle().await;

    // Dropping the inbound feed completes the stream; the pump forces the
    // LED off.
    drop(probe);
    settle().await;
    assert_eq!(h.led.last(), Some(false));

    h.shutdown.send(true).unwrap();
    h.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_begin_leaves_controller_idle() {
    let h = spawn_harness();

    h.transport.fail_next_begin();
    h.trigger.send(TriggerEvent::Pressed).await.unwrap();
    settle().await;

    assert_eq!(h.transport.session_count(), 0);
    // Capture was rolled back.
    assert_eq!(h.input.starts(), 1);
    assert_eq!(h.input.stops(), 1);

    // The next press opens a session normally.
    h.trigger.send(TriggerEvent::Released).await.unwrap();
    h.trigger.send(TriggerEvent::Pressed).await.unwrap();
    settle().await;
    assert_eq!(h.transport.session_count(), 1);

    h.shutdown.send(true).unwrap();
    h.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_while_streaming_is_clean() {
    let h = spawn_harness();

    h.trigger.send(TriggerEvent::Pressed).await.unwrap();
    settle().await;
    assert_eq!(h.transport.session_count(), 1);

    h.shutdown.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), h.task)
        .await
        .expect("controller did not stop")
        .expect("controller panicked");

    assert_eq!(h.input.stops(), 1);
    assert_eq!(h.led.last(), Some(false));

    // The outbound stream was half-closed on the way out.
    let mut probe = h.transport.probe(0);
    assert!(probe.outbound.recv().await.is_none());
}
