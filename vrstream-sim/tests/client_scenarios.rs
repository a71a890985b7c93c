//! Client behaviour driven step by step through recording doubles.

use std::time::Duration;

use vrstream_core::test_mocks::{ManualScheduler, RecordingTransport, TransportCall};
use vrstream_core::{
    ClientConfig, ClientContext, MemoryMetricsSink, Metric, NullMetricsSink, PlaybackMode,
    StreamingClient, TimerKind, TimerSlot, TraceTable, TransportState,
};

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value)
}

fn client(config: ClientConfig) -> StreamingClient {
    StreamingClient::new(config, TraceTable::empty(), Box::new(NullMetricsSink)).unwrap()
}

fn base_config() -> ClientConfig {
    ClientConfig {
        start_time: Duration::ZERO,
        trace_path: None,
        ..Default::default()
    }
}

/// Delivers every pending timer fire in time order.
fn drain_timers(
    client: &mut StreamingClient,
    transport: &mut RecordingTransport,
    scheduler: &mut ManualScheduler,
) {
    while let Some(token) = scheduler.pop_next() {
        client
            .on_timer_fired(&mut ClientContext::new(transport, scheduler), token)
            .unwrap();
    }
}

#[test]
fn test_connect_then_established_sends_one_request() {
    let mut client = client(ClientConfig {
        video_duration: 60,
        early_send: false,
        ..base_config()
    });
    let mut transport = RecordingTransport::new();
    let mut scheduler = ManualScheduler::new();

    client
        .start(&mut ClientContext::new(&mut transport, &mut scheduler))
        .unwrap();
    let token = scheduler.pop_next().unwrap();
    client
        .on_timer_fired(&mut ClientContext::new(&mut transport, &mut scheduler), token)
        .unwrap();

    assert_eq!(transport.calls(), &[TransportCall::Connect]);

    transport.set_state(TransportState::Connected);
    client
        .on_established(&mut ClientContext::new(&mut transport, &mut scheduler))
        .unwrap();

    assert_eq!(transport.sent_requests().len(), 1);
    assert_eq!(client.session().requests_remaining(), 59);
}

#[test]
fn test_early_send_requests_before_establishment() {
    let mut client = client(ClientConfig {
        early_send: true,
        ..base_config()
    });
    let mut transport = RecordingTransport::new();
    let mut scheduler = ManualScheduler::new();
    let mut ctx = ClientContext::new(&mut transport, &mut scheduler);

    client.on_connect_timer_fired(&mut ctx).unwrap();
    client.on_established(&mut ctx).unwrap();

    assert_eq!(transport.sent_requests().len(), 1);
    assert_eq!(
        transport.calls()[..2],
        [
            TransportCall::Connect,
            TransportCall::Send(transport.sent_requests()[0])
        ]
    );
    assert_eq!(client.session().requests_remaining(), 59);
}

#[test]
fn test_reconnect_past_stop_time_releases_timer() {
    let mut client = client(ClientConfig {
        stop_time: Some(secs(10.0)),
        reconnect_interval: secs(1.0),
        ..base_config()
    });
    let mut transport = RecordingTransport::new();
    let mut scheduler = ManualScheduler::new();
    scheduler.set_now(secs(9.5));

    client
        .on_failure(&mut ClientContext::new(&mut transport, &mut scheduler), 111)
        .unwrap();

    assert!(client.is_terminated());
    assert_eq!(scheduler.pending_count(), 0);
}

#[test]
fn test_reconnect_before_stop_time_is_armed() {
    let mut client = client(ClientConfig {
        stop_time: Some(secs(10.0)),
        reconnect_interval: secs(1.0),
        ..base_config()
    });
    let mut transport = RecordingTransport::new();
    let mut scheduler = ManualScheduler::new();
    scheduler.set_now(secs(8.5));

    client
        .on_failure(&mut ClientContext::new(&mut transport, &mut scheduler), 111)
        .unwrap();

    let pending = client.timers().pending(TimerSlot::Session).unwrap();
    assert_eq!(pending.kind, TimerKind::Connect);
    assert_eq!(pending.fire_time, secs(9.5));
    assert!(!client.is_terminated());
}

#[test]
fn test_playback_runs_to_end_and_stops() {
    let metrics = MemoryMetricsSink::new();
    let mut client = StreamingClient::new(
        ClientConfig {
            video_duration: 3,
            reply_length: 100,
            ..base_config()
        },
        TraceTable::empty(),
        Box::new(metrics.clone()),
    )
    .unwrap();
    let mut transport = RecordingTransport::new();
    let mut scheduler = ManualScheduler::new();
    transport.set_state(TransportState::Connected);

    {
        let mut ctx = ClientContext::new(&mut transport, &mut scheduler);
        client.on_established(&mut ctx).unwrap();
        client.on_data_arrived(&mut ctx, 100).unwrap();
    }
    drain_timers(&mut client, &mut transport, &mut scheduler);

    assert_eq!(client.playback().playback_pointer(), 3);
    assert_eq!(client.playback().mode(), PlaybackMode::Stopped);
    assert!(client.timers().is_retired(TimerSlot::Playback));
    assert_eq!(scheduler.pending_count(), 0);

    // A stray tick after the end changes nothing
    client
        .on_playback_tick(&mut ClientContext::new(&mut transport, &mut scheduler))
        .unwrap();
    assert_eq!(client.playback().playback_pointer(), 3);
    assert_eq!(scheduler.pending_count(), 0);
    assert_eq!(metrics.values(Metric::PlaybackPointer), vec![1, 2, 3]);

    // The first tick moved the next request one tick later
    assert_eq!(transport.sent_requests().len(), 2);
    assert_eq!(transport.sent_requests()[1].created_at, secs(2.0));
}

#[test]
fn test_send_timer_skips_when_not_connected() {
    let mut client = client(base_config());
    let mut transport = RecordingTransport::new();
    let mut scheduler = ManualScheduler::new();
    transport.set_state(TransportState::Connected);

    {
        let mut ctx = ClientContext::new(&mut transport, &mut scheduler);
        client.on_established(&mut ctx).unwrap();
        client.on_data_arrived(&mut ctx, 10).unwrap();
    }
    let remaining = client.session().requests_remaining();
    transport.set_state(TransportState::PeerClosed);

    client
        .on_send_timer_fired(&mut ClientContext::new(&mut transport, &mut scheduler))
        .unwrap();

    assert_eq!(transport.sent_requests().len(), 1);
    assert_eq!(client.session().requests_remaining(), remaining);
}
