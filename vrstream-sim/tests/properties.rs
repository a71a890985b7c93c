//! Property tests for timing and playback rules.

use std::time::Duration;

use proptest::prelude::*;
use vrstream_core::test_mocks::{ManualScheduler, RecordingTransport};
use vrstream_core::{
    ClientConfig, ClientContext, NullMetricsSink, PlaybackMode, StreamingClient, TimerKind,
    TimerSlot, TraceEntry, TraceTable, VrStreamError,
};

fn client(config: ClientConfig) -> StreamingClient {
    StreamingClient::new(config, TraceTable::empty(), Box::new(NullMetricsSink)).unwrap()
}

proptest! {
    #[test]
    fn test_reconnect_never_passes_stop_time(
        stop_ms in 1u64..100_000,
        now_fraction in 0.0f64..1.0,
        delay_ms in 0u64..20_000,
    ) {
        let stop = Duration::from_millis(stop_ms);
        let now = Duration::from_millis((stop_ms as f64 * now_fraction) as u64);
        let delay = Duration::from_millis(delay_ms);

        let mut client = client(ClientConfig {
            start_time: Duration::ZERO,
            stop_time: Some(stop),
            idle_interval: delay,
            trace_path: None,
            ..Default::default()
        });
        let mut transport = RecordingTransport::new();
        let mut scheduler = ManualScheduler::new();
        scheduler.set_now(now);

        client
            .on_closed(&mut ClientContext::new(&mut transport, &mut scheduler))
            .unwrap();

        if now + delay < stop {
            let pending = client.timers().pending(TimerSlot::Session).unwrap();
            prop_assert_eq!(pending.kind, TimerKind::Connect);
            prop_assert_eq!(pending.fire_time, now + delay);
            prop_assert!(!client.is_terminated());
        } else {
            prop_assert!(client.is_terminated());
            prop_assert_eq!(scheduler.pending_count(), 0);
        }
    }

    #[test]
    fn test_stop_before_start_is_rejected(start_ms in 1u64..100_000, gap_ms in 1u64..10_000) {
        let start = Duration::from_millis(start_ms + gap_ms);
        let stop = Duration::from_millis(start_ms);

        let result = StreamingClient::new(
            ClientConfig {
                start_time: start,
                stop_time: Some(stop),
                trace_path: None,
                ..Default::default()
            },
            TraceTable::empty(),
            Box::new(NullMetricsSink),
        );

        prop_assert!(matches!(result, Err(VrStreamError::Config(_))));
    }

    #[test]
    fn test_playback_pointer_is_bounded(duration in 1u32..50, ticks in 0u32..120) {
        let mut client = client(ClientConfig {
            video_duration: duration,
            trace_path: None,
            ..Default::default()
        });
        let mut transport = RecordingTransport::new();
        let mut scheduler = ManualScheduler::new();

        let mut last = 0;
        for _ in 0..ticks {
            client
                .on_playback_tick(&mut ClientContext::new(&mut transport, &mut scheduler))
                .unwrap();
            let pointer = client.playback().playback_pointer();
            prop_assert!(pointer >= last && pointer <= last + 1);
            last = pointer;
        }

        prop_assert_eq!(client.playback().playback_pointer(), ticks.min(duration));
        prop_assert_eq!(
            client.playback().mode() == PlaybackMode::Stopped,
            ticks >= duration
        );
    }

    #[test]
    fn test_trace_lookup_keeps_first_duplicate(
        rows in proptest::collection::vec((0u32..20, 1u64..1_000_000), 1..40),
    ) {
        let trace = TraceTable::from_entries(rows.iter().map(|&(time, size)| TraceEntry {
            time_index: f64::from(time),
            size_bytes: size,
        }));

        for &(time, _) in &rows {
            let first = rows
                .iter()
                .find(|&&(t, _)| t == time)
                .map(|&(_, size)| size);
            prop_assert_eq!(trace.lookup(f64::from(time)), first);
        }
        prop_assert_eq!(trace.lookup(20.5), None);
    }
}
