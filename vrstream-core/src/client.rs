//! Streaming client: connection lifecycle, request pacing and playback.
//!
//! `StreamingClient` owns the session counters, the playback state and the
//! timers of one logical client. Every public `on_*` method handles exactly
//! one externally delivered event and runs to completion. Transport and
//! scheduler access is passed in per event through a [`ClientContext`].

use std::fmt;

use crate::config::ClientConfig;
use crate::metrics::{CsvMetricsSink, Metric, MetricsSink, NullMetricsSink};
use crate::playback::{PLAYBACK_SEND_DELAY, PLAYBACK_TICK_INTERVAL, PlaybackMode, PlaybackState, TickOutcome};
use crate::request::{LookupOutcome, RequestBuilder};
use crate::session::Session;
use crate::timer::{ArmedTimer, Scheduler, SimTime, TimerCoordinator, TimerKind, TimerSlot, TimerToken};
use crate::trace::TraceTable;
use crate::transport::{Transport, TransportState};
use crate::Result;

/// External collaborators available while handling one event.
pub struct ClientContext<'a> {
    pub transport: &'a mut dyn Transport,
    pub scheduler: &'a mut dyn Scheduler,
}

impl<'a> ClientContext<'a> {
    pub fn new(transport: &'a mut dyn Transport, scheduler: &'a mut dyn Scheduler) -> Self {
        Self {
            transport,
            scheduler,
        }
    }

    fn now(&self) -> SimTime {
        self.scheduler.now()
    }
}

/// Client-side view of the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    #[default]
    Idle,
    Connecting,
    Established,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionPhase::Idle => "idle",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Established => "established",
            ConnectionPhase::Closing => "closing",
            ConnectionPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Where a crash signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashOrigin {
    /// The unit containing this client crashed; the transport goes down with it
    ContainingUnit,
    /// Something outside the containing unit crashed
    Elsewhere,
}

/// Lifetime counters of a client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub connects: u64,
    pub failures: u64,
    pub closes: u64,
    pub requests_sent: u64,
    pub lookup_misses: u64,
    pub segments_buffered: u64,
}

/// Point-in-time view of a client, for invariant checks and reports.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSnapshot {
    pub time: SimTime,
    pub phase: ConnectionPhase,
    pub requests_remaining: u32,
    pub buffer_level: u32,
    pub playback_pointer: u32,
    pub video_duration: u32,
    pub mode: PlaybackMode,
    pub session_timer: Option<ArmedTimer>,
    pub playback_timer: Option<ArmedTimer>,
    pub terminated: bool,
    pub bytes_received: u64,
    pub stats: ClientStats,
}

/// One logical streaming client.
pub struct StreamingClient {
    config: ClientConfig,
    trace: TraceTable,
    metrics: Box<dyn MetricsSink>,
    session: Session,
    playback: PlaybackState,
    timers: TimerCoordinator,
    phase: ConnectionPhase,
    stats: ClientStats,
}

impl StreamingClient {
    /// Creates a client from validated configuration and a loaded trace.
    ///
    /// # Errors
    ///
    /// - `VrStreamError::Config` - Time bounds or video duration are invalid
    pub fn new(
        config: ClientConfig,
        trace: TraceTable,
        metrics: Box<dyn MetricsSink>,
    ) -> Result<Self> {
        config.validate()?;

        let session = Session::new(config.session_length(), config.reply_length);
        let playback = PlaybackState::new(config.video_duration);

        Ok(Self {
            config,
            trace,
            metrics,
            session,
            playback,
            timers: TimerCoordinator::new(),
            phase: ConnectionPhase::Idle,
            stats: ClientStats::default(),
        })
    }

    /// Creates a client, loading the trace and opening the metrics sink
    /// named by the configuration.
    ///
    /// # Errors
    ///
    /// - `VrStreamError::Config` - Time bounds or video duration are invalid
    /// - `VrStreamError::Trace` - Trace file cannot be opened or read
    /// - `VrStreamError::Io` - Metrics directory cannot be created
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let trace = match &config.trace_path {
            Some(path) => TraceTable::load(path)?,
            None => TraceTable::empty(),
        };
        let metrics: Box<dyn MetricsSink> = match &config.metrics_dir {
            Some(dir) => Box::new(CsvMetricsSink::new(dir)?),
            None => Box::new(NullMetricsSink),
        };

        Self::new(config, trace, metrics)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn timers(&self) -> &TimerCoordinator {
        &self.timers
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    /// Returns true once the client has released its timers for good.
    pub fn is_terminated(&self) -> bool {
        self.timers.is_retired(TimerSlot::Session)
    }

    /// Captures the current state.
    pub fn snapshot(&self, time: SimTime) -> ClientSnapshot {
        ClientSnapshot {
            time,
            phase: self.phase,
            requests_remaining: self.session.requests_remaining(),
            buffer_level: self.playback.buffer_level(),
            playback_pointer: self.playback.playback_pointer(),
            video_duration: self.playback.video_duration(),
            mode: self.playback.mode(),
            session_timer: self.timers.pending(TimerSlot::Session),
            playback_timer: self.timers.pending(TimerSlot::Playback),
            terminated: self.is_terminated(),
            bytes_received: self.session.bytes_received_total(),
            stats: self.stats,
        }
    }

    /// Arms the first connect at the configured start time.
    ///
    /// Nothing is armed if the start would fall at or after the stop time,
    /// unless start and stop time are configured equal.
    ///
    /// # Errors
    ///
    /// - `VrStreamError::Timer` - Client was already started
    pub fn start(&mut self, ctx: &mut ClientContext<'_>) -> Result<()> {
        let now = ctx.now();
        let start = self.config.start_time.max(now);

        let within_window = match self.config.stop_time {
            None => true,
            Some(stop) => start < stop || (start == stop && self.config.start_time == stop),
        };

        if !within_window {
            tracing::info!(
                "Start time {:.3}s is not before stop time, client stays idle",
                start.as_secs_f64()
            );
            return Ok(());
        }

        self.timers.arm(ctx.scheduler, TimerKind::Connect, start)?;
        tracing::debug!("Connect scheduled at {:.3}s", start.as_secs_f64());
        Ok(())
    }

    /// Routes a delivered timer fire to its handler.
    ///
    /// # Errors
    ///
    /// - `VrStreamError::Timer` - Fire does not match a pending arming
    pub fn on_timer_fired(&mut self, ctx: &mut ClientContext<'_>, token: TimerToken) -> Result<()> {
        match self.timers.take_fired(token)? {
            TimerKind::Connect => self.on_connect_timer_fired(ctx),
            TimerKind::Send => self.on_send_timer_fired(ctx),
            TimerKind::Playback => self.on_playback_tick(ctx),
        }
    }

    /// Opens a connection. With early send, the first request goes out in
    /// the same step.
    ///
    /// # Errors
    ///
    /// - `VrStreamError::Timer` - Timer bookkeeping failed
    pub fn on_connect_timer_fired(&mut self, ctx: &mut ClientContext<'_>) -> Result<()> {
        if self.is_terminated() {
            return Ok(());
        }

        self.phase = ConnectionPhase::Connecting;
        self.stats.connects += 1;
        tracing::info!("Connecting (attempt {})", self.stats.connects);
        ctx.transport.connect();

        if self.config.early_send {
            self.send_request(ctx);
        }
        Ok(())
    }

    /// Issues the next request, unless all have been issued.
    ///
    /// # Errors
    ///
    /// - `VrStreamError::Timer` - Timer bookkeeping failed
    pub fn on_send_timer_fired(&mut self, ctx: &mut ClientContext<'_>) -> Result<()> {
        if self.is_terminated() {
            return Ok(());
        }

        if self.session.requests_remaining() == 0 {
            tracing::debug!("Send timer fired with no requests remaining");
            return Ok(());
        }

        let state = ctx.transport.state();
        if state != TransportState::Connected {
            tracing::warn!("Send timer fired while transport is {state}, skipping request");
            return Ok(());
        }

        self.send_request(ctx);
        self.session.consume_request();
        Ok(())
    }

    /// Handles one playback tick.
    ///
    /// A tick after playback stopped is a no-op.
    ///
    /// # Errors
    ///
    /// - `VrStreamError::Timer` - Timer bookkeeping failed
    pub fn on_playback_tick(&mut self, ctx: &mut ClientContext<'_>) -> Result<()> {
        if self.is_terminated() {
            return Ok(());
        }

        let outcome = self
            .playback
            .on_playback_tick(self.session.requests_remaining());
        if outcome == TickOutcome::Ignored {
            tracing::debug!("Playback tick after playback stopped, ignoring");
            return Ok(());
        }

        let now = ctx.now();
        self.emit(Metric::PlaybackPointer, now, u64::from(self.playback.playback_pointer()));
        self.emit(Metric::BufferLevel, now, u64::from(self.playback.buffer_level()));
        tracing::debug!(
            "Playback tick: pointer={} buffer={} mode={} remaining={}",
            self.playback.playback_pointer(),
            self.playback.buffer_level(),
            self.playback.mode(),
            self.session.requests_remaining()
        );

        match outcome {
            TickOutcome::Finished => {
                tracing::info!("Video playback complete after {} segments", self.playback.playback_pointer());
                self.timers.retire(ctx.scheduler, TimerSlot::Playback);
            }
            TickOutcome::Continue {
                rearm_tick,
                request_send,
            } => {
                if rearm_tick {
                    let Some(at) = now.checked_add(PLAYBACK_TICK_INTERVAL) else {
                        tracing::warn!("Playback clock overflowed, releasing timers");
                        self.release_timers(ctx);
                        return Ok(());
                    };
                    self.timers.reschedule(ctx.scheduler, TimerKind::Playback, at)?;
                }
                if request_send && self.phase == ConnectionPhase::Established {
                    self.reschedule_after_or_release(ctx, PLAYBACK_SEND_DELAY, TimerKind::Send)?;
                }
            }
            TickOutcome::Ignored => {}
        }
        Ok(())
    }

    /// Connection is open: starts a fresh request run.
    ///
    /// # Errors
    ///
    /// - `VrStreamError::Timer` - Timer bookkeeping failed
    pub fn on_established(&mut self, ctx: &mut ClientContext<'_>) -> Result<()> {
        if self.is_terminated() {
            return Ok(());
        }

        self.phase = ConnectionPhase::Established;
        self.session.reset_requests(self.config.session_length());
        tracing::info!(
            "Connection established, {} requests in this session",
            self.session.requests_remaining()
        );

        if !self.config.early_send {
            self.send_request(ctx);
        }
        self.session.consume_request();
        Ok(())
    }

    /// Accounts newly arrived reply bytes and paces the next request.
    ///
    /// # Errors
    ///
    /// - `VrStreamError::Timer` - Timer bookkeeping failed
    pub fn on_data_arrived(&mut self, ctx: &mut ClientContext<'_>, bytes: u64) -> Result<()> {
        if self.is_terminated() {
            tracing::debug!("Dropping {bytes} bytes delivered after termination");
            return Ok(());
        }

        self.session.record_bytes(bytes);
        let segment_complete = self.playback.on_reply_complete(&mut self.session);

        if segment_complete {
            self.stats.segments_buffered += 1;
            let now = ctx.now();
            self.emit(Metric::BufferLevel, now, u64::from(self.playback.buffer_level()));
            tracing::debug!("Segment buffered, buffer level {}", self.playback.buffer_level());
            self.start_playback_if_idle(ctx)?;
        }

        if self.session.requests_remaining() > 0 {
            self.reschedule_after_or_release(ctx, self.config.think_time, TimerKind::Send)?;
        } else if segment_complete && ctx.transport.state() != TransportState::LocallyClosed {
            // Closes on the completed last segment, not on every arrival
            // once nothing remains; a partial reply keeps the connection open
            tracing::info!("Reply to last request arrived, closing session");
            self.close(ctx);
        }
        Ok(())
    }

    /// Connection closed: reconnects after the idle interval.
    ///
    /// # Errors
    ///
    /// - `VrStreamError::Timer` - Timer bookkeeping failed
    pub fn on_closed(&mut self, ctx: &mut ClientContext<'_>) -> Result<()> {
        self.phase = ConnectionPhase::Closed;
        self.stats.closes += 1;
        tracing::info!("Connection closed");

        self.reschedule_after_or_release(ctx, self.config.idle_interval, TimerKind::Connect)?;
        Ok(())
    }

    /// Connection failed: reconnects after the reconnect interval.
    ///
    /// # Errors
    ///
    /// - `VrStreamError::Timer` - Timer bookkeeping failed
    pub fn on_failure(&mut self, ctx: &mut ClientContext<'_>, code: i32) -> Result<()> {
        self.phase = ConnectionPhase::Closed;
        self.stats.failures += 1;
        tracing::warn!("Connection failed with code {code}");

        self.reschedule_after_or_release(ctx, self.config.reconnect_interval, TimerKind::Connect)?;
        Ok(())
    }

    /// Lifecycle stop: releases timers and closes an open connection.
    pub fn on_shutdown(&mut self, ctx: &mut ClientContext<'_>) {
        tracing::info!("Shutting down client");
        self.release_timers(ctx);

        if ctx.transport.state().is_closable() {
            self.phase = ConnectionPhase::Closing;
            ctx.transport.close();
        }
    }

    /// Lifecycle crash: releases timers and, if the crash came from
    /// elsewhere, destroys the connection without a graceful close.
    pub fn on_abort(&mut self, ctx: &mut ClientContext<'_>, origin: CrashOrigin) {
        tracing::warn!("Aborting client ({origin:?})");
        self.release_timers(ctx);

        if origin == CrashOrigin::Elsewhere {
            self.phase = ConnectionPhase::Closed;
            ctx.transport.destroy();
        }
    }

    fn send_request(&mut self, ctx: &mut ClientContext<'_>) {
        let (request, outcome) =
            RequestBuilder::new(&self.config, &self.trace).build(&self.session, ctx.now());

        if outcome == LookupOutcome::Miss {
            self.stats.lookup_misses += 1;
        }
        self.session
            .set_expected_reply_length(request.expected_reply_length);
        self.stats.requests_sent += 1;

        tracing::info!(
            "Sending request with {} bytes, expected reply length {} bytes, remaining {} requests",
            request.request_length,
            request.expected_reply_length,
            self.session.requests_remaining().saturating_sub(1)
        );
        ctx.transport.send(request);
    }

    fn close(&mut self, ctx: &mut ClientContext<'_>) {
        self.phase = ConnectionPhase::Closing;
        ctx.transport.close();
        self.timers.cancel(ctx.scheduler, TimerSlot::Session);
    }

    fn start_playback_if_idle(&mut self, ctx: &mut ClientContext<'_>) -> Result<()> {
        if self.playback.is_stopped()
            || self.timers.is_armed(TimerSlot::Playback)
            || self.timers.is_retired(TimerSlot::Playback)
        {
            return Ok(());
        }

        let Some(at) = ctx.now().checked_add(PLAYBACK_TICK_INTERVAL) else {
            tracing::warn!("Playback clock overflowed, releasing timers");
            self.release_timers(ctx);
            return Ok(());
        };
        self.timers.arm(ctx.scheduler, TimerKind::Playback, at)?;
        tracing::debug!("Playback scheduled at {:.3}s", at.as_secs_f64());
        Ok(())
    }

    /// Arms `kind` after `delay` if that still falls before the stop time,
    /// otherwise releases every timer for good. A fire time past the end of
    /// the clock never falls before the stop time.
    ///
    /// Returns true if the timer was armed.
    fn reschedule_after_or_release(
        &mut self,
        ctx: &mut ClientContext<'_>,
        delay: std::time::Duration,
        kind: TimerKind,
    ) -> Result<bool> {
        if self.timers.is_retired(kind.slot()) {
            return Ok(false);
        }

        let at = ctx
            .now()
            .checked_add(delay)
            .filter(|at| self.config.stop_time.is_none_or(|stop| *at < stop));
        if let Some(at) = at {
            self.timers.reschedule(ctx.scheduler, kind, at)?;
            return Ok(true);
        }

        tracing::info!(
            "{kind} after {:.3}s would pass the stop time, releasing timers",
            delay.as_secs_f64()
        );
        self.release_timers(ctx);
        Ok(false)
    }

    fn release_timers(&mut self, ctx: &mut ClientContext<'_>) {
        self.timers.retire(ctx.scheduler, TimerSlot::Session);
        self.timers.retire(ctx.scheduler, TimerSlot::Playback);
        self.playback.stop();
    }

    fn emit(&mut self, metric: Metric, time: SimTime, value: u64) {
        if let Err(e) = self.metrics.record(metric, time, value) {
            tracing::warn!("Failed to record {metric:?} sample: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::metrics::MemoryMetricsSink;
    use crate::test_mocks::{ManualScheduler, RecordingTransport, TransportCall};
    use crate::trace::TraceEntry;

    fn secs(value: f64) -> SimTime {
        Duration::from_secs_f64(value)
    }

    fn client_with(config: ClientConfig) -> (StreamingClient, MemoryMetricsSink) {
        let metrics = MemoryMetricsSink::new();
        let trace = TraceTable::from_entries([TraceEntry {
            time_index: 1.0,
            size_bytes: 1000,
        }]);
        let client = StreamingClient::new(config, trace, Box::new(metrics.clone())).unwrap();
        (client, metrics)
    }

    fn config() -> ClientConfig {
        ClientConfig {
            start_time: secs(1.0),
            stop_time: None,
            reply_length: 500,
            video_duration: 60,
            trace_path: None,
            ..Default::default()
        }
    }

    #[test]
    fn test_start_arms_connect_at_start_time() {
        let (mut client, _) = client_with(config());
        let mut transport = RecordingTransport::new();
        let mut scheduler = ManualScheduler::new();

        client
            .start(&mut ClientContext::new(&mut transport, &mut scheduler))
            .unwrap();

        let pending = client.timers().pending(TimerSlot::Session).unwrap();
        assert_eq!(pending.kind, TimerKind::Connect);
        assert_eq!(pending.fire_time, secs(1.0));
    }

    #[test]
    fn test_start_after_start_time_uses_now() {
        let (mut client, _) = client_with(config());
        let mut transport = RecordingTransport::new();
        let mut scheduler = ManualScheduler::new();
        scheduler.set_now(secs(4.0));

        client
            .start(&mut ClientContext::new(&mut transport, &mut scheduler))
            .unwrap();

        let pending = client.timers().pending(TimerSlot::Session).unwrap();
        assert_eq!(pending.fire_time, secs(4.0));
    }

    #[test]
    fn test_start_at_or_after_stop_time_stays_idle() {
        let (mut client, _) = client_with(ClientConfig {
            start_time: secs(1.0),
            stop_time: Some(secs(5.0)),
            ..config()
        });
        let mut transport = RecordingTransport::new();
        let mut scheduler = ManualScheduler::new();
        scheduler.set_now(secs(5.0));

        client
            .start(&mut ClientContext::new(&mut transport, &mut scheduler))
            .unwrap();

        assert!(!client.timers().is_armed(TimerSlot::Session));
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_zero_length_window_still_connects() {
        let (mut client, _) = client_with(ClientConfig {
            start_time: secs(5.0),
            stop_time: Some(secs(5.0)),
            ..config()
        });
        let mut transport = RecordingTransport::new();
        let mut scheduler = ManualScheduler::new();

        client
            .start(&mut ClientContext::new(&mut transport, &mut scheduler))
            .unwrap();

        assert_eq!(
            client.timers().pending(TimerSlot::Session).map(|t| t.fire_time),
            Some(secs(5.0))
        );
    }

    #[test]
    fn test_invalid_bounds_fail_before_arming() {
        let result = StreamingClient::new(
            ClientConfig {
                start_time: secs(10.0),
                stop_time: Some(secs(2.0)),
                ..config()
            },
            TraceTable::empty(),
            Box::new(NullMetricsSink),
        );

        assert!(matches!(result, Err(crate::VrStreamError::Config(_))));
    }

    #[test]
    fn test_established_sends_first_request() {
        let (mut client, _) = client_with(config());
        let mut transport = RecordingTransport::new();
        let mut scheduler = ManualScheduler::new();
        let mut ctx = ClientContext::new(&mut transport, &mut scheduler);

        client.on_connect_timer_fired(&mut ctx).unwrap();
        assert_eq!(client.stats().requests_sent, 0);

        client.on_established(&mut ctx).unwrap();

        assert_eq!(client.session().requests_remaining(), 59);
        assert_eq!(client.stats().requests_sent, 1);
        assert_eq!(client.session().expected_reply_length(), 1000);
        assert_eq!(client.phase(), ConnectionPhase::Established);
    }

    #[test]
    fn test_early_send_requests_on_connect() {
        let (mut client, _) = client_with(ClientConfig {
            early_send: true,
            ..config()
        });
        let mut transport = RecordingTransport::new();
        let mut scheduler = ManualScheduler::new();
        let mut ctx = ClientContext::new(&mut transport, &mut scheduler);

        client.on_connect_timer_fired(&mut ctx).unwrap();
        client.on_established(&mut ctx).unwrap();

        assert_eq!(client.stats().requests_sent, 1);
        assert_eq!(client.session().requests_remaining(), 59);
        assert_eq!(
            transport.calls().first(),
            Some(&TransportCall::Connect)
        );
    }

    #[test]
    fn test_data_arrival_schedules_send_after_think_time() {
        let (mut client, metrics) = client_with(ClientConfig {
            think_time: secs(0.5),
            ..config()
        });
        let mut transport = RecordingTransport::new();
        let mut scheduler = ManualScheduler::new();
        transport.set_state(TransportState::Connected);
        scheduler.set_now(secs(2.0));
        let mut ctx = ClientContext::new(&mut transport, &mut scheduler);

        client.on_established(&mut ctx).unwrap();
        client.on_data_arrived(&mut ctx, 1000).unwrap();

        let pending = client.timers().pending(TimerSlot::Session).unwrap();
        assert_eq!(pending.kind, TimerKind::Send);
        assert_eq!(pending.fire_time, secs(2.5));
        assert_eq!(client.playback().buffer_level(), 1);
        assert_eq!(metrics.values(Metric::BufferLevel), vec![1]);

        // First buffered segment starts the playback clock
        let playback = client.timers().pending(TimerSlot::Playback).unwrap();
        assert_eq!(playback.fire_time, secs(3.0));
    }

    #[test]
    fn test_last_reply_closes_connection() {
        let (mut client, _) = client_with(ClientConfig {
            video_duration: 1,
            ..config()
        });
        let mut transport = RecordingTransport::new();
        let mut scheduler = ManualScheduler::new();
        transport.set_state(TransportState::Connected);
        let mut ctx = ClientContext::new(&mut transport, &mut scheduler);

        client.on_established(&mut ctx).unwrap();
        assert_eq!(client.session().requests_remaining(), 0);

        // Partial reply keeps the connection open
        client.on_data_arrived(&mut ctx, 400).unwrap();
        assert_eq!(client.phase(), ConnectionPhase::Established);

        client.on_data_arrived(&mut ctx, 600).unwrap();
        assert_eq!(client.phase(), ConnectionPhase::Closing);
        assert!(transport.calls().contains(&TransportCall::Close));
        assert!(!client.timers().is_armed(TimerSlot::Session));
    }

    #[test]
    fn test_data_after_local_close_does_not_close_again() {
        let (mut client, _) = client_with(ClientConfig {
            video_duration: 1,
            ..config()
        });
        let mut transport = RecordingTransport::new();
        let mut scheduler = ManualScheduler::new();
        transport.set_state(TransportState::Connected);
        let mut ctx = ClientContext::new(&mut transport, &mut scheduler);

        client.on_established(&mut ctx).unwrap();
        client.on_data_arrived(&mut ctx, 1000).unwrap();
        assert_eq!(ctx.transport.state(), TransportState::LocallyClosed);

        // A duplicate reply completes the last segment once more
        client.on_data_arrived(&mut ctx, 1000).unwrap();

        let closes = transport
            .calls()
            .iter()
            .filter(|call| **call == TransportCall::Close)
            .count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn test_huge_think_time_releases_instead_of_overflowing() {
        let config = ClientConfig::from_json_str(
            r#"{ "thinkTime": 18446744073709549568.0, "tracePath": null }"#,
        )
        .unwrap();
        let (mut client, _) = client_with(config);
        let mut transport = RecordingTransport::new();
        let mut scheduler = ManualScheduler::new();
        transport.set_state(TransportState::Connected);
        scheduler.set_now(secs(5000.0));
        let mut ctx = ClientContext::new(&mut transport, &mut scheduler);

        client.on_established(&mut ctx).unwrap();
        client.on_data_arrived(&mut ctx, 10).unwrap();

        assert!(client.is_terminated());
        assert_eq!(client.playback().mode(), PlaybackMode::Stopped);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_huge_idle_interval_releases_without_stop_time() {
        let (mut client, _) = client_with(ClientConfig {
            idle_interval: Duration::MAX,
            ..config()
        });
        let mut transport = RecordingTransport::new();
        let mut scheduler = ManualScheduler::new();
        scheduler.set_now(secs(1.0));

        client
            .on_closed(&mut ClientContext::new(&mut transport, &mut scheduler))
            .unwrap();

        assert!(client.is_terminated());
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_closed_reconnects_after_idle_interval() {
        let (mut client, _) = client_with(ClientConfig {
            idle_interval: secs(10.0),
            ..config()
        });
        let mut transport = RecordingTransport::new();
        let mut scheduler = ManualScheduler::new();
        scheduler.set_now(secs(3.0));
        let mut ctx = ClientContext::new(&mut transport, &mut scheduler);

        client.on_closed(&mut ctx).unwrap();

        let pending = client.timers().pending(TimerSlot::Session).unwrap();
        assert_eq!(pending.kind, TimerKind::Connect);
        assert_eq!(pending.fire_time, secs(13.0));
    }

    #[test]
    fn test_failure_past_stop_time_releases_timers() {
        let (mut client, _) = client_with(ClientConfig {
            start_time: secs(0.0),
            stop_time: Some(secs(10.0)),
            reconnect_interval: secs(1.0),
            ..config()
        });
        let mut transport = RecordingTransport::new();
        let mut scheduler = ManualScheduler::new();
        scheduler.set_now(secs(9.5));
        let mut ctx = ClientContext::new(&mut transport, &mut scheduler);

        client.on_failure(&mut ctx, 1).unwrap();

        assert!(client.is_terminated());
        assert!(!client.timers().is_armed(TimerSlot::Session));
        assert_eq!(client.playback().mode(), PlaybackMode::Stopped);
        assert_eq!(scheduler.pending_count(), 0);

        // Terminal: later callbacks arm nothing
        let mut ctx = ClientContext::new(&mut transport, &mut scheduler);
        client.on_closed(&mut ctx).unwrap();
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_playback_finishes_and_ignores_later_ticks() {
        let (mut client, metrics) = client_with(ClientConfig {
            video_duration: 2,
            ..config()
        });
        let mut transport = RecordingTransport::new();
        let mut scheduler = ManualScheduler::new();
        let mut ctx = ClientContext::new(&mut transport, &mut scheduler);

        client.on_playback_tick(&mut ctx).unwrap();
        client.on_playback_tick(&mut ctx).unwrap();

        assert_eq!(client.playback().mode(), PlaybackMode::Stopped);
        assert!(client.timers().is_retired(TimerSlot::Playback));

        client.on_playback_tick(&mut ctx).unwrap();
        assert_eq!(client.playback().playback_pointer(), 2);
        assert_eq!(metrics.values(Metric::PlaybackPointer), vec![1, 2]);
    }

    #[test]
    fn test_shutdown_closes_connected_transport() {
        let (mut client, _) = client_with(config());
        let mut transport = RecordingTransport::new();
        let mut scheduler = ManualScheduler::new();
        let mut ctx = ClientContext::new(&mut transport, &mut scheduler);
        client.start(&mut ctx).unwrap();
        ctx.transport.connect();

        client.on_shutdown(&mut ctx);

        assert_eq!(scheduler.pending_count(), 0);
        assert!(client.is_terminated());
        assert!(transport.calls().contains(&TransportCall::Close));
    }

    #[test]
    fn test_shutdown_without_open_connection_issues_no_close() {
        for state in [
            TransportState::Idle,
            TransportState::Closed,
            TransportState::LocallyClosed,
        ] {
            let (mut client, _) = client_with(config());
            let mut transport = RecordingTransport::new();
            let mut scheduler = ManualScheduler::new();
            transport.set_state(state);

            client.on_shutdown(&mut ClientContext::new(&mut transport, &mut scheduler));

            assert!(client.is_terminated(), "{state}");
            assert!(transport.calls().is_empty(), "{state}");
            assert_eq!(client.playback().mode(), PlaybackMode::Stopped);
        }
    }

    #[test]
    fn test_abort_destroys_only_for_external_crash() {
        let (mut local, _) = client_with(config());
        let mut transport = RecordingTransport::new();
        let mut scheduler = ManualScheduler::new();
        local
            .start(&mut ClientContext::new(&mut transport, &mut scheduler))
            .unwrap();
        local.on_abort(
            &mut ClientContext::new(&mut transport, &mut scheduler),
            CrashOrigin::ContainingUnit,
        );
        assert!(!transport.calls().contains(&TransportCall::Destroy));
        assert_eq!(scheduler.pending_count(), 0);

        let (mut remote, _) = client_with(config());
        let mut transport = RecordingTransport::new();
        remote.on_abort(
            &mut ClientContext::new(&mut transport, &mut scheduler),
            CrashOrigin::Elsewhere,
        );
        assert!(transport.calls().contains(&TransportCall::Destroy));
    }

    #[test]
    fn test_stale_timer_fire_is_rejected() {
        let (mut client, _) = client_with(config());
        let mut transport = RecordingTransport::new();
        let mut scheduler = ManualScheduler::new();
        let mut ctx = ClientContext::new(&mut transport, &mut scheduler);

        client.start(&mut ctx).unwrap();
        let token = client.timers().pending(TimerSlot::Session).unwrap().token;
        client.on_timer_fired(&mut ctx, token).unwrap();

        let result = client.on_timer_fired(&mut ctx, token);
        assert!(matches!(result, Err(crate::VrStreamError::Timer(_))));
    }
}
