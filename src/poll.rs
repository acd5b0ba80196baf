use std::fmt::Write;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use tokio::time::sleep;

use crate::api::DashboardSource;
use crate::display::{self, DisplayError, DisplayTransport, FrameBuffer, RefreshMode};
use crate::render::{self, DashboardView, Layout};

/// Decides between partial and full refreshes. Partial refreshes leave
/// ghosting behind on e-paper, so every `threshold + 1` partial refreshes are
/// followed by one full refresh.
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    threshold: u32,
    partials: u32,
}

impl RefreshPolicy {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            partials: 0,
        }
    }

    /// Consecutive partial refreshes since the last full one.
    pub fn partials(&self) -> u32 {
        self.partials
    }

    pub fn next_mode(&mut self) -> RefreshMode {
        if self.partials > self.threshold {
            self.partials = 0;
            RefreshMode::Full
        } else {
            self.partials += 1;
            RefreshMode::Partial
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub poll_interval: Duration,
    pub ready_poll_interval: Duration,
    pub full_refresh_threshold: u32,
    pub clock_format: String,
    pub background_path: Option<PathBuf>,
    pub layout: Layout,
}

pub struct PollLoop<Source, Display>
where
    Source: DashboardSource,
    Display: DisplayTransport,
{
    source: Source,
    display: Display,
    settings: PollSettings,
    refresh: RefreshPolicy,
    departure_failures: u32,
    bike_failures: u32,
}

impl<Source, Display> PollLoop<Source, Display>
where
    Source: DashboardSource,
    Display: DisplayTransport,
{
    pub fn new(source: Source, display: Display, settings: PollSettings) -> Self {
        let refresh = RefreshPolicy::new(settings.full_refresh_threshold);

        Self {
            source,
            display,
            settings,
            refresh,
            departure_failures: 0,
            bike_failures: 0,
        }
    }

    #[cfg(test)]
    pub fn display_mut(&mut self) -> &mut Display {
        &mut self.display
    }

    pub async fn wait_until_ready(&self) {
        while !self.display.is_ready() {
            log::debug!("display not ready, waiting");
            sleep(self.settings.ready_poll_interval).await;
        }
    }

    /// Waits for the panel, then runs cycles until the display fails.
    pub async fn run(&mut self) -> Result<(), DisplayError> {
        self.wait_until_ready().await;

        log::info!("initializing display");
        self.display.init()?;
        self.display.clear()?;

        loop {
            self.run_cycle(&Local::now()).await?;
            sleep(self.settings.poll_interval).await;
        }
    }

    /// Like [`Self::run`], but stops once `shutdown` resolves and leaves the
    /// panel cleared and asleep.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), DisplayError>
    where
        F: Future<Output = ()>,
    {
        let outcome = tokio::select! {
            result = self.run() => Some(result),
            _ = shutdown => None,
        };

        match outcome {
            Some(result) => result,
            None => {
                log::info!("cleaning up display");
                display::shutdown(&mut self.display)
            }
        }
    }

    /// Renders one frame and pushes it to the panel.
    pub async fn run_cycle<Tz>(&mut self, now: &DateTime<Tz>) -> Result<RefreshMode, DisplayError>
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let frame = self.compose(now).await;

        let mode = self.refresh.next_mode();
        match mode {
            RefreshMode::Full => {
                log::info!("running full refresh");
                self.display.init()?;
                self.display.display_full(&frame)?;
            }
            RefreshMode::Partial => {
                log::info!(
                    "running partial refresh ({} since last full)",
                    self.refresh.partials()
                );
                self.display.init_partial()?;
                self.display.display_partial(&frame, frame.bounds())?;
            }
        }

        Ok(mode)
    }

    /// Fetches this cycle's data and draws it over the background.
    pub async fn compose<Tz>(&mut self, now: &DateTime<Tz>) -> FrameBuffer
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let (width, height) = self.display.dimensions();
        let mut frame =
            render::load_background(self.settings.background_path.as_deref(), width, height);

        let mut clock = String::new();
        if write!(clock, "{}", now.format(&self.settings.clock_format)).is_err() {
            log::warn!("invalid clock format {:?}", self.settings.clock_format);
            clock = now.format("%H:%M").to_string();
        }

        let departures = match self.source.departures().await {
            Ok(departures) => {
                self.departure_failures = 0;
                departures
            }
            Err(err) => {
                self.departure_failures += 1;
                log::warn!(
                    "failed to fetch departures ({} in a row): {}",
                    self.departure_failures,
                    err
                );
                Vec::new()
            }
        };

        let bikes = match self.source.bike_availability().await {
            Ok(bikes) => {
                self.bike_failures = 0;
                bikes
            }
            Err(err) => {
                self.bike_failures += 1;
                log::warn!(
                    "failed to fetch bike availability ({} in a row): {}",
                    self.bike_failures,
                    err
                );
                None
            }
        };

        let view = DashboardView {
            clock: &clock,
            departures: &departures,
            bikes,
        };
        render::render(&mut frame, &view, &self.settings.layout);

        frame
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use async_trait::async_trait;
    use chrono::{FixedOffset, Utc};

    use super::*;
    use crate::api::departures::DepartureSample;
    use crate::api::FetchError;
    use crate::display::Rect;

    struct ScriptedSource {
        departures: Option<Vec<DepartureSample>>,
        bikes: Option<Option<u32>>,
    }

    fn failure() -> FetchError {
        FetchError::Decode(serde_json::from_str::<u32>("{").unwrap_err())
    }

    #[async_trait(?Send)]
    impl DashboardSource for ScriptedSource {
        async fn departures(&mut self) -> Result<Vec<DepartureSample>, FetchError> {
            self.departures.clone().ok_or_else(failure)
        }

        async fn bike_availability(&mut self) -> Result<Option<u32>, FetchError> {
            self.bikes.ok_or_else(failure)
        }
    }

    #[derive(Debug, PartialEq)]
    enum Call {
        Init,
        InitPartial,
        Clear,
        Full,
        Partial(Rect),
        Sleep,
    }

    #[derive(Default)]
    struct RecordingDisplay {
        calls: Vec<Call>,
        ready_after: Cell<u32>,
        fail: bool,
        last_frame: Option<FrameBuffer>,
    }

    impl DisplayTransport for RecordingDisplay {
        fn is_ready(&self) -> bool {
            let remaining = self.ready_after.get();
            if remaining == 0 {
                return true;
            }
            self.ready_after.set(remaining - 1);
            false
        }

        fn init(&mut self) -> Result<(), DisplayError> {
            self.calls.push(Call::Init);
            Ok(())
        }

        fn init_partial(&mut self) -> Result<(), DisplayError> {
            self.calls.push(Call::InitPartial);
            Ok(())
        }

        fn clear(&mut self) -> Result<(), DisplayError> {
            self.calls.push(Call::Clear);
            Ok(())
        }

        fn display_full(&mut self, frame: &FrameBuffer) -> Result<(), DisplayError> {
            if self.fail {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "spi").into());
            }
            self.calls.push(Call::Full);
            self.last_frame = Some(frame.clone());
            Ok(())
        }

        fn display_partial(
            &mut self,
            frame: &FrameBuffer,
            region: Rect,
        ) -> Result<(), DisplayError> {
            if self.fail {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "spi").into());
            }
            self.calls.push(Call::Partial(region));
            self.last_frame = Some(frame.clone());
            Ok(())
        }

        fn sleep(&mut self) -> Result<(), DisplayError> {
            self.calls.push(Call::Sleep);
            Ok(())
        }

        fn dimensions(&self) -> (u32, u32) {
            (480, 800)
        }
    }

    fn settings(threshold: u32) -> PollSettings {
        PollSettings {
            poll_interval: Duration::from_millis(1),
            ready_poll_interval: Duration::from_millis(1),
            full_refresh_threshold: threshold,
            clock_format: "%H:%M".to_string(),
            background_path: None,
            layout: Layout::default(),
        }
    }

    fn working_source() -> ScriptedSource {
        ScriptedSource {
            departures: Some(vec![DepartureSample {
                direction: "Centrum".to_string(),
                times: vec!["12:05".to_string(), "12:11".to_string()],
            }]),
            bikes: Some(Some(3)),
        }
    }

    #[test]
    fn test_full_refresh_after_threshold() {
        let mut policy = RefreshPolicy::new(10);

        for _ in 0..11 {
            assert_eq!(policy.next_mode(), RefreshMode::Partial);
        }
        assert_eq!(policy.partials(), 11);

        assert_eq!(policy.next_mode(), RefreshMode::Full);
        assert_eq!(policy.partials(), 0);
        assert_eq!(policy.next_mode(), RefreshMode::Partial);
    }

    #[tokio::test]
    async fn test_cycles_alternate_refresh_modes() {
        let mut poll = PollLoop::new(working_source(), RecordingDisplay::default(), settings(2));
        let now = Utc::now();

        let mut modes = Vec::new();
        for _ in 0..5 {
            modes.push(poll.run_cycle(&now).await.unwrap());
        }

        assert_eq!(
            modes,
            vec![
                RefreshMode::Partial,
                RefreshMode::Partial,
                RefreshMode::Partial,
                RefreshMode::Full,
                RefreshMode::Partial,
            ]
        );
        assert_eq!(poll.display_mut().calls[0], Call::InitPartial);
        assert_eq!(
            poll.display_mut().calls[1],
            Call::Partial(Rect::new(0, 0, 480, 800))
        );
        assert_eq!(poll.display_mut().calls[6], Call::Init);
        assert_eq!(poll.display_mut().calls[7], Call::Full);
    }

    #[tokio::test]
    async fn test_failed_fetches_still_display() {
        let source = ScriptedSource {
            departures: None,
            bikes: None,
        };
        let mut poll = PollLoop::new(source, RecordingDisplay::default(), settings(10));
        let now = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .unwrap();

        assert_eq!(poll.run_cycle(&now).await.unwrap(), RefreshMode::Partial);
        let degraded = poll.display_mut().last_frame.clone().unwrap();
        assert!(degraded.ink_count() > 0);

        let mut healthy = PollLoop::new(working_source(), RecordingDisplay::default(), settings(10));
        healthy.run_cycle(&now).await.unwrap();
        let full = healthy.display_mut().last_frame.clone().unwrap();
        assert!(full.ink_count() > degraded.ink_count());
    }

    #[tokio::test]
    async fn test_display_error_stops_the_loop() {
        let display = RecordingDisplay {
            fail: true,
            ready_after: Cell::new(3),
            ..Default::default()
        };
        let mut poll = PollLoop::new(working_source(), display, settings(10));

        let err = poll.run().await.unwrap_err();

        assert!(matches!(err, DisplayError::Io(_)));
        assert_eq!(poll.display_mut().ready_after.get(), 0);
        assert_eq!(poll.display_mut().calls[..2], [Call::Init, Call::Clear]);
    }

    #[tokio::test]
    async fn test_shutdown_while_waiting_for_panel() {
        let display = RecordingDisplay {
            ready_after: Cell::new(u32::MAX),
            ..Default::default()
        };
        let mut poll = PollLoop::new(working_source(), display, settings(10));

        poll.run_until(sleep(Duration::from_millis(5))).await.unwrap();

        assert_eq!(
            poll.display_mut().calls,
            vec![Call::Init, Call::Clear, Call::Sleep]
        );
    }

    #[tokio::test]
    async fn test_shutdown_after_cycles() {
        let mut poll = PollLoop::new(working_source(), RecordingDisplay::default(), settings(10));

        poll.run_until(sleep(Duration::from_millis(20))).await.unwrap();

        let calls = &poll.display_mut().calls;
        assert_eq!(calls[..2], [Call::Init, Call::Clear]);
        assert!(calls.contains(&Call::InitPartial));
        assert_eq!(calls[calls.len() - 3..], [Call::Init, Call::Clear, Call::Sleep]);
    }

    #[tokio::test]
    async fn test_shutdown_clears_and_sleeps() {
        let mut display = RecordingDisplay::default();
        crate::display::shutdown(&mut display).unwrap();
        assert_eq!(display.calls, vec![Call::Init, Call::Clear, Call::Sleep]);
    }
}
