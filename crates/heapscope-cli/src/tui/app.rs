//! TUI application state and event loop.
//!
//! The reader thread fills the ingestion queue; this loop owns the
//! [`Aggregator`] and ticks it on the render interval, so draining,
//! aggregation and drawing all happen on the UI thread. Drawing only reads
//! the series snapshot.

use std::io;
use std::ops::Range;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;

use heapscope_core::{
    Aggregator, DecodeError, LineReceiver, MonitorConfig, ReaderExit, ReaderHandle, Sample,
    SeriesModel, SessionEvent, TickReport,
};

/// Points shown when the scrolling window is switched on without `--window`.
pub const DEFAULT_WINDOW: usize = 600;

const MIN_INTERVAL: Duration = Duration::from_millis(1);
const MAX_INTERVAL: Duration = Duration::from_secs(1);
const MAX_EVENT_WAIT: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Chart geometry
// ---------------------------------------------------------------------------

/// Index range of the last `window` points, or everything.
pub fn visible_range(len: usize, window: Option<usize>) -> Range<usize> {
    match window {
        Some(n) => len.saturating_sub(n)..len,
        None => 0..len,
    }
}

/// Zip an index series with a value series into chart points.
pub fn plot_points<I>(xs: &[u64], ys: I) -> Vec<(f64, f64)>
where
    I: IntoIterator<Item = f64>,
{
    xs.iter().map(|&x| x as f64).zip(ys).collect()
}

/// X axis spans the smallest to the largest visible index value.
///
/// The index is normally increasing, but restarts after a device reset when
/// the session is kept. A single point (or a flat index) gets a unit-wide
/// axis so the chart still has a non-degenerate range.
pub fn x_bounds(xs: &[u64]) -> [f64; 2] {
    match (xs.iter().min(), xs.iter().max()) {
        (Some(&lo), Some(&hi)) if hi > lo => [lo as f64, hi as f64],
        (Some(&lo), _) => [lo as f64, lo as f64 + 1.0],
        _ => [0.0, 1.0],
    }
}

pub fn usage_y_bounds() -> [f64; 2] {
    [0.0, 100.0]
}

/// Internal fragmentation: headroom above the latest value.
pub fn internal_frag_y_bounds(latest: Option<u32>) -> [f64; 2] {
    [0.0, f64::from(latest.unwrap_or(0)) + 2000.0]
}

/// Largest free block: headroom above the running maximum.
pub fn max_free_block_y_bounds(running_max: u32) -> [f64; 2] {
    [0.0, f64::from(running_max) + 2000.0]
}

/// Free block count: a little headroom above the visible maximum.
pub fn free_block_count_y_bounds(counts: &[u32]) -> [f64; 2] {
    let max = counts.iter().copied().max().unwrap_or(0);
    [0.0, f64::from(max) + 2.0]
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct App {
    transport: String,
    config: MonitorConfig,
    aggregator: Aggregator,
    queue: LineReceiver,
    reader: ReaderHandle,
    reader_exit: Option<ReaderExit>,
    running: bool,
    window_len: usize,
    windowed: bool,
    /// Last session-level message shown in the status line.
    status: Option<String>,
}

impl App {
    pub fn new(
        transport: &str,
        config: MonitorConfig,
        queue: LineReceiver,
        reader: ReaderHandle,
        window: usize,
    ) -> Self {
        let aggregator = Aggregator::new(config.total_heap_bytes, config.regression_policy);
        Self {
            transport: transport.to_string(),
            config,
            aggregator,
            queue,
            reader,
            reader_exit: None,
            running: true,
            window_len: if window == 0 { DEFAULT_WINDOW } else { window },
            windowed: window > 0,
            status: None,
        }
    }

    pub fn run(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
            original_hook(info);
        }));

        let result = self.run_loop(&mut terminal);

        // Reader first: it may be parked in a blocking read and is left to
        // finish on its own once the handle is dropped.
        self.reader.request_stop();

        let _ = std::panic::take_hook();
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            crossterm::cursor::Show
        )?;

        if let Some(ReaderExit::Fault(fault)) = &self.reader_exit {
            eprintln!("Transport fault: {fault}");
        }
        result
    }

    fn run_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> io::Result<()> {
        let mut last_tick = Instant::now();

        while self.running {
            terminal.draw(|f| super::ui::draw(f, self))?;

            let wait = self
                .config
                .render_interval
                .saturating_sub(last_tick.elapsed())
                .min(MAX_EVENT_WAIT);
            if event::poll(wait)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code);
                    }
                }
            }

            if last_tick.elapsed() >= self.config.render_interval {
                self.tick();
                last_tick = Instant::now();
            }
        }

        Ok(())
    }

    /// One aggregation pass: drain the queue, fold it in, check the reader.
    pub fn tick(&mut self) -> TickReport {
        let report = self.aggregator.tick(&self.queue);

        for event in &report.events {
            let SessionEvent::CounterRegression {
                session,
                started_new_session,
                ..
            } = event;
            self.status = Some(if *started_new_session {
                format!("device reset detected, session {session} started")
            } else {
                format!("device reset detected, counters restarted in session {session}")
            });
        }

        if self.reader_exit.is_none() {
            self.reader_exit = self.reader.poll_exit().cloned();
        }
        report
    }

    fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Char('n') => {
                let session = self.aggregator.start_new_session();
                self.status = Some(format!("session {session} started by hand"));
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.config.render_interval = (self.config.render_interval / 2).max(MIN_INTERVAL);
            }
            KeyCode::Char('-') => {
                self.config.render_interval = (self.config.render_interval * 2).min(MAX_INTERVAL);
            }
            KeyCode::Char('w') => self.windowed = !self.windowed,
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Accessors for the UI
    // -----------------------------------------------------------------------

    pub fn transport(&self) -> &str {
        &self.transport
    }

    pub fn series(&self) -> &SeriesModel {
        self.aggregator.series()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.aggregator.latest()
    }

    pub fn total_heap_bytes(&self) -> u64 {
        self.config.total_heap_bytes
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    pub fn render_interval(&self) -> Duration {
        self.config.render_interval
    }

    pub fn reader_exit(&self) -> Option<&ReaderExit> {
        self.reader_exit.as_ref()
    }

    pub fn lines_read(&self) -> u64 {
        self.reader.lines_read()
    }

    /// Lines waiting in the queue; grows when ticks fall behind the device.
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    pub fn samples_accepted(&self) -> u64 {
        self.aggregator.samples_accepted()
    }

    pub fn lines_rejected(&self) -> u64 {
        self.aggregator.lines_rejected()
    }

    pub fn last_decode_error(&self) -> Option<&DecodeError> {
        self.aggregator.last_decode_error()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Window size in effect, if the scrolling window is on.
    pub fn window(&self) -> Option<usize> {
        self.windowed.then_some(self.window_len)
    }

    /// Range of series indices currently on screen.
    pub fn visible(&self) -> Range<usize> {
        visible_range(self.series().len(), self.window())
    }
}
