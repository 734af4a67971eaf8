use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use heapscope_core::{
    Aggregator, MonitorConfig, ReaderExit, ReaderHandle, SessionEvent, TickReport, ingest,
    reader,
};

pub fn run(transport: &str, total_heap: u64, interval_ms: u64, on_reset: &str, json: bool) {
    let config = super::config_or_exit(
        total_heap,
        interval_ms,
        heapscope_core::DEFAULT_TICK_RATE_HZ,
        on_reset,
    );
    let source = super::transport_or_exit(transport);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Error setting Ctrl+C handler: {e}");
        std::process::exit(1);
    }

    let (tx, rx) = ingest::queue();
    let mut handle = match reader::spawn(source, tx) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Cannot start reader: {e}");
            std::process::exit(1);
        }
    };

    // Status goes to stderr so `--json` output stays machine-readable.
    eprintln!("Reading {transport}  (heap {} bytes, Ctrl+C to stop)", config.total_heap_bytes);

    let mut aggregator = Aggregator::new(config.total_heap_bytes, config.regression_policy);
    let exit = ingest_until_done(&mut aggregator, &rx, &mut handle, &config, &running);

    match &exit {
        Some(exit) => eprintln!("Reader finished: {exit}"),
        None => eprintln!("Interrupted after {} lines", handle.lines_read()),
    }

    let summary = aggregator.summary();
    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Cannot serialize summary: {e}");
                std::process::exit(1);
            }
        }
    } else {
        println!();
        print!("{summary}");
    }

    super::exit_on_fault(exit.as_ref());
}

/// Tick the aggregator until the reader exits or `running` is cleared.
///
/// Returns the reader's exit reason, or `None` when interrupted. Lines queued
/// before either event are always drained.
fn ingest_until_done(
    aggregator: &mut Aggregator,
    rx: &ingest::LineReceiver,
    handle: &mut ReaderHandle,
    config: &MonitorConfig,
    running: &AtomicBool,
) -> Option<ReaderExit> {
    loop {
        report_events(&aggregator.tick(rx));

        if let Some(exit) = handle.poll_exit().cloned() {
            report_events(&aggregator.tick(rx));
            return Some(exit);
        }
        if !running.load(Ordering::SeqCst) {
            handle.request_stop();
            report_events(&aggregator.tick(rx));
            return None;
        }
        std::thread::sleep(config.render_interval);
    }
}

fn report_events(report: &TickReport) {
    for event in &report.events {
        eprintln!("{}", describe_event(event));
    }
}

fn describe_event(event: &SessionEvent) -> String {
    let SessionEvent::CounterRegression {
        session,
        started_new_session,
        ..
    } = event;
    if *started_new_session {
        format!("Device reset detected, now on session {session}")
    } else {
        format!("Device reset detected, continuing session {session}")
    }
}
