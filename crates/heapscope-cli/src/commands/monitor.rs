use heapscope_core::{ingest, reader};

pub fn run(
    transport: &str,
    total_heap: u64,
    interval_ms: u64,
    tick_rate: u32,
    on_reset: &str,
    window: usize,
) {
    let config = super::config_or_exit(total_heap, interval_ms, tick_rate, on_reset);
    let source = super::transport_or_exit(transport);

    let (tx, rx) = ingest::queue();
    let handle = match reader::spawn(source, tx) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Cannot start reader: {e}");
            std::process::exit(1);
        }
    };

    let mut app = crate::tui::app::App::new(transport, config, rx, handle, window);
    if let Err(e) = app.run() {
        eprintln!("TUI error: {e}");
        std::process::exit(1);
    }
    super::exit_on_fault(app.reader_exit());
}
