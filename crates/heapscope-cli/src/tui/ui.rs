//! TUI rendering.
//!
//! ┌──────────────────────────────────────────────────────────────┐
//! │  heapscope  /dev/ttyACM0   session 2   ● live   10ms          │
//! ├──────────────────────────────────────────┬───────────────────┤
//! │  Heap usage (%) vs heap operations       │  Latest sample    │
//! │                                          │  ops 98 (50/48)   │
//! ├──────────────────────────────────────────┤  usage 8.45%      │
//! │  Internal fragmentation vs allocations   │  free 120000 B    │
//! │                                          │  ...              │
//! ├─────────────────────┬────────────────────┤                   │
//! │  Largest free block │  Free blocks       │                   │
//! ├─────────────────────┴────────────────────┴───────────────────┤
//! │  status: device reset detected, session 2 started             │
//! ├──────────────────────────────────────────────────────────────┤
//! │  q quit   n new session   +/- interval   w window             │
//! └──────────────────────────────────────────────────────────────┘

use super::app::{
    App, free_block_count_y_bounds, internal_frag_y_bounds, max_free_block_y_bounds,
    plot_points, usage_y_bounds, x_bounds,
};
use heapscope_core::ReaderExit;
use ratatui::{prelude::*, widgets::*};

pub fn draw(f: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // title
            Constraint::Min(12),   // charts + readout
            Constraint::Length(1), // status
            Constraint::Length(1), // keys
        ])
        .split(f.area());

    draw_title(f, rows[0], app);
    draw_main(f, rows[1], app);
    draw_status(f, rows[2], app);
    draw_keys(f, rows[3]);
}

fn draw_title(f: &mut Frame, area: Rect, app: &App) {
    let (state, state_style) = match app.reader_exit() {
        None => ("● live".to_string(), Style::default().fg(Color::Green)),
        Some(ReaderExit::Fault(fault)) => (
            format!("✖ {fault}"),
            Style::default().bold().fg(Color::Red),
        ),
        Some(exit) => (format!("■ {exit}"), Style::default().fg(Color::Yellow)),
    };
    let window = match app.window() {
        Some(n) => format!("last {n}"),
        None => "all".to_string(),
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Line::from(vec![
            Span::styled(" heapscope ", Style::default().bold().fg(Color::Cyan)),
            Span::styled(app.transport(), Style::default().bold().fg(Color::Yellow)),
            Span::raw(format!("  session {}  ", app.series().session())),
            Span::styled(state, state_style),
            Span::styled(
                format!(
                    "  {}ms  window {window}  heap {} B ",
                    app.render_interval().as_millis(),
                    app.total_heap_bytes()
                ),
                Style::default().fg(Color::DarkGray),
            ),
        ]));

    let counts = Paragraph::new(Line::from(vec![
        Span::raw(format!(" lines {}", app.lines_read())),
        Span::raw(format!("   samples {}", app.samples_accepted())),
        Span::styled(
            format!("   rejected {}", app.lines_rejected()),
            if app.lines_rejected() > 0 {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            },
        ),
        Span::raw(format!("   queued {}", app.pending())),
        Span::raw(format!("   points {}", app.series().len())),
    ]))
    .block(block);
    f.render_widget(counts, area);
}

fn draw_main(f: &mut Frame, area: Rect, app: &App) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(40), Constraint::Length(38)])
        .split(area);

    let charts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ])
        .split(cols[0]);

    let external = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(charts[2]);

    draw_usage(f, charts[0], app);
    draw_internal_frag(f, charts[1], app);
    draw_max_free_block(f, external[0], app);
    draw_free_block_count(f, external[1], app);
    draw_readout(f, cols[1], app);
}

// ---------------------------------------------------------------------------
// Charts
// ---------------------------------------------------------------------------

fn draw_usage(f: &mut Frame, area: Rect, app: &App) {
    let series = app.series();
    let range = app.visible();
    let xs = &series.operation_index()[range.clone()];
    let data = plot_points(xs, series.heap_usage_pct()[range].iter().copied());
    let title = match series.heap_usage_pct().last() {
        Some(latest) => format!(" Heap usage {latest:.2}% "),
        None => " Heap usage ".to_string(),
    };
    draw_line_chart(
        f,
        area,
        Panel {
            title,
            x_title: "heap operations",
            color: Color::Cyan,
            x_bounds: x_bounds(xs),
            y_bounds: usage_y_bounds(),
        },
        &data,
    );
}

fn draw_internal_frag(f: &mut Frame, area: Rect, app: &App) {
    let series = app.series();
    let range = app.visible();
    let xs = &series.alloc_index()[range.clone()];
    let data = plot_points(xs, series.internal_frag()[range].iter().map(|&v| f64::from(v)));
    let latest = series.internal_frag().last().copied();
    let title = match latest {
        Some(bytes) => format!(" Internal fragmentation {bytes} B "),
        None => " Internal fragmentation ".to_string(),
    };
    draw_line_chart(
        f,
        area,
        Panel {
            title,
            x_title: "allocations",
            color: Color::Magenta,
            x_bounds: x_bounds(xs),
            y_bounds: internal_frag_y_bounds(latest),
        },
        &data,
    );
}

fn draw_max_free_block(f: &mut Frame, area: Rect, app: &App) {
    let series = app.series();
    let range = app.visible();
    let xs = &series.operation_index()[range.clone()];
    let data = plot_points(xs, series.max_free_block()[range].iter().map(|&v| f64::from(v)));
    draw_line_chart(
        f,
        area,
        Panel {
            title: format!(
                " Largest free block (max {} B) ",
                series.running_max_free_block()
            ),
            x_title: "heap operations",
            color: Color::Green,
            x_bounds: x_bounds(xs),
            y_bounds: max_free_block_y_bounds(series.running_max_free_block()),
        },
        &data,
    );
}

fn draw_free_block_count(f: &mut Frame, area: Rect, app: &App) {
    let series = app.series();
    let range = app.visible();
    let xs = &series.operation_index()[range.clone()];
    let counts = &series.free_block_count()[range];
    let data = plot_points(xs, counts.iter().map(|&v| f64::from(v)));
    draw_line_chart(
        f,
        area,
        Panel {
            title: " Free blocks ".to_string(),
            x_title: "heap operations",
            color: Color::Yellow,
            x_bounds: x_bounds(xs),
            y_bounds: free_block_count_y_bounds(counts),
        },
        &data,
    );
}

struct Panel {
    title: String,
    x_title: &'static str,
    color: Color,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
}

fn draw_line_chart(f: &mut Frame, area: Rect, panel: Panel, data: &[(f64, f64)]) {
    let block = Block::default().borders(Borders::ALL).title(panel.title);

    if data.is_empty() {
        let p = Paragraph::new("waiting for samples…")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(p, area);
        return;
    }

    let datasets = vec![
        Dataset::default()
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(panel.color))
            .data(data),
    ];

    let [x_min, x_max] = panel.x_bounds;
    let [y_min, y_max] = panel.y_bounds;
    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(
            Axis::default()
                .title(panel.x_title)
                .style(Style::default().fg(Color::DarkGray))
                .bounds(panel.x_bounds)
                .labels(vec![
                    Line::from(format!("{x_min:.0}")),
                    Line::from(format!("{x_max:.0}")),
                ]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::DarkGray))
                .bounds(panel.y_bounds)
                .labels(vec![
                    Line::from(format!("{y_min:.0}")),
                    Line::from(format!("{y_max:.0}")),
                ]),
        );

    f.render_widget(chart, area);
}

// ---------------------------------------------------------------------------
// Readout
// ---------------------------------------------------------------------------

fn row(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!(" {label:<16}"), Style::default().fg(Color::DarkGray)),
        Span::raw(value),
    ])
}

fn draw_readout(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Latest sample ");

    let Some(s) = app.latest() else {
        let p = Paragraph::new("no samples yet")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(p, area);
        return;
    };

    let lines = vec![
        row(
            "Heap operations",
            format!(
                "{} ({} / {})",
                s.operation_count(),
                s.successful_alloc_total,
                s.successful_free_total
            ),
        ),
        row("Active tasks", s.active_task_count.to_string()),
        row(
            "Heap usage",
            format!("{:.2}%", s.heap_usage_pct(app.total_heap_bytes())),
        ),
        row("Free space", format!("{} B", s.free_space_bytes)),
        row(
            "Internal frag",
            format!("{} B", s.internal_fragmentation_bytes),
        ),
        row("Largest block", format!("{} B", s.max_free_block_bytes)),
        row("Smallest block", format!("{} B", s.min_free_block_bytes)),
        row("Free blocks", s.free_block_count.to_string()),
        row("Min ever free", format!("{} B", s.minimum_ever_free_bytes)),
        Line::from(""),
        row(
            "Alloc latency",
            format!("{} us / {} ops", s.alloc_time_us_window, s.alloc_count_window),
        ),
        row(
            "Free latency",
            format!("{} us / {} ops", s.free_time_us_window, s.free_count_window),
        ),
        Line::from(""),
        row(
            "Uptime",
            format!("{:.2} s", s.uptime_secs(app.tick_rate_hz())),
        ),
        row("Ticks", s.ticks.to_string()),
    ];

    f.render_widget(Paragraph::new(lines).block(block), area);
}

// ---------------------------------------------------------------------------
// Status + keys
// ---------------------------------------------------------------------------

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let line = if let Some(status) = app.status() {
        Line::from(Span::styled(
            format!(" {status}"),
            Style::default().fg(Color::Yellow),
        ))
    } else if let Some(err) = app.last_decode_error() {
        Line::from(Span::styled(
            format!(" last rejected: {err}"),
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Line::from("")
    };
    f.render_widget(Paragraph::new(line), area);
}

fn draw_keys(f: &mut Frame, area: Rect) {
    let bar = Paragraph::new(" q quit   n new session   +/- render interval   w scrolling window")
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(bar, area);
}
