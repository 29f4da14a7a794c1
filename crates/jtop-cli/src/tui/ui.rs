//! TUI rendering.
//!
//! ┌──────────────────────────────────────────────────────────┐
//! │ jtop - PLEASE RUN WITH SUDO                              │
//! │ NVIDIA Jetson Nano - Jetpack 4.4 [L4T 32.4.3]            │
//! │ CPU0 12% 102MHz ━━━━━──────────────────────────────────  │
//! │ CPU1 off                                                 │
//! │ RAM 2262/3956MB  ━━━━━━━━━━━━━━━━━━━━━━──────────────────  │
//! │ ┌ metrics #42 ──────────────────────────────────────────┐│
//! │ │ EMC_FREQ        0%                                    ││
//! │ └───────────────────────────────────────────────────────┘│
//! │ 0 ALL | 1 GPU | 2 INFO               ←/→ page  0-9  q quit│
//! └──────────────────────────────────────────────────────────┘

use ratatui::{prelude::*, widgets::*};

use jtop_core::{BoardInfo, Metric, Snapshot, Switch};

use super::pages::{PageContext, Pages};

/// Static header content, fixed for a run except for the ended flag.
pub struct Header<'a> {
    pub privileged: bool,
    pub board: &'a BoardInfo,
    pub telemetry_ended: bool,
}

pub fn draw(f: &mut Frame, header: &Header, pages: &Pages, ctx: &PageContext) {
    f.render_widget(Clear, f.area());

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // header
            Constraint::Min(3),    // page
            Constraint::Length(1), // tabs + keys
        ])
        .split(f.area());

    draw_header(f, rows[0], header);
    pages.render(f, rows[1], ctx);
    draw_footer(f, rows[2], pages);
}

fn draw_header(f: &mut Frame, area: Rect, header: &Header) {
    let mut title = vec![Span::styled("jtop", Style::default().bold())];
    if !header.privileged {
        title.push(Span::raw(" "));
        title.push(Span::styled(
            "- PLEASE RUN WITH SUDO",
            Style::default().fg(Color::Red),
        ));
    }
    if header.telemetry_ended {
        title.push(Span::styled(
            "  telemetry ended - press q to quit",
            Style::default().bold().fg(Color::Yellow),
        ));
    }

    let board = match header.board.summary() {
        Some(summary) => Line::from(Span::styled(summary, Style::default().bold())),
        None => Line::from(Span::styled(
            "board information unavailable",
            Style::default().fg(Color::DarkGray),
        )),
    };

    f.render_widget(Paragraph::new(vec![Line::from(title), board]), area);
}

fn draw_footer(f: &mut Frame, area: Rect, pages: &Pages) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(20), Constraint::Length(30)])
        .split(area);

    let titles = pages
        .pages()
        .iter()
        .map(|p| format!("{} {}", p.index(), p.name()));
    let tabs = Tabs::new(titles)
        .select(pages.index())
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().bold().fg(Color::Black).bg(Color::Cyan))
        .divider("|");
    f.render_widget(tabs, cols[0]);

    let keys = Paragraph::new("←/→ page  0-9 jump  q quit")
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Right);
    f.render_widget(keys, cols[1]);
}

fn draw_waiting(f: &mut Frame, area: Rect, title: &str) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {title} "));
    let p = Paragraph::new("waiting for data...")
        .style(Style::default().fg(Color::DarkGray))
        .block(block);
    f.render_widget(p, area);
}

fn load_color(pct: f64) -> Color {
    if pct >= 80.0 {
        Color::Red
    } else if pct >= 50.0 {
        Color::Yellow
    } else {
        Color::Green
    }
}

fn ratio(value: f64, max: f64) -> f64 {
    if max > 0.0 {
        (value / max).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// ALL
// ---------------------------------------------------------------------------

pub fn draw_all_page(f: &mut Frame, area: Rect, ctx: &PageContext) {
    let Some(snapshot) = ctx.snapshot else {
        draw_waiting(f, area, "ALL");
        return;
    };

    let cores = cpu_cores(snapshot);
    let mut constraints = vec![Constraint::Length(1); cores.len() + 2];
    constraints.push(Constraint::Min(3));
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    for (row, (core, metric)) in cores.iter().enumerate() {
        let freq = snapshot.get(&format!("CPU.{core}.freq"));
        draw_core(f, rows[row], *core, metric, freq);
    }
    draw_memory(f, rows[cores.len()], snapshot, "RAM");
    draw_memory(f, rows[cores.len() + 1], snapshot, "SWAP");
    draw_metric_table(f, rows[cores.len() + 2], snapshot);
}

/// CPU cores in numeric order (`CPU.10` after `CPU.9`).
fn cpu_cores(snapshot: &Snapshot) -> Vec<(usize, Metric)> {
    let mut cores: Vec<(usize, Metric)> = snapshot
        .children("CPU")
        .filter_map(|(child, metric)| child.parse().ok().map(|i| (i, *metric)))
        .collect();
    cores.sort_by_key(|(i, _)| *i);
    cores
}

fn draw_core(f: &mut Frame, area: Rect, core: usize, metric: &Metric, freq: Option<&Metric>) {
    match (metric, metric.as_f64()) {
        (_, Some(pct)) => {
            let freq = freq.map(|m| format!(" {m}")).unwrap_or_default();
            let gauge = LineGauge::default()
                .ratio(ratio(pct, 100.0))
                .label(format!("CPU{core} {metric}{freq}"))
                .filled_style(Style::default().fg(load_color(pct)))
                .line_set(symbols::line::THICK);
            f.render_widget(gauge, area);
        }
        (Metric::State(Switch::Off), _) => {
            let p = Paragraph::new(format!("CPU{core} off")).style(Style::default().fg(Color::DarkGray));
            f.render_widget(p, area);
        }
        _ => f.render_widget(Paragraph::new(format!("CPU{core} {metric}")), area),
    }
}

fn draw_memory(f: &mut Frame, area: Rect, snapshot: &Snapshot, key: &str) {
    let used = snapshot.value(key);
    let total = snapshot.get(&format!("{key}.total"));
    match (used, total.and_then(Metric::as_f64), total) {
        (Some(used), Some(max), Some(total)) => {
            let r = ratio(used, max);
            let gauge = LineGauge::default()
                .ratio(r)
                .label(format!("{key} {used:.0}/{total}"))
                .filled_style(Style::default().fg(load_color(r * 100.0)))
                .line_set(symbols::line::THICK);
            f.render_widget(gauge, area);
        }
        _ => {
            let p = Paragraph::new(format!("{key} ?")).style(Style::default().fg(Color::DarkGray));
            f.render_widget(p, area);
        }
    }
}

fn draw_metric_table(f: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let rows: Vec<Row> = snapshot
        .fields()
        .iter()
        .map(|(name, metric)| {
            let style = if metric.is_known() {
                Style::default()
            } else {
                Style::default().fg(Color::DarkGray)
            };
            Row::new(vec![name.clone(), metric.to_string()]).style(style)
        })
        .collect();

    let table = Table::new(rows, [Constraint::Length(24), Constraint::Min(8)]).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" metrics #{} ", snapshot.sequence())),
    );
    f.render_widget(table, area);
}

// ---------------------------------------------------------------------------
// GPU
// ---------------------------------------------------------------------------

pub fn draw_gpu_page(f: &mut Frame, area: Rect, ctx: &PageContext) {
    let Some(snapshot) = ctx.snapshot else {
        draw_waiting(f, area, "GPU");
        return;
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // GPU load
            Constraint::Length(3), // memory controller
            Constraint::Min(3),    // thermals
        ])
        .split(area);

    draw_load_gauge(f, rows[0], snapshot, "GPU", "GR3D_FREQ");
    draw_load_gauge(f, rows[1], snapshot, "EMC", "EMC_FREQ");
    draw_thermals(f, rows[2], snapshot);
}

fn draw_load_gauge(f: &mut Frame, area: Rect, snapshot: &Snapshot, title: &str, key: &str) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {title} "));

    let Some(pct) = snapshot.value(key) else {
        let p = Paragraph::new(format!("{key} ?"))
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(p, area);
        return;
    };

    let freq = snapshot
        .get(&format!("{key}.freq"))
        .map(|m| format!(" @ {m}"))
        .unwrap_or_default();
    let gauge = Gauge::default()
        .block(block)
        .gauge_style(Style::default().fg(load_color(pct)))
        .ratio(ratio(pct, 100.0))
        .label(format!("{pct:.0}%{freq}"));
    f.render_widget(gauge, area);
}

fn draw_thermals(f: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let block = Block::default().borders(Borders::ALL).title(" Thermals ");
    let rows: Vec<Row> = snapshot
        .children(jtop_core::snapshot::THERMAL_PREFIX)
        .map(|(sensor, metric)| {
            let color = match metric.as_f64() {
                Some(t) if t >= 80.0 => Color::Red,
                Some(t) if t >= 60.0 => Color::Yellow,
                Some(_) => Color::Green,
                None => Color::DarkGray,
            };
            Row::new(vec![
                Cell::from(sensor.to_string()),
                Cell::from(metric.to_string()).style(Style::default().fg(color)),
            ])
        })
        .collect();

    if rows.is_empty() {
        let p = Paragraph::new("no thermal sensors reported")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(p, area);
        return;
    }

    let table = Table::new(rows, [Constraint::Length(16), Constraint::Min(8)]).block(block);
    f.render_widget(table, area);
}

// ---------------------------------------------------------------------------
// INFO
// ---------------------------------------------------------------------------

pub fn draw_info_page(f: &mut Frame, area: Rect, ctx: &PageContext) {
    let heading = Style::default().bold().fg(Color::Cyan);
    let mut lines = vec![Line::from(Span::styled("Board", heading))];

    if ctx.board.is_empty() {
        lines.push(Line::from(Span::styled(
            "  no board variables",
            Style::default().fg(Color::DarkGray),
        )));
    } else {
        for (key, value) in ctx.board.iter() {
            lines.push(Line::from(vec![
                Span::styled(format!("  {key}: "), Style::default().bold()),
                Span::raw(value),
            ]));
        }
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled("Telemetry", heading)));
    lines.push(Line::from(format!("  reader: {}", ctx.reader_state)));
    lines.push(Line::from(format!(
        "  readings: {}  dropped: {}",
        ctx.stats.published, ctx.stats.dropped
    )));
    lines.push(match ctx.snapshot {
        Some(s) => Line::from(format!(
            "  last reading: #{} ({} metrics)",
            s.sequence(),
            s.len()
        )),
        None => Line::from(Span::styled(
            "  waiting for data...",
            Style::default().fg(Color::DarkGray),
        )),
    });

    let block = Block::default().borders(Borders::ALL).title(" INFO ");
    let p = Paragraph::new(lines).wrap(Wrap { trim: false }).block(block);
    f.render_widget(p, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tui::pages::PageKind;
    use jtop_core::{ReaderState, ReaderStats, SnapshotParser, board};
    use ratatui::backend::TestBackend;
    use ratatui::buffer::Buffer;

    const LINE: &str = "RAM 2262/3956MB (lfb 2x4MB) SWAP 0/1978MB (cached 0MB) \
        CPU [12%@102,off,5%@204,7%@307] EMC_FREQ 3% GR3D_FREQ 45%@76 CPU@26C GPU@24.5C";

    fn snapshot() -> Snapshot {
        Snapshot::new(42, SnapshotParser::tegrastats().parse(LINE).unwrap())
    }

    fn buffer_text(buffer: &Buffer) -> String {
        buffer
            .content
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|c| c.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render(page: usize, snapshot: Option<&Snapshot>, header: &Header) -> String {
        let mut pages = Pages::new(&PageKind::STANDARD).unwrap();
        pages.set(page).unwrap();
        let ctx = PageContext {
            snapshot,
            board: header.board,
            reader_state: ReaderState::Running,
            stats: ReaderStats {
                published: 42,
                dropped: 2,
            },
        };
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| draw(f, header, &pages, &ctx)).unwrap();
        buffer_text(terminal.backend().buffer())
    }

    fn header(board: &BoardInfo) -> Header<'_> {
        Header {
            privileged: true,
            board,
            telemetry_ended: false,
        }
    }

    #[test]
    fn every_page_waits_for_data() {
        let board = BoardInfo::default();
        for page in 0..PageKind::STANDARD.len() {
            let text = render(page, None, &header(&board));
            assert!(text.contains("waiting for data"), "page {page}:\n{text}");
        }
    }

    #[test]
    fn header_warns_when_not_privileged() {
        let board = BoardInfo::default();
        let mut h = header(&board);
        assert!(!render(0, None, &h).contains("PLEASE RUN WITH SUDO"));
        h.privileged = false;
        assert!(render(0, None, &h).contains("jtop - PLEASE RUN WITH SUDO"));
    }

    #[test]
    fn header_shows_board_line() {
        let board = BoardInfo::from_pairs([
            (board::DESCRIPTION, "NVIDIA Jetson Nano"),
            (board::JETPACK, "4.4"),
            (board::L4T, "32.4.3"),
        ]);
        let text = render(0, None, &header(&board));
        assert!(text.contains("NVIDIA Jetson Nano - Jetpack 4.4 [L4T 32.4.3]"));

        let empty = BoardInfo::default();
        assert!(render(0, None, &header(&empty)).contains("board information unavailable"));
    }

    #[test]
    fn header_flags_ended_telemetry() {
        let board = BoardInfo::default();
        let mut h = header(&board);
        h.telemetry_ended = true;
        assert!(render(0, None, &h).contains("telemetry ended - press q to quit"));
    }

    #[test]
    fn footer_lists_pages() {
        let board = BoardInfo::default();
        let text = render(1, None, &header(&board));
        assert!(text.contains("0 ALL"));
        assert!(text.contains("1 GPU"));
        assert!(text.contains("2 INFO"));
        assert!(text.contains("q quit"));
    }

    #[test]
    fn all_page_shows_cores_memory_and_metrics() {
        let board = BoardInfo::default();
        let s = snapshot();
        let text = render(0, Some(&s), &header(&board));
        assert!(text.contains("CPU0 12% 102MHz"), "{text}");
        assert!(text.contains("CPU1 off"));
        assert!(text.contains("CPU3 7% 307MHz"));
        assert!(text.contains("RAM 2262/3956MB"));
        assert!(text.contains("SWAP 0/1978MB"));
        assert!(text.contains("metrics #42"));
        assert!(text.contains("EMC_FREQ"));
    }

    #[test]
    fn gpu_page_shows_load_and_thermals() {
        let board = BoardInfo::default();
        let s = snapshot();
        let text = render(1, Some(&s), &header(&board));
        assert!(text.contains("45% @ 76MHz"), "{text}");
        assert!(text.contains("3%"));
        assert!(text.contains("Thermals"));
        assert!(text.contains("26C"));
        assert!(text.contains("24.5C"));
    }

    #[test]
    fn info_page_shows_board_and_counters() {
        let board = BoardInfo::from_pairs([(board::L4T, "32.4.3")]);
        let s = snapshot();
        let text = render(2, Some(&s), &header(&board));
        assert!(text.contains("JETSON_L4T: 32.4.3"));
        assert!(text.contains("reader: running"));
        assert!(text.contains("readings: 42  dropped: 2"));
        assert!(text.contains("last reading: #42"));
    }

    #[test]
    fn unknown_fields_render_as_placeholders() {
        let board = BoardInfo::default();
        let s = Snapshot::new(1, SnapshotParser::tegrastats().parse("APE 25").unwrap());
        let all = render(0, Some(&s), &header(&board));
        assert!(all.contains("RAM ?"));
        let gpu = render(1, Some(&s), &header(&board));
        assert!(gpu.contains("GR3D_FREQ ?"));
        assert!(gpu.contains("no thermal sensors reported"));
    }
}
