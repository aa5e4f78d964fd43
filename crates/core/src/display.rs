//! Live quote display.
//!
//! Renders the evolving candidate table in place (the block is erased and
//! redrawn on each batch, never scrolled) and waits for the user's verdict.
//! The batch stream and the keyboard are composed with a `select!`; both
//! suspend cooperatively on the one event loop. Without a TTY the display
//! degrades to a single summary line and auto-accepts the first winner.

use std::io::{self, Write};

use crossterm::cursor;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::{self, Stylize};
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::tty::IsTty;
use crossterm::QueueableCommand;
use futures::StreamExt;
use titanswap_wire::{Quote, QuoteBatch, QuoteStream, WireError};
use tracing::{debug, info};

use crate::amounts;
use crate::error::SwapError;

const PROVIDER_WIDTH: usize = 10;
const ROUTE_WIDTH: usize = 26;

/// Formatting context for both sides of the pair.
#[derive(Debug, Clone)]
pub struct DisplayContext {
    pub input_symbol: String,
    pub output_symbol: String,
    pub input_decimals: u8,
    pub output_decimals: u8,
}

/// Drive the display until the user confirms or cancels.
///
/// Returns the winning quote on Enter, `None` on cancel. Either way the
/// stream is cancelled before returning, so no further batches flow.
pub(crate) async fn confirm_quote(
    stream: &mut QuoteStream,
    ctx: &DisplayContext,
) -> Result<Option<Quote>, SwapError> {
    if io::stdout().is_tty() {
        match RawMode::enable() {
            Ok(guard) => return confirm_interactive(stream, ctx, guard).await,
            Err(err) => {
                debug!(error = %err, "raw mode unavailable; degrading to summary output");
            }
        }
    }
    confirm_headless(stream, ctx).await
}

enum Verdict {
    Confirm,
    Cancel,
    Failed(SwapError),
}

async fn confirm_interactive(
    stream: &mut QuoteStream,
    ctx: &DisplayContext,
    raw: RawMode,
) -> Result<Option<Quote>, SwapError> {
    let mut events = EventStream::new();
    let mut stdout = io::stdout();
    let mut rendered_lines: u16 = 0;
    let mut latest = QuoteBatch::default();
    let mut best: Option<Quote> = None;
    let mut stream_done = false;

    let verdict = loop {
        tokio::select! {
            batch = stream.next_batch(), if !stream_done => match batch {
                Ok(Some(batch)) => {
                    if batch.has_usable_quotes() {
                        best = batch.best().cloned();
                        latest = batch;
                    } else if best.is_none() {
                        latest = batch;
                    }
                    if let Err(err) = redraw(&mut stdout, &mut rendered_lines, &latest, best.as_ref(), ctx) {
                        debug!(error = %err, "table redraw failed");
                    }
                }
                // The server closed the stream; the table freezes but the
                // user still decides.
                Ok(None) => stream_done = true,
                Err(WireError::NoQuotes) => break Verdict::Failed(SwapError::NoQuotes),
                Err(err) => break Verdict::Failed(err.into()),
            },
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    if confirms(&key) && best.is_some() {
                        break Verdict::Confirm;
                    }
                    if cancels(&key) {
                        break Verdict::Cancel;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => debug!(error = %err, "keyboard read failed"),
                None => break Verdict::Cancel,
            },
        }
    };

    stream.cancel().await;
    drop(raw);

    match verdict {
        Verdict::Confirm => {
            if let Some(quote) = &best {
                println!("{}", summary_line(quote, ctx));
            }
            Ok(best)
        }
        Verdict::Cancel => {
            info!("quote stream cancelled by the user");
            Ok(None)
        }
        Verdict::Failed(err) => Err(err),
    }
}

/// No TTY: consume until the first usable batch and accept its winner,
/// emitting one summary line for the enclosing process to capture.
async fn confirm_headless(
    stream: &mut QuoteStream,
    ctx: &DisplayContext,
) -> Result<Option<Quote>, SwapError> {
    info!("stdout is not a tty; accepting the first usable batch");
    loop {
        match stream.next_batch().await {
            Ok(Some(batch)) if batch.has_usable_quotes() => {
                let best = stream.best().cloned();
                stream.cancel().await;
                if let Some(quote) = &best {
                    println!("{}", summary_line(quote, ctx));
                }
                return Ok(best);
            }
            Ok(Some(_)) => continue,
            Ok(None) => return Err(SwapError::NoQuotes),
            Err(WireError::NoQuotes) => return Err(SwapError::NoQuotes),
            Err(err) => return Err(err.into()),
        }
    }
}

fn confirms(key: &KeyEvent) -> bool {
    key.code == KeyCode::Enter
}

fn cancels(key: &KeyEvent) -> bool {
    key.code == KeyCode::Esc
        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
}

/// Raw-mode guard; the terminal is restored on every exit path.
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

fn redraw(
    stdout: &mut io::Stdout,
    rendered_lines: &mut u16,
    batch: &QuoteBatch,
    best: Option<&Quote>,
    ctx: &DisplayContext,
) -> io::Result<()> {
    let (lines, starred) = render_lines(batch, best, ctx);
    stdout.queue(cursor::MoveToColumn(0))?;
    if *rendered_lines > 0 {
        stdout.queue(cursor::MoveUp(*rendered_lines))?;
    }
    stdout.queue(Clear(ClearType::FromCursorDown))?;
    for (index, line) in lines.iter().enumerate() {
        if Some(index) == starred {
            stdout.queue(style::PrintStyledContent(line.clone().bold().green()))?;
        } else {
            stdout.queue(style::Print(line))?;
        }
        stdout.queue(style::Print("\r\n"))?;
    }
    *rendered_lines = lines.len() as u16;
    stdout.flush()
}

/// Build the fixed-geometry table. Returns the lines and the index of the
/// starred (winning) row, if any.
fn render_lines(
    batch: &QuoteBatch,
    best: Option<&Quote>,
    ctx: &DisplayContext,
) -> (Vec<String>, Option<usize>) {
    let mut lines = vec![format!(
        "  {:<provider$} {:<route$} {:>14} {:>14} {:>12}",
        "PROVIDER",
        "ROUTE",
        format!("IN ({})", ctx.input_symbol),
        format!("OUT ({})", ctx.output_symbol),
        "RATE",
        provider = PROVIDER_WIDTH,
        route = ROUTE_WIDTH,
    )];
    let mut starred = None;

    for quote in &batch.quotes {
        let is_best = best.is_some_and(|winner| winner.provider_id == quote.provider_id);
        if is_best {
            starred = Some(lines.len());
        }
        let marker = if is_best { "★" } else { " " };
        lines.push(format!(
            "{marker} {:<provider$} {:<route$} {:>14} {:>14} {:>12.6}",
            truncate(&quote.provider_id, PROVIDER_WIDTH),
            truncate(&quote.route.join("→"), ROUTE_WIDTH),
            amounts::format_base_units(quote.in_amount, ctx.input_decimals),
            amounts::format_base_units(quote.out_amount, ctx.output_decimals),
            amounts::rate(
                quote.in_amount,
                ctx.input_decimals,
                quote.out_amount,
                ctx.output_decimals
            ),
            provider = PROVIDER_WIDTH,
            route = ROUTE_WIDTH,
        ));
    }
    if batch.quotes.is_empty() {
        lines.push("  waiting for quotes...".to_string());
    }
    lines.push("  Enter accepts the starred quote · Esc cancels".to_string());
    (lines, starred)
}

/// One-line result of a confirmed quote, used by both display modes.
pub(crate) fn summary_line(quote: &Quote, ctx: &DisplayContext) -> String {
    format!(
        "{} {} → {} {} via {}",
        amounts::format_base_units(quote.in_amount, ctx.input_decimals),
        ctx.input_symbol,
        amounts::format_base_units(quote.out_amount, ctx.output_decimals),
        ctx.output_symbol,
        quote.provider_id,
    )
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        value.to_string()
    } else {
        let kept: String = value.chars().take(width.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}
