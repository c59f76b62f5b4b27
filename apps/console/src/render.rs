//! Turns console output into terminal output: completed lines are printed
//! once, the live indicator is redrawn in place as a status line.

use std::io::{self, Write};

use chrono::Local;
use client_core::{Console, ConsoleTail, RenderedLine};

const BAR_WIDTH: usize = 30;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Default)]
pub struct Renderer {
    timestamps: bool,
    /// Sequence number of the last line already printed.
    printed_through: Option<u64>,
    status_visible: bool,
}

impl Renderer {
    pub fn new(timestamps: bool) -> Self {
        Self {
            timestamps,
            ..Self::default()
        }
    }

    /// Sequence number of the last printed line; the next tail starts after it.
    pub fn cursor(&self) -> Option<u64> {
        self.printed_through
    }

    /// Text lines that are complete and not printed yet. A trailing line that
    /// is still being streamed waits for its terminator.
    pub fn take_completed(&mut self, tail: &ConsoleTail) -> Vec<String> {
        let open_line = if tail.pending_partial_line {
            tail.lines.last().and_then(|line| match line {
                RenderedLine::Text { seq, .. } => Some(*seq),
                RenderedLine::Progress { .. } => None,
            })
        } else {
            None
        };

        let mut lines = Vec::new();
        for line in &tail.lines {
            let RenderedLine::Text { seq, text } = line else {
                continue;
            };
            if Some(*seq) == open_line {
                break;
            }
            if self.printed_through.is_some_and(|printed| *seq <= printed) {
                continue;
            }
            self.printed_through = Some(*seq);
            lines.push(text.clone());
        }
        lines
    }

    pub fn render(&mut self, console: &Console, out: &mut impl Write) -> io::Result<()> {
        let tail = console.tail(self.printed_through);
        let lines = self.take_completed(&tail);
        let status = status_line(&tail);

        if self.status_visible && (!lines.is_empty() || status.is_none()) {
            write!(out, "\r\x1b[2K")?;
            self.status_visible = false;
        }
        for line in lines {
            if self.timestamps {
                writeln!(out, "[{}] {line}", Local::now().format(TIMESTAMP_FORMAT))?;
            } else {
                writeln!(out, "{line}")?;
            }
        }
        if let Some(status) = status {
            write!(out, "\r\x1b[2K{status}")?;
            self.status_visible = true;
        }
        out.flush()
    }
}

/// The most recent indicator on screen, drawn as a bar.
pub fn status_line(tail: &ConsoleTail) -> Option<String> {
    let value = tail.indicator?;
    let filled = usize::from(value) * BAR_WIDTH / 100;
    Some(format!(
        "[{}{}] {value:>3}%",
        "#".repeat(filled),
        " ".repeat(BAR_WIDTH - filled)
    ))
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
