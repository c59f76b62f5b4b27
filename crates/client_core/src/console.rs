//! Streaming console: line reassembly, scroll-follow, progress indicators and
//! persisted shape.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use shared::{
    domain::LayoutState,
    protocol::{ConnectionExhausted, ConsoleClear, Echo, ProgressClear, ProgressInit, ProgressStep},
};
use storage::SharedStore;
use tracing::{debug, info};

use crate::{
    event_bus::EventBus,
    layout::LayoutPersistence,
    progress::{IndicatorId, ProgressState},
    view::ViewState,
};

pub const PROGRESS_CLEAR_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_HEIGHT: u32 = 12;
const EXPANDED_SHARE: f64 = 0.8;
const EXHAUSTED_NOTICE: &str = "[push connection lost; restart the console to resume live output]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Text(String),
    Progress(IndicatorId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    /// Increases monotonically for the life of the buffer, across clears.
    pub seq: u64,
    pub kind: LineKind,
}

/// Line records rebuilt from arbitrarily split text chunks.
#[derive(Debug, Default)]
pub struct ConsoleBuffer {
    lines: Vec<LineRecord>,
    pending_partial_line: bool,
    next_seq: u64,
}

impl ConsoleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk of streamed text.
    ///
    /// When the previous chunk stopped mid-line, the first segment of this one
    /// continues that line instead of starting a new record.
    pub fn append(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        let ends_on_terminator = chunk.ends_with('\n');
        let mut segments: Vec<&str> = chunk.split('\n').collect();
        if ends_on_terminator {
            segments.pop();
        }

        let mut segments = segments.into_iter();
        if self.pending_partial_line {
            if let Some(first) = segments.next() {
                match self.lines.last_mut() {
                    Some(LineRecord {
                        kind: LineKind::Text(text),
                        ..
                    }) => text.push_str(first),
                    _ => self.push(LineKind::Text(first.to_string())),
                }
            }
        }
        for segment in segments {
            self.push(LineKind::Text(segment.to_string()));
        }
        self.pending_partial_line = !ends_on_terminator;
    }

    /// Adds an indicator as a complete line of its own.
    pub fn push_indicator(&mut self, id: IndicatorId) {
        self.push(LineKind::Progress(id));
        self.pending_partial_line = false;
    }

    pub fn remove_indicator(&mut self, id: IndicatorId) -> bool {
        let before = self.lines.len();
        self.lines
            .retain(|line| line.kind != LineKind::Progress(id));
        self.lines.len() != before
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.pending_partial_line = false;
    }

    pub fn lines(&self) -> &[LineRecord] {
        &self.lines
    }

    pub fn text_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|line| match &line.kind {
            LineKind::Text(text) => Some(text.as_str()),
            LineKind::Progress(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn pending_partial_line(&self) -> bool {
        self.pending_partial_line
    }

    fn push(&mut self, kind: LineKind) {
        self.lines.push(LineRecord {
            seq: self.next_seq,
            kind,
        });
        self.next_seq += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsoleOptions {
    /// Restore the persisted shape at construction and persist every resize.
    pub restore: bool,
    /// Collapsed height, in lines.
    pub height: u32,
    pub progress_clear_delay: Duration,
}

impl Default for ConsoleOptions {
    fn default() -> Self {
        Self {
            restore: true,
            height: DEFAULT_HEIGHT,
            progress_clear_delay: PROGRESS_CLEAR_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedLine {
    Text { seq: u64, text: String },
    Progress { seq: u64, value: u8, complete: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleSnapshot {
    pub lines: Vec<RenderedLine>,
    pub pending_partial_line: bool,
    pub view: ViewState,
    pub progress: ProgressState,
    pub layout: LayoutState,
}

/// Lines added since a cursor, with just enough state to draw a status line.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleTail {
    /// Records with a sequence number above the cursor, oldest first.
    pub lines: Vec<RenderedLine>,
    pub pending_partial_line: bool,
    /// Value of the most recent indicator still on screen.
    pub indicator: Option<u8>,
}

struct ConsoleState {
    buffer: ConsoleBuffer,
    view: ViewState,
    progress: ProgressState,
    /// Indicators on screen, including completed ones awaiting removal.
    indicators: BTreeMap<IndicatorId, u8>,
    layout: LayoutState,
    collapsed_height: u32,
    next_indicator: u64,
}

impl ConsoleState {
    /// Runs `mutate` and keeps the view pinned to the bottom if it was there
    /// before.
    fn follow<R>(&mut self, mutate: impl FnOnce(&mut Self) -> R) -> R {
        let was_bottom = self.view.is_at_bottom();
        let result = mutate(self);
        self.view.set_content(self.buffer.len());
        if was_bottom {
            self.view.scroll_to_bottom();
        }
        result
    }

    fn render_line(&self, line: &LineRecord) -> RenderedLine {
        match &line.kind {
            LineKind::Text(text) => RenderedLine::Text {
                seq: line.seq,
                text: text.clone(),
            },
            LineKind::Progress(id) => RenderedLine::Progress {
                seq: line.seq,
                value: self.indicators.get(id).copied().unwrap_or(100),
                complete: self.progress.indicator() != Some(*id),
            },
        }
    }

    fn apply_height(&mut self, height: u32, expanded: bool) -> LayoutState {
        let was_bottom = self.view.is_at_bottom();
        self.layout = LayoutState { height, expanded };
        self.view.set_viewport(height as usize);
        if was_bottom {
            self.view.scroll_to_bottom();
        }
        self.layout
    }
}

/// Cheap to clone; clones share the same console.
#[derive(Clone)]
pub struct Console {
    state: Arc<Mutex<ConsoleState>>,
    persistence: LayoutPersistence,
    progress_clear_delay: Duration,
}

impl Console {
    pub fn new(options: ConsoleOptions, store: Option<SharedStore>) -> Self {
        let persistence = if options.restore {
            LayoutPersistence::new(store)
        } else {
            LayoutPersistence::default()
        };

        let layout = match persistence.restore() {
            Some(saved) => {
                info!(height = saved.height, expanded = saved.expanded, "console: restoring layout");
                saved
            }
            None => LayoutState {
                height: options.height,
                expanded: false,
            },
        };

        Self {
            state: Arc::new(Mutex::new(ConsoleState {
                buffer: ConsoleBuffer::new(),
                view: ViewState::new(layout.height as usize),
                progress: ProgressState::default(),
                indicators: BTreeMap::new(),
                layout,
                collapsed_height: options.height,
                next_indicator: 0,
            })),
            persistence,
            progress_clear_delay: options.progress_clear_delay,
        }
    }

    /// Subscribes this console to the text, progress and lifecycle events.
    pub fn attach(&self, bus: &EventBus) {
        let console = self.clone();
        bus.subscribe_typed::<Echo, _>(move |text| console.append(&text));
        let console = self.clone();
        bus.subscribe_typed::<ProgressInit, _>(move |_| {
            console.progress_init();
        });
        let console = self.clone();
        bus.subscribe_typed::<ProgressStep, _>(move |value| {
            console.progress_step(value);
        });
        let console = self.clone();
        bus.subscribe_typed::<ProgressClear, _>(move |_| {
            console.progress_clear();
        });
        let console = self.clone();
        bus.subscribe_typed::<ConsoleClear, _>(move |_| console.clear());
        let console = self.clone();
        bus.subscribe_typed::<ConnectionExhausted, _>(move |_| {
            console.write_line(EXHAUSTED_NOTICE)
        });
    }

    pub fn append(&self, chunk: &str) {
        self.lock().follow(|state| state.buffer.append(chunk));
    }

    pub fn write_line(&self, line: &str) {
        if line.ends_with('\n') {
            self.append(line);
        } else {
            self.append(&format!("{line}\n"));
        }
    }

    /// Drops every line and any indicator on screen.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.buffer.clear();
        state.indicators.clear();
        state.progress.reset();
        state.view.set_content(0);
        debug!("console: cleared");
    }

    /// Returns `false` when an indicator is already active.
    pub fn progress_init(&self) -> bool {
        self.lock().follow(|state| {
            let id = IndicatorId(state.next_indicator);
            if !state.progress.init(id) {
                return false;
            }
            state.next_indicator += 1;
            state.indicators.insert(id, 0);
            state.buffer.push_indicator(id);
            true
        })
    }

    pub fn progress_step(&self, raw: f64) -> bool {
        let mut state = self.lock();
        match state.progress.step(raw) {
            Some((id, value)) => {
                state.indicators.insert(id, value);
                true
            }
            None => false,
        }
    }

    /// Shows the active indicator as complete, then removes it once the
    /// display delay has passed.
    pub fn progress_clear(&self) -> bool {
        let id = {
            let mut state = self.lock();
            let Some(id) = state.progress.clear() else {
                return false;
            };
            state.indicators.insert(id, 100);
            id
        };

        let console = self.clone();
        let delay = self.progress_clear_delay;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    console.remove_indicator(id);
                });
            }
            Err(_) => console.remove_indicator(id),
        }
        true
    }

    fn remove_indicator(&self, id: IndicatorId) {
        self.lock().follow(|state| {
            state.indicators.remove(&id);
            state.buffer.remove_indicator(id);
        });
    }

    pub fn expand(&self, available_height: u32) {
        let layout = {
            let mut state = self.lock();
            if state.layout.expanded {
                return;
            }
            let height = ((available_height as f64) * EXPANDED_SHARE) as u32;
            let height = height.max(state.collapsed_height);
            state.apply_height(height, true)
        };
        self.persistence.persist(layout);
    }

    pub fn collapse(&self) {
        let layout = {
            let mut state = self.lock();
            if !state.layout.expanded {
                return;
            }
            let height = state.collapsed_height;
            state.apply_height(height, false)
        };
        self.persistence.persist(layout);
    }

    pub fn toggle_expanded(&self, available_height: u32) {
        if self.layout().expanded {
            self.collapse();
        } else {
            self.expand(available_height);
        }
    }

    /// User-driven resize; keeps the expanded flag as it is.
    pub fn resize(&self, height: u32) {
        let layout = {
            let mut state = self.lock();
            let expanded = state.layout.expanded;
            state.apply_height(height.max(1), expanded)
        };
        self.persistence.persist(layout);
    }

    pub fn user_scrolled(&self, offset: usize) {
        self.lock().view.user_scrolled(offset);
    }

    pub fn snapshot(&self) -> ConsoleSnapshot {
        let state = self.lock();
        let lines = state
            .buffer
            .lines()
            .iter()
            .map(|line| state.render_line(line))
            .collect();
        ConsoleSnapshot {
            lines,
            pending_partial_line: state.buffer.pending_partial_line(),
            view: state.view,
            progress: state.progress,
            layout: state.layout,
        }
    }

    /// Copies only the records after `after`; `None` starts from the oldest.
    pub fn tail(&self, after: Option<u64>) -> ConsoleTail {
        let state = self.lock();
        let records = state.buffer.lines();
        let start = match after {
            Some(cursor) => records.partition_point(|line| line.seq <= cursor),
            None => 0,
        };
        ConsoleTail {
            lines: records[start..]
                .iter()
                .map(|line| state.render_line(line))
                .collect(),
            pending_partial_line: state.buffer.pending_partial_line(),
            indicator: state.indicators.values().next_back().copied(),
        }
    }

    pub fn text_lines(&self) -> Vec<String> {
        self.lock()
            .buffer
            .text_lines()
            .map(str::to_string)
            .collect()
    }

    pub fn pending_partial_line(&self) -> bool {
        self.lock().buffer.pending_partial_line()
    }

    pub fn view(&self) -> ViewState {
        self.lock().view
    }

    pub fn progress(&self) -> ProgressState {
        self.lock().progress
    }

    pub fn layout(&self) -> LayoutState {
        self.lock().layout
    }

    fn lock(&self) -> MutexGuard<'_, ConsoleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/console_tests.rs"]
mod tests;
