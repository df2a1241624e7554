//! Terminal sessions - text buffer, cursor, geometry and scroll state
//!
//! Each [`Terminal`] owns one [`TerminalState`] that the message handlers in
//! `msg_in` mutate in place. The rendering layer only ever sees snapshots.

mod msg_in;
mod stack;

pub use msg_in::TerminalEffect;
pub use stack::{FinalizedCommand, TerminalStack};

use crate::msg::{ChannelId, MsgError, ProcessId, TerminalId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest width or height a rescale may produce, in GL units
pub const MIN_EXTENT: f32 = 0.2;

/// Longest a single text line may grow, in characters
pub const MAX_LINE_LEN: usize = 4096;

/// Lines of scrollback a terminal keeps unless configured otherwise
pub const DEFAULT_SCROLLBACK_LINES: usize = 10_000;

/// Terminal errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TerminalError {
    #[error("Terminal with id {0} doesn't exist")]
    NotFound(TerminalId),

    #[error(transparent)]
    Message(#[from] MsgError),
}

/// Axis-aligned rectangle in GL space (`top` > `bottom`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            right: left + width,
            bottom: top - height,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.left += dx;
        self.right += dx;
        self.top += dy;
        self.bottom += dy;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

/// Position in the text buffer, counted in characters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub x: usize,
    pub y: usize,
}

/// Geometry a new terminal starts with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminalDefaults {
    pub bounds: Rect,
    pub columns: u16,
    pub rows: u16,
    /// Most text lines kept before the oldest are dropped
    pub scrollback_lines: usize,
}

impl Default for TerminalDefaults {
    fn default() -> Self {
        Self {
            bounds: Rect::new(-0.9, 0.9, 1.6, 1.6),
            columns: 80,
            rows: 24,
            scrollback_lines: DEFAULT_SCROLLBACK_LINES,
        }
    }
}

/// Renderable state of one terminal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalState {
    /// Flow position where the next character lands
    pub cursor: Cursor,
    /// Text lines, top to bottom
    pub bodies: Vec<String>,
    pub prompt: String,
    /// Vertical scroll, within `[-offscreen_length(), 0]`
    pub scroll_offset: f32,
    pub bounds: Rect,
    pub char_size: Vec2,
    pub rows: u16,
    /// Cap on `bodies.len()`, never below `rows`
    pub scrollback_lines: usize,
    pub needs_redraw: bool,
}

impl TerminalState {
    pub fn new(defaults: &TerminalDefaults) -> Self {
        let bounds = defaults.bounds;
        Self {
            cursor: Cursor::default(),
            bodies: vec![String::new()],
            prompt: String::new(),
            scroll_offset: 0.0,
            bounds,
            char_size: Vec2 {
                x: bounds.width() / f32::from(defaults.columns.max(1)),
                y: bounds.height() / f32::from(defaults.rows.max(1)),
            },
            rows: defaults.rows,
            scrollback_lines: defaults
                .scrollback_lines
                .max(usize::from(defaults.rows))
                .max(1),
            needs_redraw: true,
        }
    }

    /// Height of the part of the text body that does not fit on screen
    pub fn offscreen_length(&self) -> f32 {
        let hidden = self.bodies.len().saturating_sub(usize::from(self.rows));
        hidden as f32 * self.char_size.y
    }

    pub fn clear(&mut self) {
        self.bodies = vec![String::new()];
        self.cursor = Cursor::default();
        self.scroll_offset = 0.0;
        self.needs_redraw = true;
    }

    pub fn update_command_prompt(&mut self, text: String) {
        self.prompt = text;
        self.needs_redraw = true;
    }

    pub fn move_by(&mut self, dx: f32, dy: f32) {
        self.bounds.translate(dx, dy);
        self.needs_redraw = true;
    }

    /// Insert at the flow position and advance it by one
    ///
    /// Past the end of the line the character is appended; the cursor still
    /// advances from where it was, never snapping back to the line length.
    /// A cursor at [`MAX_LINE_LEN`] wraps to a fresh line first.
    pub fn insert_char(&mut self, ch: char) {
        if self.cursor.x >= MAX_LINE_LEN {
            self.new_line();
        }
        let Cursor { x, y } = self.cursor;
        self.ensure_line(y);

        let line = &mut self.bodies[y];
        if x >= line.chars().count() {
            line.push(ch);
        } else {
            let at = byte_offset(line, x);
            line.insert(at, ch);
        }

        self.cursor.x += 1;
        self.needs_redraw = true;
    }

    /// Write `ch` at `(x, y)` without touching the flow position
    ///
    /// Writes outside the scrollback or past [`MAX_LINE_LEN`] are dropped.
    pub fn set_character_at(&mut self, x: usize, y: usize, ch: char) {
        if y >= self.scrollback_lines || x >= MAX_LINE_LEN {
            tracing::warn!("Dropping character write outside the buffer at ({}, {})", x, y);
            return;
        }
        self.ensure_line(y);

        let line = &mut self.bodies[y];
        let len = line.chars().count();
        if x < len {
            let start = byte_offset(line, x);
            let end = start + line[start..].chars().next().map_or(0, char::len_utf8);
            line.replace_range(start..end, ch.encode_utf8(&mut [0u8; 4]));
        } else {
            line.extend(std::iter::repeat(' ').take(x - len));
            line.push(ch);
        }

        self.needs_redraw = true;
    }

    pub fn new_line(&mut self) {
        self.cursor.y += 1;
        self.cursor.x = 0;
        self.ensure_line(self.cursor.y);
        self.trim_scrollback();
        self.needs_redraw = true;
    }

    /// Rescale bounds and glyph size around the top-left corner
    ///
    /// `delta` is clamped to `[-1, 1]` and mapped to a factor in `[0.9, 1.1]`.
    /// Rescales that would leave the terminal narrower or shorter than
    /// [`MIN_EXTENT`] are dropped.
    pub fn rescale(&mut self, delta: f64) {
        if !delta.is_finite() {
            return;
        }

        let factor = 1.0 + (delta as f32).clamp(-1.0, 1.0) / 10.0;
        let new_width = self.bounds.width() * factor;
        let new_height = self.bounds.height() * factor;

        if new_width < MIN_EXTENT || new_height < MIN_EXTENT {
            tracing::debug!("Rejecting rescale to {:.3}x{:.3}", new_width, new_height);
            return;
        }

        self.bounds.right = self.bounds.left + new_width;
        self.bounds.bottom = self.bounds.top - new_height;
        self.char_size.x *= factor;
        self.char_size.y *= factor;
        self.needs_redraw = true;
    }

    /// Scroll the text body by `delta` lines
    pub fn scroll(&mut self, delta: f64) {
        if !delta.is_finite() {
            return;
        }

        let limit = self.offscreen_length();
        let offset = self.scroll_offset - delta as f32 * self.char_size.y;
        self.scroll_offset = offset.clamp(-limit, 0.0);
        self.needs_redraw = true;
    }

    fn ensure_line(&mut self, y: usize) {
        if self.bodies.len() <= y {
            self.bodies.resize(y + 1, String::new());
        }
    }

    /// Drop the oldest lines past the scrollback cap
    fn trim_scrollback(&mut self) {
        let excess = self.bodies.len().saturating_sub(self.scrollback_lines);
        if excess == 0 {
            return;
        }

        self.bodies.drain(..excess);
        self.cursor.y = self.cursor.y.saturating_sub(excess);
        let limit = self.offscreen_length();
        self.scroll_offset = self.scroll_offset.clamp(-limit, 0.0);
    }
}

fn byte_offset(line: &str, char_index: usize) -> usize {
    line.char_indices()
        .nth(char_index)
        .map_or(line.len(), |(i, _)| i)
}

/// Where the escape-sequence filter is between output chunks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum OutputMode {
    #[default]
    Text,
    Escape,
    Csi,
    Osc,
}

/// A terminal session, optionally bound to one process
#[derive(Debug)]
pub struct Terminal {
    terminal_id: TerminalId,
    attached_process: Option<ProcessId>,
    out_channel: Option<ChannelId>,
    state: TerminalState,
    output_mode: OutputMode,
    /// Incomplete UTF-8 sequence left over from the last output chunk
    pending: Vec<u8>,
}

impl Terminal {
    pub fn new(terminal_id: TerminalId, defaults: &TerminalDefaults) -> Self {
        Self {
            terminal_id,
            attached_process: None,
            out_channel: None,
            state: TerminalState::new(defaults),
            output_mode: OutputMode::Text,
            pending: Vec::new(),
        }
    }

    pub fn id(&self) -> TerminalId {
        self.terminal_id
    }

    pub fn attached_process(&self) -> Option<ProcessId> {
        self.attached_process
    }

    pub fn attach_process(&mut self, process: ProcessId) {
        self.attached_process = Some(process);
    }

    pub fn detach_process(&mut self) -> Option<ProcessId> {
        self.attached_process.take()
    }

    pub fn out_channel(&self) -> Option<ChannelId> {
        self.out_channel
    }

    pub fn set_out_channel(&mut self, channel: ChannelId) {
        self.out_channel = Some(channel);
    }

    pub fn state(&self) -> &TerminalState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut TerminalState {
        &mut self.state
    }

    /// Copy of the state for the renderer; clears the redraw flag
    pub fn snapshot(&mut self) -> TerminalState {
        let snapshot = self.state.clone();
        self.state.needs_redraw = false;
        snapshot
    }

    /// Feed raw process output into the text buffer
    ///
    /// Newlines start a new line, escape sequences and other control
    /// characters are dropped, tabs become a single space. A multi-byte
    /// character cut off at the end of `data` is held until the next call;
    /// invalid bytes become U+FFFD.
    pub fn write_output(&mut self, data: &[u8]) {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(data);

        let mut rest = buf.as_slice();
        while !rest.is_empty() {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.feed(text);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    self.feed(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            self.feed(char::REPLACEMENT_CHARACTER.encode_utf8(&mut [0u8; 4]));
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
    }

    fn feed(&mut self, text: &str) {
        for ch in text.chars() {
            self.output_mode = match (self.output_mode, ch) {
                (OutputMode::Text, '\x1b') => OutputMode::Escape,
                (OutputMode::Text, '\n') => {
                    self.state.new_line();
                    OutputMode::Text
                }
                (OutputMode::Text, '\t') => {
                    self.state.insert_char(' ');
                    OutputMode::Text
                }
                (OutputMode::Text, c) if c.is_control() => OutputMode::Text,
                (OutputMode::Text, c) => {
                    self.state.insert_char(c);
                    OutputMode::Text
                }
                (OutputMode::Escape, '[') => OutputMode::Csi,
                (OutputMode::Escape, ']') => OutputMode::Osc,
                (OutputMode::Escape, _) => OutputMode::Text,
                (OutputMode::Csi, c) if ('\x40'..='\x7e').contains(&c) => OutputMode::Text,
                (OutputMode::Csi, _) => OutputMode::Csi,
                (OutputMode::Osc, '\x07') => OutputMode::Text,
                (OutputMode::Osc, _) => OutputMode::Osc,
            };
        }
    }
}
