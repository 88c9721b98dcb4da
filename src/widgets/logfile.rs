//! Log tail: a text buffer refreshed from a tail URL on a timer.
//!
//! The next poll is scheduled when the previous one finishes, so a slow
//! server stretches the interval instead of stacking requests.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use super::{ElementData, Widget, WidgetContext, WidgetError};
use crate::net::{Fetcher, Pending, Poll};

/// Distance from the bottom, in pixels, that still counts as following.
pub const STICKY_DISTANCE: f32 = 20.0;

/// Scroll geometry as last reported by the UI.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub scroll_top: f32,
    pub client_height: f32,
    pub scroll_height: f32,
}

impl Viewport {
    pub fn near_bottom(&self) -> bool {
        (self.scroll_top + self.client_height - self.scroll_height).abs() < STICKY_DISTANCE
    }
}

pub struct LogTail {
    tail_url: String,
    fetcher: Fetcher,
    interval: Duration,
    buffer: String,
    viewport: Viewport,
    pending: Option<Pending<String>>,
    next_poll: Option<Instant>,
    scroll_request: bool,
    shown: bool,
}

pub(super) fn build(el: &ElementData, ctx: &WidgetContext) -> Result<Widget, WidgetError> {
    let tail_url = ctx.resolve(el.require_data("tail")?)?;
    let tail = LogTail::new(
        ctx.fetcher.clone(),
        &tail_url,
        &el.text,
        ctx.tail_interval,
        Instant::now(),
    );
    Ok(Widget::Logfile(Rc::new(RefCell::new(tail))))
}

impl LogTail {
    pub fn new(
        fetcher: Fetcher,
        tail_url: &str,
        initial: &str,
        interval: Duration,
        now: Instant,
    ) -> Self {
        let mut tail = Self {
            tail_url: tail_url.to_string(),
            fetcher,
            interval,
            buffer: initial.to_string(),
            viewport: Viewport::default(),
            pending: None,
            next_poll: Some(now + interval),
            scroll_request: false,
            shown: false,
        };
        tail.scroll_to_end();
        tail
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn next_poll(&self) -> Option<Instant> {
        self.next_poll
    }

    pub fn scroll_to_end(&mut self) {
        self.scroll_request = true;
        self.viewport.scroll_top = (self.viewport.scroll_height - self.viewport.client_height).max(0.0);
    }

    /// Whether the UI should jump to the bottom; cleared by the call.
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_request)
    }

    /// The tab holding this log became visible. Jumps to the end the first
    /// time only.
    pub fn mark_shown(&mut self) {
        if !self.shown {
            self.shown = true;
            self.scroll_to_end();
        }
    }

    /// Append a chunk, following the end when the view was at the bottom.
    pub fn append(&mut self, chunk: &str) {
        let follow = self.viewport.near_bottom();
        self.buffer.push_str(chunk);
        if follow {
            self.scroll_to_end();
        }
    }

    /// Start a due poll and take in a finished one.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.pending.is_none() && self.next_poll.is_some_and(|at| at <= now) {
            log::trace!("tail {}", self.tail_url);
            self.pending = Some(self.fetcher.text(&self.tail_url));
            self.next_poll = None;
        }
        let Some(pending) = self.pending.as_ref() else {
            return false;
        };
        let result = match pending.poll() {
            Poll::Waiting => return false,
            Poll::Ready(result) => result,
        };
        self.pending = None;
        self.next_poll = Some(now + self.interval);
        match result {
            Ok(chunk) => {
                self.append(&chunk);
                !chunk.is_empty()
            }
            Err(e) => {
                log::debug!("tail {} failed: {}", self.tail_url, e);
                false
            }
        }
    }
}
