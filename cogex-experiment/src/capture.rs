//! Response capture with single-acceptance windows.

use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use tracing::trace;

#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaptureHandle(u64);

impl fmt::Display for CaptureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    pub input: String,
    pub timestamp_ns: u64,
}

#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No window open: between trials, or the window already accepted a response.
    NoOpenWindow,
    /// Key is not part of the trial's response set.
    NotAValidResponse,
    /// Input timestamped before the window opened.
    BeforeWindowOpened,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Accepted(CapturedResponse),
    Ignored(IgnoreReason),
}

impl CaptureOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, CaptureOutcome::Accepted(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("{open} is still open; close it before opening another window")]
    AlreadyOpen { open: CaptureHandle },
}

#[derive(Debug)]
struct OpenWindow {
    handle: CaptureHandle,
    valid: BTreeSet<String>,
    opened_at_ns: u64,
}

#[derive(Debug, Default)]
pub struct ResponseCapture {
    next_handle: u64,
    window: Option<OpenWindow>,
}

impl ResponseCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_window(
        &mut self,
        valid_responses: BTreeSet<String>,
        opened_at_ns: u64,
    ) -> Result<CaptureHandle, CaptureError> {
        if let Some(open) = &self.window {
            return Err(CaptureError::AlreadyOpen { open: open.handle });
        }
        self.next_handle += 1;
        let handle = CaptureHandle(self.next_handle);
        trace!(%handle, responses = valid_responses.len(), "response window opened");
        self.window = Some(OpenWindow {
            handle,
            valid: valid_responses,
            opened_at_ns,
        });
        Ok(handle)
    }

    /// Closes the window identified by `handle`. Returns whether it was open.
    pub fn close_window(&mut self, handle: CaptureHandle) -> bool {
        match &self.window {
            Some(open) if open.handle == handle => {
                trace!(%handle, "response window closed");
                self.window = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.window.is_some()
    }

    pub fn open_handle(&self) -> Option<CaptureHandle> {
        self.window.as_ref().map(|w| w.handle)
    }

    /// Offers one input event to the open window.
    ///
    /// The first valid input closes the window, so a second press within
    /// the same trial lands on [`IgnoreReason::NoOpenWindow`].
    pub fn offer(&mut self, input: &str, timestamp_ns: u64) -> CaptureOutcome {
        let Some(open) = &self.window else {
            return CaptureOutcome::Ignored(IgnoreReason::NoOpenWindow);
        };
        if timestamp_ns < open.opened_at_ns {
            return CaptureOutcome::Ignored(IgnoreReason::BeforeWindowOpened);
        }
        if !open.valid.contains(input) {
            return CaptureOutcome::Ignored(IgnoreReason::NotAValidResponse);
        }
        trace!(handle = %open.handle, input, timestamp_ns, "response captured");
        self.window = None;
        CaptureOutcome::Accepted(CapturedResponse {
            input: input.to_string(),
            timestamp_ns,
        })
    }
}
