//! The output event filter.
//!
//! Output modules see two kinds of items: events and lifecycle control
//! signals. Every item passes the filter twice, once when it is queued for
//! an output module (pre-check) and once right before it is handed over
//! (dispatch). The two phases share all rules except the flag overrides,
//! which only apply at dispatch.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::event::Event;

/// Lifecycle markers delivered to output modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// The scan is done; flush and close
    Finished,
    /// Summarize what has been seen so far
    Report,
}

/// An item flowing to output modules.
#[derive(Debug, Clone)]
pub enum Dispatched {
    Event(Arc<Event>),
    Signal(ControlSignal),
}

impl From<Arc<Event>> for Dispatched {
    fn from(event: Arc<Event>) -> Self {
        Self::Event(event)
    }
}

impl From<ControlSignal> for Dispatched {
    fn from(signal: ControlSignal) -> Self {
        Self::Signal(signal)
    }
}

/// When the filter runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPhase {
    PreCheck,
    Dispatch,
}

/// Why an item was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Omitted,
    Internal,
    /// Module-specific reason
    Module(Cow<'static, str>),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Omitted => f.write_str("omitted"),
            Self::Internal => f.write_str("internal"),
            Self::Module(reason) => f.write_str(reason),
        }
    }
}

/// Verdict of a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Accept,
    /// Accepted only because `force_output` overrode suppression
    Forced,
    Reject(RejectReason),
}

impl FilterDecision {
    pub fn reject(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::Reject(RejectReason::Module(reason.into()))
    }

    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Reject(_))
    }
}

/// Decide whether an output module should receive `item`.
///
/// 1. control signals pass
/// 2. `omit` rejects
/// 3. at dispatch, `force_output` accepts
/// 4. at dispatch, `internal` rejects
/// 5. anything else passes
pub fn output_filter(item: &Dispatched, phase: FilterPhase) -> FilterDecision {
    let event = match item {
        Dispatched::Signal(_) => return FilterDecision::Accept,
        Dispatched::Event(event) => event,
    };

    let flags = event.flags();
    if flags.omit {
        return FilterDecision::Reject(RejectReason::Omitted);
    }

    if phase == FilterPhase::Dispatch {
        if flags.force_output {
            return FilterDecision::Forced;
        }
        if flags.internal {
            return FilterDecision::Reject(RejectReason::Internal);
        }
    }

    FilterDecision::Accept
}
