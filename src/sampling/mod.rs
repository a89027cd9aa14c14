//! Upstream event producers and the sampling decorators that thin them
//!
//! Every sampler wraps another [`EventParser`] and keeps per-category state,
//! so thinning is stratified: a noisy category never starves a quiet one, and
//! the first event of every category always gets through.

pub mod comparator;
pub mod frequency;
pub mod time;

pub use comparator::{GenericSamplingByTime, IntervalComparator, TimeComparator, TimeUnit};
pub use frequency::SamplingByFrequency;
pub use time::SamplingByTime;

use crate::types::Event;

/// Turns one line of text into an event, or `None` when the line is not
/// recognised (or has been sampled away).
pub trait EventParser {
    fn parse(&mut self, line: &str) -> Option<Event>;
}

impl<P: EventParser + ?Sized> EventParser for Box<P> {
    fn parse(&mut self, line: &str) -> Option<Event> {
        (**self).parse(line)
    }
}

/// Adapts a closure into an [`EventParser`]
pub struct FnParser<F> {
    f: F,
}

impl<F> FnParser<F>
where
    F: FnMut(&str) -> Option<Event>,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> EventParser for FnParser<F>
where
    F: FnMut(&str) -> Option<Event>,
{
    fn parse(&mut self, line: &str) -> Option<Event> {
        (self.f)(line)
    }
}
