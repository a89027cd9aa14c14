use crate::{sampling::EventParser, types::Event};

/// Ordered list of parsers; the first one that yields an event wins and the
/// rest are not consulted for that line.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn EventParser + Send>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<P>(mut self, filter: P) -> Self
    where
        P: EventParser + Send + 'static,
    {
        self.push(filter);
        self
    }

    pub fn push<P>(&mut self, filter: P)
    where
        P: EventParser + Send + 'static,
    {
        self.filters.push(Box::new(filter));
    }

    pub fn push_boxed(&mut self, filter: Box<dyn EventParser + Send>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl EventParser for FilterChain {
    fn parse(&mut self, line: &str) -> Option<Event> {
        self.filters.iter_mut().find_map(|filter| filter.parse(line))
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.filters.len())
            .finish()
    }
}
