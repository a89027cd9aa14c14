//! Per-line processing shared by both execution modes

use {
    super::{FilterChain, SharedSubscriber, Subscriber, SubscriberRegistry},
    crate::sampling::EventParser,
    std::sync::{Arc, Mutex},
};

/// Filter chain plus the subscribers its accepted events are fanned out to
#[derive(Debug, Default)]
pub struct PipelineEngine {
    chain: FilterChain,
    registry: SubscriberRegistry,
}

impl PipelineEngine {
    pub fn new(chain: FilterChain) -> Self {
        Self {
            chain,
            registry: SubscriberRegistry::new(),
        }
    }

    /// Parse one line and notify subscribers when it yields an event.
    /// Returns whether an event was accepted.
    pub fn process_line(&mut self, line: &str) -> bool {
        match self.chain.parse(line) {
            Some(event) => {
                self.registry.notify(&event);
                true
            }
            None => false,
        }
    }

    pub fn attach(&mut self, subscriber: SharedSubscriber) -> bool {
        self.registry.attach(subscriber)
    }

    pub fn detach<S>(&mut self, subscriber: &Arc<Mutex<S>>) -> bool
    where
        S: Subscriber + Send + ?Sized,
    {
        self.registry.detach(subscriber)
    }

    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut FilterChain {
        &mut self.chain
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SubscriberRegistry {
        &mut self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pipeline::shared, sampling::FnParser, types::Event};

    struct Count(usize);

    impl Subscriber for Count {
        fn consume(&mut self, _event: &Event) {
            self.0 += 1;
        }
    }

    #[test]
    fn test_process_line() {
        let chain = FilterChain::new().with(FnParser::new(|line: &str| {
            Event::new(line.parse().ok()?, "n", 1.0, line).ok()
        }));
        let mut engine = PipelineEngine::new(chain);
        let count = shared(Count(0));
        assert!(engine.attach(count.clone()));

        assert!(engine.process_line("5"));
        assert!(!engine.process_line("five"));
        assert!(engine.process_line("6"));

        assert_eq!(count.lock().unwrap().0, 2);
        assert!(engine.detach(&count));
        assert!(engine.process_line("7"));
        assert_eq!(count.lock().unwrap().0, 2);
    }
}
