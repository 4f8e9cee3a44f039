//! Ordered, named matching strategies.
//!
//! Element lookup on the portal is heuristic: a control is found by its form
//! role, then by its style, then by its label. Each heuristic is a
//! [`Strategy`]; a list of them is evaluated in priority order and the first
//! strategy that matches any candidate wins.

use std::fmt;

pub struct Strategy<'a, T> {
    pub name: &'static str,
    matcher: Box<dyn Fn(&T) -> bool + Send + Sync + 'a>,
}

impl<'a, T> Strategy<'a, T> {
    pub fn new<F>(name: &'static str, matcher: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'a,
    {
        Self {
            name,
            matcher: Box::new(matcher),
        }
    }

    pub fn matches(&self, candidate: &T) -> bool {
        (self.matcher)(candidate)
    }
}

impl<T> fmt::Debug for Strategy<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy").field("name", &self.name).finish()
    }
}

/// Returns the winning strategy name and the candidate it picked. Candidates
/// are scanned in order, so within one strategy the earliest candidate wins.
pub fn first_match<'c, T>(
    strategies: &[Strategy<'_, T>],
    candidates: &'c [T],
) -> Option<(&'static str, &'c T)> {
    strategies.iter().find_map(|strategy| {
        candidates
            .iter()
            .find(|candidate| strategy.matches(candidate))
            .map(|candidate| (strategy.name, candidate))
    })
}
