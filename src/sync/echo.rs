//! Echo suppression
//!
//! When a value is pushed over a message-based channel, the client's model
//! changes and its forwarding code sends the very same value back. Names
//! pushed locally are recorded here and the next arrival of each is consumed
//! instead of being written to local state again.

use crate::state::PropertyMap;
use std::collections::{BTreeSet, HashSet};
use tracing::trace;

#[derive(Debug, Default)]
pub struct EchoSuppressor {
    expecting: HashSet<String>,
}

impl EchoSuppressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark property names whose next remote arrival is an echo
    pub fn expect<'a>(&mut self, names: impl IntoIterator<Item = &'a String>) {
        for name in names {
            self.expecting.insert(name.clone());
        }
    }

    /// Remove expected echoes from `msg`, consuming each marker once
    ///
    /// Returns the residual, genuinely remote-originated message.
    pub fn filter(&mut self, msg: PropertyMap) -> PropertyMap {
        msg.into_iter()
            .filter(|(name, _)| {
                let echo = self.expecting.remove(name);
                if echo {
                    trace!(property = %name, "Echo consumed");
                }
                !echo
            })
            .collect()
    }

    pub fn is_expecting(&self, name: &str) -> bool {
        self.expecting.contains(name)
    }

    pub fn snapshot(&self) -> BTreeSet<String> {
        self.expecting.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.expecting.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_echo_is_consumed_once() {
        let mut echo = EchoSuppressor::new();
        echo.expect(&["a".to_string()]);

        let mut msg = PropertyMap::new();
        msg.insert("a".to_string(), json!(true));
        assert!(echo.filter(msg.clone()).is_empty());
        assert!(echo.is_empty());

        // The next arrival is genuine
        assert_eq!(echo.filter(msg.clone()), msg);
    }

    #[test]
    fn test_residual_keeps_unexpected_keys() {
        let mut echo = EchoSuppressor::new();
        echo.expect(&["a".to_string(), "b".to_string()]);

        let mut msg = PropertyMap::new();
        msg.insert("a".to_string(), json!(1));
        msg.insert("c".to_string(), json!(2));

        let residual = echo.filter(msg);
        assert_eq!(residual.keys().collect::<Vec<_>>(), vec!["c"]);
        // Unmatched marker remains for the next arrival
        assert!(echo.is_expecting("b"));
        assert!(!echo.is_expecting("a"));
    }
}
