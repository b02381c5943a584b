//! FIFO chain of TCL commands making up a multi-step hardware procedure.
//!
//! Commands are consumed strictly front-to-back, one per response; the chain
//! never yields a command twice.

use std::collections::VecDeque;

#[derive(Debug, Default, Clone)]
pub struct CommandChain {
    chain: VecDeque<String>,
}

impl CommandChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append, so a fixed procedure reads as one expression.
    pub fn append(mut self, command: impl Into<String>) -> Self {
        self.chain.push_back(command.into());
        self
    }

    /// Pop the next unconsumed command; `None` once exhausted, forever.
    pub fn advance(&mut self) -> Option<String> {
        self.chain.pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_in_order_then_exhausted() {
        let mut chain = CommandChain::new().append("a").append("b").append("c");
        assert_eq!(chain.remaining(), 3);
        assert_eq!(chain.advance().as_deref(), Some("a"));
        assert_eq!(chain.advance().as_deref(), Some("b"));
        assert_eq!(chain.advance().as_deref(), Some("c"));
        assert_eq!(chain.advance(), None);
        // exhausted stays exhausted
        assert_eq!(chain.advance(), None);
        assert!(chain.is_empty());
    }

    #[test]
    fn test_empty_chain_is_exhausted() {
        let mut chain = CommandChain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.advance(), None);
    }
}
