//! Runtime token space: a scratch stack used to trace the flow of tokens
//! (source fragments, AST nodes, blobs) through a playground session.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenSpaceError {
    #[error("stack is empty")]
    Empty,
}

/// Keys that signal a caller wants a token space attached.
pub const TOKEN_SPACE_KEYS: &[&str] = &[
    "token_space",
    "SimpleTokenStack",
    "Token",
    "tokens",
    "token_stack",
    "blob",
    "AST",
    ".py",
    ".md",
];

/// Push/pop/peek storage for tokens.
pub trait TokenSpace<T> {
    fn push(&mut self, item: T);
    fn pop(&mut self) -> Result<T, TokenSpaceError>;
    fn peek(&self) -> Result<&T, TokenSpaceError>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Vec-backed LIFO [`TokenSpace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStack<T> {
    items: Vec<T>,
}

impl<T> Default for TokenStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TokenStack<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> TokenSpace<T> for TokenStack<T> {
    fn push(&mut self, item: T) {
        self.items.push(item);
    }

    fn pop(&mut self) -> Result<T, TokenSpaceError> {
        self.items.pop().ok_or(TokenSpaceError::Empty)
    }

    fn peek(&self) -> Result<&T, TokenSpaceError> {
        self.items.last().ok_or(TokenSpaceError::Empty)
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A fresh stack if any of `keys` is in [`TOKEN_SPACE_KEYS`], else `None`.
pub fn token_space_for<T, K>(keys: impl IntoIterator<Item = K>) -> Option<TokenStack<T>>
where
    K: AsRef<str>,
{
    keys.into_iter()
        .any(|k| TOKEN_SPACE_KEYS.contains(&k.as_ref()))
        .then(TokenStack::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifo_order() {
        let mut s = TokenStack::new();
        s.push("a");
        s.push("b");
        s.push("c");
        assert_eq!(s.len(), 3);
        assert_eq!(*s.peek().unwrap(), "c");
        assert_eq!(s.pop().unwrap(), "c");
        assert_eq!(s.pop().unwrap(), "b");
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn empty_stack_errors() {
        let mut s: TokenStack<u8> = TokenStack::new();
        assert!(s.is_empty());
        assert_eq!(s.pop(), Err(TokenSpaceError::Empty));
        assert_eq!(s.peek(), Err(TokenSpaceError::Empty));
    }

    #[test]
    fn peek_does_not_remove() {
        let mut s = TokenStack::new();
        s.push(1);
        assert_eq!(*s.peek().unwrap(), 1);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn recognised_keys_yield_empty_stack() {
        let s: Option<TokenStack<String>> = token_space_for(["unrelated", "AST"]);
        assert!(s.unwrap().is_empty());
        assert!(token_space_for::<String, _>([".md"]).is_some());
    }

    #[test]
    fn unrecognised_keys_yield_none() {
        assert!(token_space_for::<String, _>(["ast", "md", "stack"]).is_none());
        assert!(token_space_for::<String, &str>([]).is_none());
    }
}
