use super::HostError;
use std::fmt;
use std::panic::Location;

/// One link of a [`WrappableError`] chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEntry {
    pub error: HostError,
    pub location: &'static Location<'static>,
    pub info: Vec<String>,
}

impl ErrorEntry {
    #[track_caller]
    fn new(error: HostError, info: Vec<String>) -> Self {
        Self {
            error,
            location: Location::caller(),
            info,
        }
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}:{}]", self.error, self.location.file(), self.location.line())?;
        if !self.info.is_empty() {
            write!(f, " ({})", self.info.join(", "))?;
        }
        Ok(())
    }
}

/// Append-only error chain, innermost cause first.
///
/// Wrapping never mutates: each `wrap_*` call returns a new chain and the
/// previous value stays valid. The chain is provenance for diagnostics only;
/// control flow always matches on the concrete [`HostError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappableError {
    base: ErrorEntry,
    wraps: Vec<ErrorEntry>,
}

impl WrappableError {
    /// Starts a one-element chain around a plain error.
    #[track_caller]
    pub fn wrap(error: HostError) -> Self {
        Self {
            base: ErrorEntry::new(error, Vec::new()),
            wraps: Vec::new(),
        }
    }

    #[track_caller]
    pub fn wrap_with_message(&self, message: impl Into<String>) -> Self {
        self.appended(ErrorEntry::new(HostError::Message(message.into()), Vec::new()))
    }

    #[track_caller]
    pub fn wrap_with_error(&self, error: HostError) -> Self {
        self.appended(ErrorEntry::new(error, Vec::new()))
    }

    #[track_caller]
    pub fn wrap_with_info(&self, error: HostError, info: Vec<String>) -> Self {
        self.appended(ErrorEntry::new(error, info))
    }

    fn appended(&self, entry: ErrorEntry) -> Self {
        let mut wraps = self.wraps.clone();
        wraps.push(entry);
        Self {
            base: self.base.clone(),
            wraps,
        }
    }

    pub fn base_error(&self) -> &HostError {
        &self.base.error
    }

    pub fn last_error(&self) -> &HostError {
        &self.last_entry().error
    }

    /// Most recent wrap that is not a free-form message, falling back to the base.
    pub fn last_meaningful_error(&self) -> &HostError {
        self.wraps
            .iter()
            .rev()
            .map(|entry| &entry.error)
            .find(|error| !matches!(error, HostError::Message(_)))
            .unwrap_or(&self.base.error)
    }

    pub fn last_entry(&self) -> &ErrorEntry {
        self.wraps.last().unwrap_or(&self.base)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ErrorEntry> {
        std::iter::once(&self.base).chain(self.wraps.iter())
    }

    pub fn errors(&self) -> impl Iterator<Item = &HostError> {
        self.entries().map(|entry| &entry.error)
    }

    pub fn len(&self) -> usize {
        1 + self.wraps.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// True if any link of the chain equals `target`.
    pub fn is(&self, target: &HostError) -> bool {
        self.errors().any(|error| error == target)
    }
}

impl fmt::Display for WrappableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for entry in self.wraps.iter().rev().chain(std::iter::once(&self.base)) {
            if !first {
                write!(f, " <- ")?;
            }
            write!(f, "{}", entry)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for WrappableError {}

impl From<HostError> for WrappableError {
    #[track_caller]
    fn from(error: HostError) -> Self {
        WrappableError::wrap(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_keeps_order_base_and_last() {
        let err_a = HostError::SignalError("a".into());
        let err_b = HostError::NotEnoughGas;
        let err_c = HostError::MemoryLimit;

        let chain = WrappableError::wrap(err_a.clone())
            .wrap_with_message("L2")
            .wrap_with_error(err_b.clone());

        assert_eq!(chain.base_error(), &err_a);
        assert_eq!(chain.last_error(), &err_b);
        let errors: Vec<&HostError> = chain.errors().collect();
        assert_eq!(
            errors,
            vec![&err_a, &HostError::Message("L2".into()), &err_b]
        );
        assert!(chain.is(&err_a));
        assert!(chain.is(&err_b));
        assert!(!chain.is(&err_c));
    }

    #[test]
    fn wrapping_leaves_previous_value_intact() {
        let first = WrappableError::wrap(HostError::NotEnoughGas);
        let second = first.wrap_with_message("while storing");
        let third = second.wrap_with_error(HostError::ExecutionFailed("outer".into()));

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 2);
        assert_eq!(third.len(), 3);
        assert_eq!(first.last_error(), &HostError::NotEnoughGas);
        assert_eq!(second.last_error(), &HostError::Message("while storing".into()));
    }

    #[test]
    fn last_meaningful_error_skips_messages() {
        let chain = WrappableError::wrap(HostError::NotEnoughGas)
            .wrap_with_error(HostError::SignalError("user".into()))
            .wrap_with_message("context");
        assert_eq!(
            chain.last_meaningful_error(),
            &HostError::SignalError("user".into())
        );
    }

    #[test]
    fn entries_record_the_wrap_site() {
        let chain = WrappableError::wrap(HostError::MemoryLimit);
        assert!(chain.last_entry().location.file().ends_with("wrappable.rs"));
        assert!(chain.to_string().contains("memory limit reached"));
    }
}
