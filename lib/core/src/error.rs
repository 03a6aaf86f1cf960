//! Error handling foundation for obsidian-log.
//!
//! This module provides only the `Result` type alias using rootcause.
//! Each crate defines its own domain-specific error enum and uses it as the
//! report context at its public boundaries.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Failure;

    impl fmt::Display for Failure {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "something failed")
        }
    }

    impl std::error::Error for Failure {}

    fn fails() -> Result<(), Failure> {
        Err(Failure.into())
    }

    #[test]
    fn result_type_works() {
        let ok: Result<i32> = Ok(42);
        assert_eq!(ok.expect("should be ok"), 42);
    }

    #[test]
    fn report_carries_context_message() {
        let err = fails().unwrap_err();
        assert!(err.to_string().contains("something failed"));
    }
}
