//! Shared proptest configuration.
//!
//! The default case count depends on the test tier selected through Cargo
//! features, and `PROPTEST_CASES` overrides it:
//!
//! | Tier     | Feature Flag  | Default Cases |
//! |----------|---------------|---------------|
//! | Fast     | `test-fast`   | 10            |
//! | Standard | (default)     | 50            |
//! | Full     | `test-full`   | 500           |
//!
//! Async property tests drive a `TestRunner` from a single runtime:
//!
//! ```ignore
//! use proptest::{prelude::*, test_runner::TestRunner};
//! use streamdef_test_fixtures::proptest_config::proptest_config;
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! let mut runner = TestRunner::new(proptest_config());
//! runner
//!     .run(&any::<u8>(), |_input| {
//!         rt.block_on(async { /* test */ });
//!         Ok(())
//!     })
//!     .unwrap();
//! ```

use proptest::test_runner::Config as ProptestConfig;

/// Test execution tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Fast,
    Standard,
    Full,
}

impl Tier {
    #[must_use]
    pub const fn proptest_cases(self) -> u32 {
        match self {
            Self::Fast => 10,
            Self::Standard => 50,
            Self::Full => 500,
        }
    }
}

/// Tier selected by Cargo features; `test-full` wins over `test-fast`.
#[must_use]
pub const fn current_tier() -> Tier {
    if cfg!(feature = "test-full") {
        Tier::Full
    } else if cfg!(feature = "test-fast") {
        Tier::Fast
    } else {
        Tier::Standard
    }
}

pub const DEFAULT_PROPTEST_CASES: u32 = current_tier().proptest_cases();

/// Number of cases to run, honouring `PROPTEST_CASES`.
#[must_use]
pub fn test_cases() -> u32 {
    std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_PROPTEST_CASES)
}

#[must_use]
pub fn proptest_config() -> ProptestConfig {
    ProptestConfig::with_cases(test_cases())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_cases() {
        assert_eq!(Tier::Fast.proptest_cases(), 10);
        assert_eq!(Tier::Standard.proptest_cases(), 50);
        assert_eq!(Tier::Full.proptest_cases(), 500);
        assert_eq!(DEFAULT_PROPTEST_CASES, current_tier().proptest_cases());
    }

    #[test]
    fn test_proptest_config_creation() {
        assert!(proptest_config().cases > 0);
    }
}
