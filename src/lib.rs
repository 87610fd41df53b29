pub mod acl;
pub mod config;
pub mod error;
pub mod identity;
pub mod schema;
pub mod server;
pub mod storage;

pub use acl::{Gatekeeper, Operation, OperationOutcome, OperationRequest};
pub use error::{AppError, AppResult, FieldError};

// Test-only printing helper: expands to eprintln! during tests and debug builds.
// Usage: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In non-test builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        // Preserve formatting checks in release without producing code
        if false { let _ = format!($($arg)*); }
    });
}
