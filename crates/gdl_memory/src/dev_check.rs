//! Development-only invariant checks.
//!
//! `dev_check!(condition, error)` returns `Err(error)` from the enclosing
//! function when `condition` holds. With the `dev-checks` feature disabled the
//! condition is never evaluated and the check compiles to nothing.

macro_rules! dev_check {
    ($condition:expr, $error:expr) => {
        if cfg!(feature = "dev-checks") && $condition {
            return Err($error);
        }
    };
}

pub(crate) use dev_check;
