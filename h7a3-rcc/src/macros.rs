#![macro_use]

/// `?` for `const fn`: early-returns the error of a `Result` whose `Ok` and `Err`
/// types are `Copy`.
macro_rules! const_try {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return Err(e),
        }
    };
}
