// Shared helpers for the behavior and contract tests
pub use fundscreen_core::Symbol;

pub fn symbol(raw: &str) -> Symbol {
    Symbol::parse(raw).expect("valid symbol")
}

/// Asserts a derived value is available and equal to `expected` within float noise.
pub fn approx(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("value should be available");
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
