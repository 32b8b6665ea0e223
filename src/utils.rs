//! Assorted helpers shared by the decoders.

use std::fmt::Display;

/// Natural log of a probability; `ln(0) = -inf`.
#[inline]
pub fn log_prob(p: f64) -> f64 {
    if p <= 0.0 {
        f64::NEG_INFINITY
    } else {
        p.ln()
    }
}

/// Render a symbol queue for diagnostics, `"empty"` when there is nothing.
pub fn join_symbols<'a, T, I>(symbols: I) -> String
where
    T: Display + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let s: String = symbols.into_iter().map(|sym| sym.to_string()).collect();
    if s.is_empty() {
        "empty".to_string()
    } else {
        s
    }
}

/// `"1 bit"`, `"3 bits"`.
pub fn plural(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

/// Length of the longest common suffix of two slices.
pub fn common_suffix_len<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}
