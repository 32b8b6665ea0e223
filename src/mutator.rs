//! Mutation channel: substitutions, deletions and tandem duplications.
//!
//! The channel reads the machine's emitted bases left to right. Before each
//! base it either emits it normally (possibly substituted), opens a deletion
//! that swallows it and possibly more bases, or first re-emits a copy of the
//! last few bases already emitted (a tandem duplication).

use crate::error::{DecodeError, Result};
use crate::utils::log_prob;

/// Index of a base in [`MutatorParams::alphabet`].
pub type Base = usize;

/// Observed sequence as base indices.
pub type TokSeq = Vec<Base>;

pub const DNA_ALPHABET: &str = "ACGT";

const SUM_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Debug, PartialEq)]
pub struct MutatorParams {
    pub alphabet: Vec<char>,
    pub p_del_open: f64,
    pub p_del_extend: f64,
    pub p_tan_dup: f64,
    /// `p_dup_len[k]` is the probability that a duplication copies `k + 1`
    /// bases. Its length is the duplication window.
    pub p_dup_len: Vec<f64>,
    /// `p_sub[a][b]` is the probability that emitted base `a` is observed as `b`.
    pub p_sub: Vec<Vec<f64>>,
}

impl Default for MutatorParams {
    fn default() -> Self {
        Self {
            alphabet: DNA_ALPHABET.chars().collect(),
            p_del_open: 0.01,
            p_del_extend: 0.1,
            p_tan_dup: 0.01,
            p_dup_len: vec![0.4, 0.3, 0.2, 0.1],
            p_sub: substitution_matrix(DNA_ALPHABET.len(), 0.01),
        }
    }
}

impl MutatorParams {
    /// Default alphabet and duplication window, with every mutation
    /// probability set to zero.
    pub fn noiseless() -> Self {
        Self {
            p_del_open: 0.0,
            p_del_extend: 0.0,
            p_tan_dup: 0.0,
            ..Self::default()
        }
        .with_substitution_rate(0.0)
    }

    /// Spread `rate` evenly over the off-diagonal substitutions.
    pub fn with_substitution_rate(mut self, rate: f64) -> Self {
        self.p_sub = substitution_matrix(self.alphabet.len(), rate);
        self
    }

    /// Longest duplication the channel can produce.
    #[inline]
    pub fn max_dup_len(&self) -> usize {
        self.p_dup_len.len()
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.alphabet.len();
        if n == 0 {
            return Err(invalid("alphabet is empty"));
        }
        for (i, c) in self.alphabet.iter().enumerate() {
            if self.alphabet[..i].contains(c) {
                return Err(invalid(format!("alphabet repeats '{c}'")));
            }
        }
        for (name, p) in [
            ("p_del_open", self.p_del_open),
            ("p_del_extend", self.p_del_extend),
            ("p_tan_dup", self.p_tan_dup),
        ] {
            check_prob(name, p)?;
        }
        if self.p_del_open + self.p_tan_dup > 1.0 + SUM_TOLERANCE {
            return Err(invalid("p_del_open + p_tan_dup exceeds 1"));
        }
        for &p in &self.p_dup_len {
            check_prob("p_dup_len", p)?;
        }
        if !self.p_dup_len.is_empty() {
            check_sum("p_dup_len", self.p_dup_len.iter().sum())?;
        }
        if self.p_sub.len() != n || self.p_sub.iter().any(|row| row.len() != n) {
            return Err(invalid(format!("p_sub must be {n}x{n}")));
        }
        for row in &self.p_sub {
            for &p in row {
                check_prob("p_sub", p)?;
            }
            check_sum("p_sub row", row.iter().sum())?;
        }
        Ok(())
    }

    /// Index of `c` in the alphabet, ignoring case.
    pub fn base_index(&self, c: char) -> Option<Base> {
        let c = c.to_ascii_uppercase();
        self.alphabet
            .iter()
            .position(|&a| a.to_ascii_uppercase() == c)
    }

    pub fn tokenize(&self, seq: &str) -> Result<TokSeq> {
        seq.chars()
            .enumerate()
            .map(|(pos, symbol)| {
                self.base_index(symbol)
                    .ok_or(DecodeError::UnknownBase { symbol, pos })
            })
            .collect()
    }
}

/// Log-space view of [`MutatorParams`], ready for the Viterbi fill.
#[derive(Clone, Debug, PartialEq)]
pub struct MutatorScores {
    /// Emit the next base normally.
    pub no_gap: f64,
    pub del_open: f64,
    pub del_extend: f64,
    pub del_end: f64,
    pub tan_dup: f64,
    pub dup_len: Vec<f64>,
    pub sub: Vec<Vec<f64>>,
}

impl MutatorScores {
    pub fn new(params: &MutatorParams) -> Self {
        Self {
            no_gap: log_prob(1.0 - params.p_del_open - params.p_tan_dup),
            del_open: log_prob(params.p_del_open),
            del_extend: log_prob(params.p_del_extend),
            del_end: log_prob(1.0 - params.p_del_extend),
            tan_dup: log_prob(params.p_tan_dup),
            dup_len: params.p_dup_len.iter().map(|&p| log_prob(p)).collect(),
            sub: params
                .p_sub
                .iter()
                .map(|row| row.iter().map(|&p| log_prob(p)).collect())
                .collect(),
        }
    }
}

fn substitution_matrix(n: usize, rate: f64) -> Vec<Vec<f64>> {
    let off = if n > 1 { rate / (n - 1) as f64 } else { 0.0 };
    (0..n)
        .map(|a| {
            (0..n)
                .map(|b| if a == b { 1.0 - rate } else { off })
                .collect()
        })
        .collect()
}

fn invalid(msg: impl Into<String>) -> DecodeError {
    DecodeError::InvalidParameter(msg.into())
}

fn check_prob(name: &str, p: f64) -> Result<()> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(invalid(format!("{name} = {p} is not a probability")))
    }
}

fn check_sum(name: &str, total: f64) -> Result<()> {
    if (total - 1.0).abs() <= SUM_TOLERANCE {
        Ok(())
    } else {
        Err(invalid(format!("{name} sums to {total}, expected 1")))
    }
}
