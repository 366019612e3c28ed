//! Detection of non-finite values.
//!
//! A motion field holding NaN or infinity produces NaN downstream on purpose;
//! these helpers make that observable. Nothing here rewrites values.

use ndarray::{ArrayBase, Data, Dimension};

/// Breakdown of non-finite entries in a map.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NonFiniteReport {
    pub nan: usize,
    pub pos_inf: usize,
    pub neg_inf: usize,
}

impl NonFiniteReport {
    pub fn scan<S, D>(values: &ArrayBase<S, D>) -> Self
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        let mut report = Self::default();
        for &v in values.iter() {
            if v.is_nan() {
                report.nan += 1;
            } else if v == f32::INFINITY {
                report.pos_inf += 1;
            } else if v == f32::NEG_INFINITY {
                report.neg_inf += 1;
            }
        }
        report
    }

    pub fn total(&self) -> usize {
        self.nan + self.pos_inf + self.neg_inf
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}

/// Number of NaN or infinite entries.
pub fn non_finite_count<S, D>(values: &ArrayBase<S, D>) -> usize
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    values.iter().filter(|v| !v.is_finite()).count()
}

pub fn is_all_finite<S, D>(values: &ArrayBase<S, D>) -> bool
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    values.iter().all(|v| v.is_finite())
}

/// Index pattern of the first non-finite entry in logical order.
pub fn first_non_finite<S, D>(values: &ArrayBase<S, D>) -> Option<D::Pattern>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    values
        .indexed_iter()
        .find(|(_, v)| !v.is_finite())
        .map(|(index, _)| index)
}
