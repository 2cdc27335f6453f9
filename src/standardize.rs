use crate::process::PipelineError;

use std::collections::BTreeMap;

/// Why a standardization pass could not produce a column.
#[derive(Debug, thiserror::Error)]
pub enum StandardizeError {
    /// No finite input values at all. The caller must treat the whole
    /// column as missing rather than receive silent zeros.
    #[error("no finite values to standardize")]
    AllMissing,
    /// An allele-count bin ended up too small or degenerate for a stable
    /// mean/deviation estimate. Calibration output becomes ground truth
    /// downstream, so this is a hard stop.
    #[error("unstable allele-count bin [{lo}, {hi}]: {reason}")]
    UnstableBin { lo: u32, hi: u32, reason: String },
}

impl From<StandardizeError> for PipelineError {
    fn from(e: StandardizeError) -> Self {
        PipelineError::CorpusIncomplete(e.to_string())
    }
}

struct Bin {
    lo: u32,
    hi: u32,
    site_indices: Vec<usize>,
}

/// Rescales raw iHS values into z-like scores within contiguous bins of
/// matched derived-allele count, removing the frequency dependence of the
/// statistic's variance.
///
/// Bins are built by merging adjacent allele counts until each holds at
/// least `min_bin_size` finite values (the trailing bin merges backwards).
/// Must run over the full corpus: a single simulation does not have enough
/// sites per bin. Missing inputs stay missing in the output.
pub fn standardize_by_allele_count(
    values: &[Option<f64>],
    derived_counts: &[u32],
    min_bin_size: usize,
) -> Result<Vec<Option<f64>>, StandardizeError> {
    assert_eq!(values.len(), derived_counts.len());

    let finite_total = values
        .iter()
        .filter(|v| matches!(v, Some(x) if x.is_finite()))
        .count();
    if finite_total == 0 {
        return Err(StandardizeError::AllMissing);
    }

    // Group site indices by derived-allele count, ascending.
    let mut by_count: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (idx, &c) in derived_counts.iter().enumerate() {
        by_count.entry(c).or_default().push(idx);
    }

    let finite_in = |indices: &[usize]| {
        indices
            .iter()
            .filter(|&&i| matches!(values[i], Some(x) if x.is_finite()))
            .count()
    };

    let mut bins: Vec<Bin> = Vec::new();
    let mut current: Option<Bin> = None;
    let mut current_finite = 0usize;
    for (&count, indices) in &by_count {
        let bin = current.get_or_insert(Bin {
            lo: count,
            hi: count,
            site_indices: Vec::new(),
        });
        bin.hi = count;
        bin.site_indices.extend_from_slice(indices);
        current_finite += finite_in(indices);
        if current_finite >= min_bin_size {
            if let Some(full) = current.take() {
                bins.push(full);
            }
            current_finite = 0;
        }
    }
    if let Some(tail) = current {
        // Short trailing bin folds into the previous one. No previous bin
        // means the whole corpus holds fewer finite values than one bin,
        // which cannot yield a stable estimate.
        match bins.last_mut() {
            Some(prev) => {
                prev.hi = tail.hi;
                prev.site_indices.extend(tail.site_indices);
            }
            None => {
                return Err(StandardizeError::UnstableBin {
                    lo: tail.lo,
                    hi: tail.hi,
                    reason: format!(
                        "{} finite value(s) in the whole corpus, need {}",
                        finite_in(&tail.site_indices),
                        min_bin_size
                    ),
                });
            }
        }
    }

    let mut out: Vec<Option<f64>> = vec![None; values.len()];
    for bin in &bins {
        let finite: Vec<f64> = bin
            .site_indices
            .iter()
            .filter_map(|&i| values[i].filter(|x| x.is_finite()))
            .collect();
        if finite.is_empty() {
            // Every member of this bin is already missing; nothing to scale.
            continue;
        }
        if finite.len() < 2 {
            return Err(StandardizeError::UnstableBin {
                lo: bin.lo,
                hi: bin.hi,
                reason: format!("{} finite value(s)", finite.len()),
            });
        }
        let n = finite.len() as f64;
        let mean = finite.iter().sum::<f64>() / n;
        let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let sd = var.sqrt();
        if sd == 0.0 {
            return Err(StandardizeError::UnstableBin {
                lo: bin.lo,
                hi: bin.hi,
                reason: "zero standard deviation".to_string(),
            });
        }
        for &i in &bin.site_indices {
            if let Some(v) = values[i].filter(|x| x.is_finite()) {
                out[i] = Some((v - mean) / sd);
            }
        }
    }
    Ok(out)
}
