use ndarray::ArrayView2;
use rayon::prelude::*;
use std::collections::HashMap;

/// Tuning for the haplotype-decay scans.
#[derive(Debug, Clone, Copy)]
pub struct EhhParams {
    /// Stop integrating once extended haplotype homozygosity decays below
    /// this threshold.
    pub min_ehh: f64,
    /// A gap between adjacent sites larger than this truncates the scan as
    /// if the region edge had been reached.
    pub max_gap: i64,
    /// Whether a scan that reaches the region edge before full decay keeps
    /// its partial integral. Excluding edges avoids truncation bias.
    pub include_edges: bool,
}

impl Default for EhhParams {
    fn default() -> Self {
        EhhParams {
            min_ehh: 0.05,
            max_gap: 200_000,
            include_edges: false,
        }
    }
}

/// Why a per-site statistic could not be computed. Recorded per site and
/// per sub-population; never aborts a simulation or batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatFailure {
    /// The denominator haplotype integral was zero.
    DivisionByZero,
    /// Too few haplotypes on one allele background to measure decay.
    DegenerateHaplotypes,
    /// The scan hit the region edge before decaying and edges are excluded.
    EdgeTruncated,
}

pub type SiteStat = Result<f64, StatFailure>;

/// Integrated EHH on one side of the core site for the haplotype columns in
/// `haps`. Walks outward refining identity classes and accumulating the
/// trapezoid integral of EHH over physical distance.
fn ihh_one_side(
    h: &ArrayView2<u8>,
    positions: &[i64],
    core: usize,
    haps: &[usize],
    step: isize,
    params: &EhhParams,
) -> SiteStat {
    let n = haps.len();
    if n < 2 {
        return Err(StatFailure::DegenerateHaplotypes);
    }
    let n_sites = positions.len() as isize;
    let pair_total = (n * (n - 1)) as f64;

    // Identity classes: haplotypes sharing an extended haplotype from the
    // core out to the current site carry the same class id.
    let mut classes: Vec<u32> = vec![0; n];
    let mut ihh = 0.0f64;
    let mut ehh_prev = 1.0f64;
    let mut pos_prev = positions[core];
    let mut next_class = 1u32;

    let mut j = core as isize + step;
    loop {
        if j < 0 || j >= n_sites {
            // Region edge reached before decay completed.
            return if params.include_edges {
                Ok(ihh)
            } else {
                Err(StatFailure::EdgeTruncated)
            };
        }
        let ju = j as usize;
        let gap = (positions[ju] - pos_prev).abs();
        if gap > params.max_gap {
            return if params.include_edges {
                Ok(ihh)
            } else {
                Err(StatFailure::EdgeTruncated)
            };
        }

        // Refine classes by the allele observed at this site.
        let mut seen: HashMap<(u32, u8), u32> = HashMap::with_capacity(n);
        for (slot, &hap) in haps.iter().enumerate() {
            let key = (classes[slot], h[[ju, hap]]);
            let id = *seen.entry(key).or_insert_with(|| {
                let id = next_class;
                next_class += 1;
                id
            });
            classes[slot] = id;
        }

        let mut sizes: HashMap<u32, usize> = HashMap::with_capacity(n);
        for &c in &classes {
            *sizes.entry(c).or_insert(0) += 1;
        }
        let same_pairs: usize = sizes.values().map(|&c| c * (c - 1)).sum();
        let ehh_cur = same_pairs as f64 / pair_total;

        ihh += 0.5 * (ehh_prev + ehh_cur) * gap as f64;
        if ehh_cur < params.min_ehh {
            return Ok(ihh);
        }
        ehh_prev = ehh_cur;
        pos_prev = positions[ju];
        j += step;
    }
}

/// Integrated EHH over both flanks for one haplotype subset.
fn ihh_both_sides(
    h: &ArrayView2<u8>,
    positions: &[i64],
    core: usize,
    haps: &[usize],
    params: &EhhParams,
) -> SiteStat {
    let left = ihh_one_side(h, positions, core, haps, -1, params)?;
    let right = ihh_one_side(h, positions, core, haps, 1, params)?;
    Ok(left + right)
}

/// Unstandardized iHS for every site of one sub-population's haplotype
/// matrix: ln(iHH_derived / iHH_ancestral) at each core site. Sites where
/// the ancestral integral is zero or either allele background has fewer
/// than two carriers come back as typed failures.
pub fn ihs_scan(h: &ArrayView2<u8>, positions: &[i64], params: &EhhParams) -> Vec<SiteStat> {
    let n_haps = h.shape()[1];
    (0..positions.len())
        .into_par_iter()
        .map(|core| {
            let mut ancestral: Vec<usize> = Vec::new();
            let mut derived: Vec<usize> = Vec::new();
            for hap in 0..n_haps {
                match h[[core, hap]] {
                    0 => ancestral.push(hap),
                    1 => derived.push(hap),
                    _ => {}
                }
            }
            if ancestral.len() < 2 || derived.len() < 2 {
                return Err(StatFailure::DegenerateHaplotypes);
            }
            let ihh0 = ihh_both_sides(h, positions, core, &ancestral, params)?;
            let ihh1 = ihh_both_sides(h, positions, core, &derived, params)?;
            if ihh0 == 0.0 || ihh1 == 0.0 {
                return Err(StatFailure::DivisionByZero);
            }
            Ok((ihh1 / ihh0).ln())
        })
        .collect()
}

/// Cross-population EHH for every site: ln(iHH_pop1 / iHH_pop2), each
/// population's haplotypes scanned whole (no allele split at the core).
pub fn xpehh_scan(
    h1: &ArrayView2<u8>,
    h2: &ArrayView2<u8>,
    positions: &[i64],
    params: &EhhParams,
) -> Vec<SiteStat> {
    let haps1: Vec<usize> = (0..h1.shape()[1]).collect();
    let haps2: Vec<usize> = (0..h2.shape()[1]).collect();
    (0..positions.len())
        .into_par_iter()
        .map(|core| {
            let ihh1 = ihh_both_sides(h1, positions, core, &haps1, params)?;
            let ihh2 = ihh_both_sides(h2, positions, core, &haps2, params)?;
            if ihh1 == 0.0 || ihh2 == 0.0 {
                return Err(StatFailure::DivisionByZero);
            }
            Ok((ihh1 / ihh2).ln())
        })
        .collect()
}

/// Hudson Fst variance components per site from the two sub-populations'
/// allele counts: (numerator, denominator) of the between/total ratio.
/// The per-site ratio and the aggregate answer different questions; use
/// `hudson_fst_aggregate` for whole-region divergence.
pub fn hudson_fst_per_site(ac1: &[[u32; 3]], ac2: &[[u32; 3]]) -> Vec<(f64, f64)> {
    ac1.iter()
        .zip(ac2.iter())
        .map(|(a1, a2)| hudson_fst_components(a1, a2))
        .collect()
}

fn hudson_fst_components(ac1: &[u32; 3], ac2: &[u32; 3]) -> (f64, f64) {
    let an1: u32 = ac1.iter().sum();
    let an2: u32 = ac2.iter().sum();
    if an1 < 2 || an2 < 2 {
        return (f64::NAN, f64::NAN);
    }
    let p1 = ac1[1] as f64 / an1 as f64;
    let p2 = ac2[1] as f64 / an2 as f64;
    let num = (p1 - p2).powi(2)
        - p1 * (1.0 - p1) / (an1 as f64 - 1.0)
        - p2 * (1.0 - p2) / (an2 as f64 - 1.0);
    let den = p1 * (1.0 - p2) + p2 * (1.0 - p1);
    (num, den)
}

/// Aggregate Hudson Fst over a region: sum of numerators over sum of
/// denominators, skipping sites whose components could not be computed.
pub fn hudson_fst_aggregate(components: &[(f64, f64)]) -> Option<f64> {
    let mut num_sum = 0.0;
    let mut den_sum = 0.0;
    for &(num, den) in components {
        if num.is_finite() && den.is_finite() {
            num_sum += num;
            den_sum += den;
        }
    }
    if den_sum == 0.0 {
        None
    } else {
        Some(num_sum / den_sum)
    }
}
