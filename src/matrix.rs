use crate::process::{PipelineError, RawSimulation, RawSite, SubpopPair, PLOIDY};

use ndarray::{Array2, Array3};

/// Genotype calls for one sub-population of one simulation, shaped
/// [site, individual, ploidy]. Derived from raw rows per statistic call,
/// never persisted.
#[derive(Debug, Clone)]
pub struct GenotypeMatrix {
    data: Array3<u8>,
}

impl GenotypeMatrix {
    pub fn n_sites(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn n_individuals(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn call(&self, site: usize, individual: usize, copy: usize) -> u8 {
        self.data[[site, individual, copy]]
    }

    /// The [site, haplotype] view used by the EHH scans: each diploid
    /// individual contributes two haplotype columns.
    pub fn haplotypes(&self) -> Array2<u8> {
        let n_sites = self.n_sites();
        let n_haps = self.n_individuals() * PLOIDY;
        let mut out = Array2::zeros((n_sites, n_haps));
        for s in 0..n_sites {
            for i in 0..self.n_individuals() {
                for p in 0..PLOIDY {
                    out[[s, i * PLOIDY + p]] = self.data[[s, i, p]];
                }
            }
        }
        out
    }
}

/// A simulation after loading: per-sub-population matrices plus the
/// surviving site metadata, row-aligned with the matrices.
#[derive(Debug, Clone)]
pub struct LoadedSimulation {
    pub name: String,
    pub positions: Vec<i64>,
    pub sites: Vec<RawSite>,
    pub pop1: GenotypeMatrix,
    pub pop2: GenotypeMatrix,
    pub masked_monomorphic: usize,
}

fn malformed(sim: &str, reason: String) -> PipelineError {
    PipelineError::MalformedSimulation {
        sim: sim.to_string(),
        reason,
    }
}

/// Splits a simulation's flattened calls into one genotype matrix per
/// sub-population, masking monomorphic sites.
///
/// A site is monomorphic when the summed calls across all individuals of
/// both sub-populations equal 0 or the total number of call slots; such
/// sites carry no population-genetic information and are dropped while
/// keeping the surviving rows aligned with their site metadata.
pub fn load_subpop_matrices(
    sim: &RawSimulation,
    pair: &SubpopPair,
) -> Result<LoadedSimulation, PipelineError> {
    let (range1, range2) = pair.column_ranges();
    if range1.len() % PLOIDY != 0 || range2.len() % PLOIDY != 0 {
        return Err(malformed(
            &sim.name,
            format!(
                "sub-population column ranges ({}, {}) are not diploid-aligned",
                range1.len(),
                range2.len()
            ),
        ));
    }
    let total = pair.total_call_columns();

    let mut kept_sites: Vec<RawSite> = Vec::with_capacity(sim.sites.len());
    let mut positions: Vec<i64> = Vec::with_capacity(sim.sites.len());
    let mut flat1: Vec<u8> = Vec::with_capacity(sim.sites.len() * range1.len());
    let mut flat2: Vec<u8> = Vec::with_capacity(sim.sites.len() * range2.len());
    let mut masked = 0usize;
    let mut last_pos = i64::MIN;

    for site in &sim.sites {
        if site.calls.len() != total {
            return Err(malformed(
                &sim.name,
                format!(
                    "site {} has {} calls, expected {}",
                    site.position,
                    site.calls.len(),
                    total
                ),
            ));
        }
        if site.position < last_pos {
            return Err(malformed(
                &sim.name,
                format!("site positions not in order at {}", site.position),
            ));
        }
        last_pos = site.position;
        if let Some(bad) = site.calls.iter().find(|&&c| c as usize > 2) {
            return Err(malformed(
                &sim.name,
                format!("allele index {} at site {} out of range", bad, site.position),
            ));
        }

        let call_sum: usize = site.calls.iter().map(|&c| c as usize).sum();
        if call_sum == 0 || call_sum == total {
            // Fixed for the reference or the alternate across every call
            // slot: no variation to measure, mask the site out.
            masked += 1;
            continue;
        }

        flat1.extend_from_slice(&site.calls[range1.clone()]);
        flat2.extend_from_slice(&site.calls[range2.clone()]);
        positions.push(site.position);
        kept_sites.push(site.clone());
    }

    let n_kept = kept_sites.len();
    let pop1 = Array3::from_shape_vec((n_kept, pair.pop1.samples, PLOIDY), flat1)
        .map_err(|e| malformed(&sim.name, format!("pop1 matrix shape: {}", e)))?;
    let pop2 = Array3::from_shape_vec((n_kept, pair.pop2.samples, PLOIDY), flat2)
        .map_err(|e| malformed(&sim.name, format!("pop2 matrix shape: {}", e)))?;

    Ok(LoadedSimulation {
        name: sim.name.clone(),
        positions,
        sites: kept_sites,
        pop1: GenotypeMatrix { data: pop1 },
        pop2: GenotypeMatrix { data: pop2 },
        masked_monomorphic: masked,
    })
}

/// Per-site allele counts over the individual and ploidy dimensions of one
/// sub-population's genotype matrix. Index 0 is the reference allele,
/// 1 and 2 the alternates. No normalization; Fst and iHS standardization
/// consume the raw counts.
pub fn count_alleles(matrix: &GenotypeMatrix) -> Vec<[u32; 3]> {
    let mut counts = Vec::with_capacity(matrix.n_sites());
    for s in 0..matrix.n_sites() {
        let mut ac = [0u32; 3];
        for i in 0..matrix.n_individuals() {
            for p in 0..PLOIDY {
                ac[matrix.call(s, i, p) as usize] += 1;
            }
        }
        counts.push(ac);
    }
    counts
}
