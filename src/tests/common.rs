use crate::footprint::Label;
use crate::process::{
    FootprintMode, PipelineConfig, RawSimulation, RawSite, SubpopPair, SubpopSpec,
};
use crate::store::StatRow;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub fn pair(samples1: usize, samples2: usize) -> SubpopPair {
    SubpopPair {
        pop1: SubpopSpec::new("afr", samples1),
        pop2: SubpopSpec::new("eur", samples2),
    }
}

pub fn site(position: i64, calls: Vec<u8>) -> RawSite {
    RawSite {
        position,
        vcf_row_id: ".".to_string(),
        reference: "A".to_string(),
        alts: vec!["T".to_string()],
        calls,
    }
}

/// Small config tuned for synthetic corpora: edges kept so short regions
/// still produce haplotype-decay values, and tiny standardization bins.
pub fn test_config(subpops: SubpopPair) -> PipelineConfig {
    PipelineConfig {
        subpops,
        sweep_position: 2_500_000,
        footprint: FootprintMode::Fixed(250_000),
        footprint_window: 500_000,
        batch_size: 50,
        include_edges: true,
        min_bin_size: 2,
    }
}

/// A polymorphic random simulation: every site carries at least two
/// ancestral and two derived calls in each sub-population, so the
/// statistics have something to work with.
pub fn random_simulation(name: &str, n_sites: usize, subpops: &SubpopPair, seed: u64) -> RawSimulation {
    let mut rng = StdRng::seed_from_u64(seed);
    let total = subpops.total_call_columns();
    let split = subpops.pop1.call_columns();
    let mut sites = Vec::with_capacity(n_sites);
    for s in 0..n_sites {
        let freq: f64 = rng.gen_range(0.3..0.7);
        let mut calls: Vec<u8> = (0..total)
            .map(|_| if rng.gen_bool(freq) { 1 } else { 0 })
            .collect();
        // Pin a few calls so no sub-population is ever fixed at this site.
        calls[0] = 0;
        calls[1] = 0;
        calls[2] = 1;
        calls[3] = 1;
        calls[split] = 0;
        calls[split + 1] = 0;
        calls[split + 2] = 1;
        calls[split + 3] = 1;
        sites.push(site(1_000 * (s as i64 + 1), calls));
    }
    RawSimulation {
        name: name.to_string(),
        sites,
    }
}

pub fn stat_row(simulation: &str, position: i64) -> StatRow {
    StatRow {
        simulation: simulation.to_string(),
        position,
        uniq_id: StatRow::make_uniq_id(simulation, position),
        reference: "A".to_string(),
        pop1_ac: [3, 1, 0],
        pop2_ac: [2, 2, 0],
        xpehh: Some(1.0),
        fst_num: 0.1,
        fst_den: 0.5,
        fst: Some(0.2),
        ihs_pop1: Some(-0.5),
        ihs_pop2: Some(0.5),
        ihs_pop1_std: None,
        ihs_pop2_std: None,
        label: Label::Neutral,
    }
}
