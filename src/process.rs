use crate::footprint::Label;
use crate::matrix::{count_alleles, load_subpop_matrices};
use crate::progress::{
    finish_step_progress, init_step_progress, log, set_stage, update_step_progress, LogLevel,
    ProcessingStage,
};
use crate::stats::{hudson_fst_per_site, ihs_scan, xpehh_scan, EhhParams};
use crate::store::{StatRow, StatStore};

use std::time::{Duration, Instant};

/// Fixed ploidy for all simulated individuals.
pub const PLOIDY: usize = 2;

/// One variant site as it comes off the simulator: position, allele metadata
/// and the flattened genotype calls for every individual of every
/// sub-population (sub-population-major, `PLOIDY` calls per individual).
#[derive(Debug, Clone, PartialEq)]
pub struct RawSite {
    pub position: i64,
    pub vcf_row_id: String,
    pub reference: String,
    pub alts: Vec<String>,
    pub calls: Vec<u8>,
}

/// All sites of one simulation, ordered by position.
#[derive(Debug, Clone)]
pub struct RawSimulation {
    pub name: String,
    pub sites: Vec<RawSite>,
}

/// A named sub-population and its configured diploid sample count.
#[derive(Debug, Clone)]
pub struct SubpopSpec {
    pub name: String,
    pub samples: usize,
}

impl SubpopSpec {
    pub fn new(name: &str, samples: usize) -> Self {
        SubpopSpec {
            name: name.to_string(),
            samples,
        }
    }

    /// Number of flattened call columns this sub-population occupies.
    pub fn call_columns(&self) -> usize {
        self.samples * PLOIDY
    }
}

/// The two sub-populations contrasted by the cross-population statistics.
/// `pop1` is the population under selection pressure, `pop2` the reference.
#[derive(Debug, Clone)]
pub struct SubpopPair {
    pub pop1: SubpopSpec,
    pub pop2: SubpopSpec,
}

impl SubpopPair {
    pub fn total_call_columns(&self) -> usize {
        self.pop1.call_columns() + self.pop2.call_columns()
    }

    /// Half-open ranges of flattened call columns for each sub-population.
    pub fn column_ranges(&self) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
        let split = self.pop1.call_columns();
        (0..split, split..self.total_call_columns())
    }
}

/// Where the sweep-footprint radius comes from: a locked value reused across
/// re-labeling passes, or a fresh fit against the current corpus. This is an
/// explicit configuration decision, never an implicit default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FootprintMode {
    Fixed(i64),
    Derive,
}

/// Explicit configuration for one pipeline run. No module-level mutable
/// state: everything the core needs is passed in here.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub subpops: SubpopPair,
    pub sweep_position: i64,
    pub footprint: FootprintMode,
    pub footprint_window: i64,
    pub batch_size: usize,
    pub include_edges: bool,
    pub min_bin_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            subpops: SubpopPair {
                pop1: SubpopSpec::new("afr", 100),
                pop2: SubpopSpec::new("eur", 100),
            },
            sweep_position: 2_500_000,
            footprint: FootprintMode::Derive,
            footprint_window: 500_000,
            batch_size: 50,
            include_edges: false,
            min_bin_size: 100,
        }
    }
}

impl PipelineConfig {
    pub fn ehh_params(&self) -> EhhParams {
        EhhParams {
            include_edges: self.include_edges,
            ..EhhParams::default()
        }
    }
}

// Custom error types
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("No VCF files found in {0}")]
    NoVcfFiles(String),
    #[error("Malformed simulation {sim}: {reason}")]
    MalformedSimulation { sim: String, reason: String },
    #[error("Corpus incomplete: {0}")]
    CorpusIncomplete(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Source of raw simulation data. The simulators themselves are external;
/// the pipeline only needs the ordered id list and batch-wise loading.
pub trait SimulationSource {
    /// Distinct simulation identifiers, in a stable order.
    fn simulation_ids(&self) -> Result<Vec<String>, PipelineError>;

    /// Load the raw rows for exactly the given simulations.
    fn load(&self, ids: &[String]) -> Result<Vec<RawSimulation>, PipelineError>;
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub batches_committed: usize,
    pub batches_failed: usize,
    pub simulations_processed: usize,
    pub simulations_skipped: usize,
    pub sites_masked_monomorphic: usize,
    pub rows_written: usize,
    pub elapsed: Duration,
}

/// Partitions the ordered simulation ids into batches. The final batch takes
/// the remainder, so no batch is empty and every id lands in exactly one.
pub fn partition_batches<'a>(ids: &'a [String], batch_size: usize) -> Vec<&'a [String]> {
    ids.chunks(batch_size.max(1)).collect()
}

/// Per-simulation pure computation stage: loader -> allele counter ->
/// statistic engine. No shared state; the batch-level accumulation happens
/// in `run_ingestion`.
pub fn compute_simulation_rows(
    sim: &RawSimulation,
    config: &PipelineConfig,
) -> Result<(Vec<StatRow>, usize), PipelineError> {
    let loaded = load_subpop_matrices(sim, &config.subpops)?;
    let params = config.ehh_params();

    let pop1_ac = count_alleles(&loaded.pop1);
    let pop2_ac = count_alleles(&loaded.pop2);

    let h1 = loaded.pop1.haplotypes();
    let h2 = loaded.pop2.haplotypes();

    let xpehh = xpehh_scan(&h1.view(), &h2.view(), &loaded.positions, &params);
    let fst_components = hudson_fst_per_site(&pop1_ac, &pop2_ac);
    let ihs_pop1 = ihs_scan(&h1.view(), &loaded.positions, &params);
    let ihs_pop2 = ihs_scan(&h2.view(), &loaded.positions, &params);

    let mut rows = Vec::with_capacity(loaded.positions.len());
    for (i, site) in loaded.sites.iter().enumerate() {
        let (num, den) = fst_components[i];
        let fst = if den != 0.0 && num.is_finite() && den.is_finite() {
            Some(num / den)
        } else {
            None
        };
        rows.push(StatRow {
            simulation: sim.name.clone(),
            position: site.position,
            uniq_id: StatRow::make_uniq_id(&sim.name, site.position),
            reference: site.reference.clone(),
            pop1_ac: pop1_ac[i],
            pop2_ac: pop2_ac[i],
            xpehh: xpehh[i].ok(),
            fst_num: num,
            fst_den: den,
            fst,
            ihs_pop1: ihs_pop1[i].ok(),
            ihs_pop2: ihs_pop2[i].ok(),
            ihs_pop1_std: None,
            ihs_pop2_std: None,
            label: Label::Neutral,
        });
    }
    Ok((rows, loaded.masked_monomorphic))
}

/// Drives the per-simulation pipeline across the whole corpus in batches.
///
/// Failure semantics: a malformed simulation is skipped with a diagnostic and
/// the batch continues; a failure loading a batch's raw rows aborts that
/// batch only, leaving prior committed batches intact. Commits go through the
/// store's keyed upsert, so reprocessing a batch is safe.
pub fn run_ingestion<S: SimulationSource, T: StatStore>(
    source: &S,
    store: &mut T,
    config: &PipelineConfig,
) -> Result<RunSummary, PipelineError> {
    let start = Instant::now();
    set_stage(ProcessingStage::Ingestion);

    let sim_ids = source.simulation_ids()?;
    if sim_ids.is_empty() {
        return Err(PipelineError::CorpusIncomplete(
            "simulation source returned no simulations".to_string(),
        ));
    }

    let batches = partition_batches(&sim_ids, config.batch_size);
    log(
        LogLevel::Info,
        &format!(
            "Ingesting {} simulation(s) in {} batch(es) of up to {}",
            sim_ids.len(),
            batches.len(),
            config.batch_size
        ),
    );
    init_step_progress("Processing batches", batches.len() as u64);

    let mut summary = RunSummary::default();
    for (batch_idx, batch_ids) in batches.iter().enumerate() {
        let raw = match source.load(batch_ids) {
            Ok(raw) => raw,
            Err(e) => {
                log(
                    LogLevel::Error,
                    &format!(
                        "Batch {} failed to load and was aborted: {}",
                        batch_idx, e
                    ),
                );
                summary.batches_failed += 1;
                update_step_progress(batch_idx as u64 + 1, "batch aborted");
                continue;
            }
        };

        // Batch-local buffer, committed as a single unit below.
        let mut batch_rows: Vec<StatRow> = Vec::new();
        for sim in &raw {
            match compute_simulation_rows(sim, config) {
                Ok((rows, masked)) => {
                    summary.simulations_processed += 1;
                    summary.sites_masked_monomorphic += masked;
                    batch_rows.extend(rows);
                }
                Err(e) => {
                    log(
                        LogLevel::Warning,
                        &format!("Skipping simulation {}: {}", sim.name, e),
                    );
                    summary.simulations_skipped += 1;
                }
            }
        }

        match store.upsert_rows(&batch_rows) {
            Ok(n) => {
                summary.batches_committed += 1;
                summary.rows_written += n;
            }
            Err(e) => {
                log(
                    LogLevel::Error,
                    &format!("Batch {} commit failed, not retried: {}", batch_idx, e),
                );
                summary.batches_failed += 1;
            }
        }

        let pct = (batch_idx + 1) as f64 / batches.len() as f64 * 100.0;
        update_step_progress(
            batch_idx as u64 + 1,
            &format!(
                "{:.1}% complete, {} rows, {:.1}s elapsed",
                pct,
                summary.rows_written,
                start.elapsed().as_secs_f64()
            ),
        );
    }

    summary.elapsed = start.elapsed();
    finish_step_progress(&format!(
        "Ingestion done: {} rows from {} simulation(s), {} skipped",
        summary.rows_written, summary.simulations_processed, summary.simulations_skipped
    ));
    Ok(summary)
}
