// Module declarations
pub mod footprint;
pub mod matrix;
pub mod parse;
pub mod process;
pub mod progress;
pub mod standardize;
pub mod stats;
pub mod store;

#[cfg(test)]
mod tests;

pub use footprint::{assign_label, estimate_footprint, FootprintParams, Label, SweepFootprint};
pub use matrix::{count_alleles, load_subpop_matrices, GenotypeMatrix, LoadedSimulation};
pub use process::{
    run_ingestion, FootprintMode, PipelineConfig, PipelineError, RawSimulation, RawSite,
    RunSummary, SimulationSource, SubpopPair, SubpopSpec,
};
pub use standardize::standardize_by_allele_count;
pub use stats::{
    hudson_fst_per_site, hudson_fst_aggregate, ihs_scan, xpehh_scan, EhhParams, StatFailure,
};
pub use store::{MemoryStore, StatRow, StatStore};
