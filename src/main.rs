use sweepstat::footprint::{estimate_footprint, relabel_store, FootprintParams};
use sweepstat::parse::VcfFolderSource;
use sweepstat::process::{
    run_ingestion, FootprintMode, PipelineConfig, PipelineError, SubpopPair, SubpopSpec,
};
use sweepstat::progress::{log as plog, set_stage, LogLevel, ProcessingStage};
use sweepstat::standardize::{standardize_by_allele_count, StandardizeError};
use sweepstat::stats::hudson_fst_aggregate;
use sweepstat::store::{export_for_classifier, MemoryStore, StatStore, SubpopSlot};

use clap::Parser;
use colored::*;
use env_logger::Builder;
use log::LevelFilter;
use prettytable::{row, Table};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Folder containing per-simulation VCF files
    #[arg(short, long = "vcf_folder")]
    vcf_folder: String,

    /// Directory for the per-label classifier tables
    #[arg(short, long = "out_dir", default_value = "swifr_input")]
    out_dir: String,

    /// Known sweep coordinate (bp)
    #[arg(long = "sweep_position", default_value = "2500000")]
    sweep_position: i64,

    /// Fixed footprint radius in bp; omit to derive it from the corpus
    #[arg(long = "footprint")]
    footprint: Option<i64>,

    /// Half-width of the footprint-fit window around the sweep (bp)
    #[arg(long = "window", default_value = "500000")]
    window: i64,

    /// Simulations per batch
    #[arg(long = "batch_size", default_value = "50")]
    batch_size: usize,

    /// Diploid sample count of the selected sub-population
    #[arg(long = "pop1_samples", default_value = "100")]
    pop1_samples: usize,

    /// Diploid sample count of the reference sub-population
    #[arg(long = "pop2_samples", default_value = "100")]
    pop2_samples: usize,

    /// Name of the selected sub-population
    #[arg(long = "pop1_name", default_value = "afr")]
    pop1_name: String,

    /// Name of the reference sub-population
    #[arg(long = "pop2_name", default_value = "eur")]
    pop2_name: String,

    /// Keep partial haplotype-decay integrals at the region edges
    #[arg(long = "include_edges")]
    include_edges: bool,

    /// Minimum finite values per iHS allele-count bin
    #[arg(long = "min_bin_size", default_value = "100")]
    min_bin_size: usize,

    /// Simulations held out for the classifier test split
    #[arg(long = "test_count", default_value = "20")]
    test_count: usize,

    /// Worker threads for the per-site statistic loops
    #[arg(long = "threads", default_value_t = num_cpus::get())]
    threads: usize,
}

fn main() -> Result<(), PipelineError> {
    Builder::new().filter_level(LevelFilter::Info).init();
    let args = Args::parse();

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()
        .map_err(|e| PipelineError::Storage(format!("thread pool: {}", e)))?;

    println!("{}", "Sweep statistic & labeling pipeline".green().bold());

    let config = PipelineConfig {
        subpops: SubpopPair {
            pop1: SubpopSpec::new(&args.pop1_name, args.pop1_samples),
            pop2: SubpopSpec::new(&args.pop2_name, args.pop2_samples),
        },
        sweep_position: args.sweep_position,
        footprint: match args.footprint {
            Some(radius) => FootprintMode::Fixed(radius),
            None => FootprintMode::Derive,
        },
        footprint_window: args.window,
        batch_size: args.batch_size,
        include_edges: args.include_edges,
        min_bin_size: args.min_bin_size,
    };

    let source = VcfFolderSource::new(&PathBuf::from(&args.vcf_folder), &config.subpops);
    let mut store = MemoryStore::new();

    // Stage 1: batched ingestion of raw simulations into statistic rows.
    let summary = run_ingestion(&source, &mut store, &config)?;

    // Stage 2: corpus-wide iHS standardization, only after ingestion has
    // quiesced. An all-missing column stays missing; unstable bins stop
    // the run because their output becomes ground truth downstream.
    set_stage(ProcessingStage::Standardization);
    let rows = store.all_rows();

    // Whole-region divergence, distinct from the per-site ratios.
    let components: Vec<(f64, f64)> = rows.iter().map(|r| (r.fst_num, r.fst_den)).collect();
    let fst_overall = hudson_fst_aggregate(&components);
    match fst_overall {
        Some(fst) => plog(
            LogLevel::Info,
            &format!("Aggregate Hudson Fst across the corpus: {:.6}", fst),
        ),
        None => plog(
            LogLevel::Warning,
            "Aggregate Hudson Fst undefined: no usable variance components",
        ),
    }
    for (slot, pop_name) in [
        (SubpopSlot::Pop1, config.subpops.pop1.name.clone()),
        (SubpopSlot::Pop2, config.subpops.pop2.name.clone()),
    ] {
        let (values, counts): (Vec<_>, Vec<_>) = rows
            .iter()
            .map(|r| match slot {
                SubpopSlot::Pop1 => (r.ihs_pop1, r.pop1_ac[1]),
                SubpopSlot::Pop2 => (r.ihs_pop2, r.pop2_ac[1]),
            })
            .unzip();
        match standardize_by_allele_count(&values, &counts, config.min_bin_size) {
            Ok(standardized) => {
                let updates: Vec<(String, Option<f64>)> = rows
                    .iter()
                    .zip(standardized)
                    .map(|(r, v)| (r.uniq_id.clone(), v))
                    .collect();
                store.update_standardized(slot, &updates)?;
            }
            Err(StandardizeError::AllMissing) => {
                plog(
                    LogLevel::Warning,
                    &format!(
                        "No finite iHS values for {}; column exported as missing",
                        pop_name
                    ),
                );
            }
            Err(e @ StandardizeError::UnstableBin { .. }) => return Err(e.into()),
        }
    }

    // Stage 3: footprint radius, fixed or fitted.
    set_stage(ProcessingStage::FootprintFit);
    let radius = match config.footprint {
        FootprintMode::Fixed(radius) => {
            plog(
                LogLevel::Info,
                &format!("Using fixed footprint radius {} bp", radius),
            );
            radius
        }
        FootprintMode::Derive => {
            let sites: Vec<(i64, Option<f64>)> = store
                .rows_in_range(
                    config.sweep_position - config.footprint_window,
                    config.sweep_position + config.footprint_window,
                )
                .iter()
                .map(|r| (r.position, r.xpehh))
                .collect();
            let fit = estimate_footprint(
                &sites,
                config.sweep_position,
                &FootprintParams {
                    window: config.footprint_window,
                    ..FootprintParams::default()
                },
            )?;
            plog(
                LogLevel::Info,
                &format!(
                    "Fitted footprint: mean {:.0}, sd {:.0}, radius {} bp from {} site(s)",
                    fit.mean, fit.sd, fit.radius, fit.n_sites
                ),
            );
            fit.radius
        }
    };

    // Stage 4: label every site against the radius.
    set_stage(ProcessingStage::Labeling);
    let labeled = relabel_store(&mut store, config.sweep_position, radius)?;
    plog(LogLevel::Info, &format!("Labeled {} row(s)", labeled));

    // Stage 5: per-label classifier tables.
    set_stage(ProcessingStage::Export);
    let out_dir = PathBuf::from(&args.out_dir);
    export_for_classifier(&store, &out_dir, &config.subpops.pop1.name, args.test_count)?;
    plog(
        LogLevel::Info,
        &format!("Classifier tables written to {}", out_dir.display()),
    );

    let mut table = Table::new();
    table.add_row(row!["Batches committed", summary.batches_committed]);
    table.add_row(row!["Batches failed", summary.batches_failed]);
    table.add_row(row!["Simulations processed", summary.simulations_processed]);
    table.add_row(row!["Simulations skipped", summary.simulations_skipped]);
    table.add_row(row![
        "Monomorphic sites masked",
        summary.sites_masked_monomorphic
    ]);
    table.add_row(row!["Rows written", summary.rows_written]);
    table.add_row(row!["Footprint radius (bp)", radius]);
    table.add_row(row![
        "Aggregate Hudson Fst",
        fst_overall
            .map(|f| format!("{:.6}", f))
            .unwrap_or_else(|| "n/a".to_string())
    ]);
    table.add_row(row![
        "Elapsed (s)",
        format!("{:.1}", summary.elapsed.as_secs_f64())
    ]);
    table.printstd();

    Ok(())
}
