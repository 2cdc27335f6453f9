use crate::footprint::Label;
use crate::process::PipelineError;

use csv::WriterBuilder;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Numeric stand-in for missing statistics at the export boundary only.
/// The downstream classifier's parser needs a concrete value, never an
/// empty field or a NaN token.
pub const NULL_SENTINEL: f64 = -998.0;

/// One persisted record per (simulation, site). Missingness is honest
/// (`Option`) everywhere inside the pipeline; the sentinel appears only in
/// exported tables.
#[derive(Debug, Clone, PartialEq)]
pub struct StatRow {
    pub simulation: String,
    pub position: i64,
    /// Corpus-unique identifier, the keyed-upsert key.
    pub uniq_id: String,
    pub reference: String,
    pub pop1_ac: [u32; 3],
    pub pop2_ac: [u32; 3],
    pub xpehh: Option<f64>,
    pub fst_num: f64,
    pub fst_den: f64,
    pub fst: Option<f64>,
    pub ihs_pop1: Option<f64>,
    pub ihs_pop2: Option<f64>,
    pub ihs_pop1_std: Option<f64>,
    pub ihs_pop2_std: Option<f64>,
    pub label: Label,
}

impl StatRow {
    pub fn make_uniq_id(simulation: &str, position: i64) -> String {
        format!("{}_{}", simulation, position)
    }
}

/// Which sub-population a standardized-iHS backfill targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubpopSlot {
    Pop1,
    Pop2,
}

/// Storage collaborator interface. The correctness-critical path is the
/// update keyed by `uniq_id`: batch retries and re-labeling passes must be
/// duplicate-safe.
pub trait StatStore {
    /// Insert-or-replace by `uniq_id`. Returns the number of rows written.
    fn upsert_rows(&mut self, rows: &[StatRow]) -> Result<usize, PipelineError>;

    /// Backfills standardized iHS for one sub-population column. Unknown
    /// ids are a storage error.
    fn update_standardized(
        &mut self,
        slot: SubpopSlot,
        values: &[(String, Option<f64>)],
    ) -> Result<usize, PipelineError>;

    /// Rewrites labels keyed by `uniq_id`. The whole call is applied
    /// atomically with respect to readers of this store.
    fn update_labels(&mut self, labels: &[(String, Label)]) -> Result<usize, PipelineError>;

    /// Snapshot of every row, ordered by (simulation, position).
    fn all_rows(&self) -> Vec<StatRow>;

    fn rows_with_label(&self, label: Label) -> Vec<StatRow>;

    fn rows_in_range(&self, start: i64, end: i64) -> Vec<StatRow>;

    fn rows_for_simulation(&self, simulation: &str) -> Vec<StatRow>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store keyed by (simulation, position); `uniq_id` resolves to
/// the same key. Mutation goes through `&mut self`, so each call is atomic
/// with respect to readers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: BTreeMap<(String, i64), StatRow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn key_for_uniq_id(&self, uniq_id: &str) -> Result<(String, i64), PipelineError> {
        // uniq_id is "{simulation}_{position}"; the simulation name may
        // itself contain underscores, so split on the last one.
        let (sim, pos) = uniq_id
            .rsplit_once('_')
            .ok_or_else(|| PipelineError::Storage(format!("bad uniq_id: {}", uniq_id)))?;
        let position: i64 = pos
            .parse()
            .map_err(|_| PipelineError::Storage(format!("bad uniq_id position: {}", uniq_id)))?;
        Ok((sim.to_string(), position))
    }
}

impl StatStore for MemoryStore {
    fn upsert_rows(&mut self, rows: &[StatRow]) -> Result<usize, PipelineError> {
        for row in rows {
            self.rows
                .insert((row.simulation.clone(), row.position), row.clone());
        }
        Ok(rows.len())
    }

    fn update_standardized(
        &mut self,
        slot: SubpopSlot,
        values: &[(String, Option<f64>)],
    ) -> Result<usize, PipelineError> {
        // Resolve every key first so a bad id cannot leave the column
        // partially backfilled.
        let mut resolved = Vec::with_capacity(values.len());
        for (uniq_id, value) in values {
            let key = self.key_for_uniq_id(uniq_id)?;
            if !self.rows.contains_key(&key) {
                return Err(PipelineError::Storage(format!(
                    "unknown uniq_id: {}",
                    uniq_id
                )));
            }
            resolved.push((key, *value));
        }
        for (key, value) in resolved {
            if let Some(row) = self.rows.get_mut(&key) {
                match slot {
                    SubpopSlot::Pop1 => row.ihs_pop1_std = value,
                    SubpopSlot::Pop2 => row.ihs_pop2_std = value,
                }
            }
        }
        Ok(values.len())
    }

    fn update_labels(&mut self, labels: &[(String, Label)]) -> Result<usize, PipelineError> {
        // Resolve every key first so a bad id cannot leave the store
        // partially relabeled.
        let mut resolved = Vec::with_capacity(labels.len());
        for (uniq_id, label) in labels {
            let key = self.key_for_uniq_id(uniq_id)?;
            if !self.rows.contains_key(&key) {
                return Err(PipelineError::Storage(format!(
                    "unknown uniq_id: {}",
                    uniq_id
                )));
            }
            resolved.push((key, *label));
        }
        for (key, label) in resolved {
            if let Some(row) = self.rows.get_mut(&key) {
                row.label = label;
            }
        }
        Ok(labels.len())
    }

    fn all_rows(&self) -> Vec<StatRow> {
        self.rows.values().cloned().collect()
    }

    fn rows_with_label(&self, label: Label) -> Vec<StatRow> {
        self.rows
            .values()
            .filter(|r| r.label == label)
            .cloned()
            .collect()
    }

    fn rows_in_range(&self, start: i64, end: i64) -> Vec<StatRow> {
        self.rows
            .values()
            .filter(|r| r.position >= start && r.position <= end)
            .cloned()
            .collect()
    }

    fn rows_for_simulation(&self, simulation: &str) -> Vec<StatRow> {
        self.rows
            .values()
            .filter(|r| r.simulation == simulation)
            .cloned()
            .collect()
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}

fn encode(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{}", v),
        _ => format!("{}", NULL_SENTINEL),
    }
}

fn write_table(
    path: &Path,
    rows: &[StatRow],
    ihs_header: &str,
    with_label: bool,
) -> Result<(), PipelineError> {
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    let mut header = vec![];
    if with_label {
        header.push("label".to_string());
    }
    header.extend(
        ["snp_position", "vcf_name", "xpehh", "fst"]
            .iter()
            .map(|s| s.to_string()),
    );
    header.push(ihs_header.to_string());
    writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![];
        if with_label {
            record.push(row.label.as_str().to_string());
        }
        record.push(row.position.to_string());
        record.push(row.simulation.clone());
        record.push(encode(row.xpehh));
        record.push(encode(row.fst));
        record.push(encode(row.ihs_pop1_std));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the per-label classifier tables: one tab-delimited file per label
/// class (training rows), a held-out `test` file covering the first
/// `test_count` simulations, and a combined labeled `train` file sorted by
/// (simulation, position). Missing statistics are encoded as the numeric
/// sentinel here and nowhere else.
pub fn export_for_classifier<T: StatStore>(
    store: &T,
    out_dir: &Path,
    pop1_name: &str,
    test_count: usize,
) -> Result<(), PipelineError> {
    fs::create_dir_all(out_dir)?;
    let ihs_header = format!("ihs_{}_std", pop1_name);

    let all = store.all_rows();
    let sims: BTreeSet<&str> = all.iter().map(|r| r.simulation.as_str()).collect();
    let test_sims: BTreeSet<String> = sims
        .iter()
        .take(test_count)
        .map(|s| s.to_string())
        .collect();

    for label in Label::ALL {
        let rows: Vec<StatRow> = all
            .iter()
            .filter(|r| r.label == label && !test_sims.contains(&r.simulation))
            .cloned()
            .collect();
        write_table(
            &out_dir.join(label.as_str()),
            &rows,
            &ihs_header,
            false,
        )?;
    }

    let test_rows: Vec<StatRow> = all
        .iter()
        .filter(|r| test_sims.contains(&r.simulation))
        .cloned()
        .collect();
    write_table(&out_dir.join("test"), &test_rows, &ihs_header, true)?;

    let mut train_rows: Vec<StatRow> = all
        .iter()
        .filter(|r| !test_sims.contains(&r.simulation))
        .cloned()
        .collect();
    train_rows.sort_by(|a, b| {
        a.simulation
            .cmp(&b.simulation)
            .then(a.position.cmp(&b.position))
    });
    write_table(&out_dir.join("train"), &train_rows, &ihs_header, true)?;

    Ok(())
}
