use crate::process::PipelineError;
use crate::store::StatStore;

use std::fmt;
use std::str::FromStr;

/// One-sided 97.5th-percentile quantile of the standard normal, giving a
/// two-sided 95% interval around the sweep coordinate.
pub const Z_975: f64 = 1.959963984540054;

/// Tuning for the footprint fit.
#[derive(Debug, Clone, Copy)]
pub struct FootprintParams {
    /// Generous half-width around the sweep coordinate to draw candidate
    /// sites from; far larger than any plausible footprint.
    pub window: i64,
    /// Radius rounding granularity in bp, so labels reproduce exactly
    /// across runs on the same corpus.
    pub granularity: i64,
}

impl Default for FootprintParams {
    fn default() -> Self {
        FootprintParams {
            window: 500_000,
            granularity: 10_000,
        }
    }
}

/// The fitted footprint model: a calibration parameter, not primary data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepFootprint {
    pub mean: f64,
    pub sd: f64,
    pub radius: i64,
    pub n_sites: usize,
}

/// Fits a normal distribution to the positions of sites showing sweep-like
/// haplotype structure (XP-EHH > 0) within `params.window` of the sweep
/// coordinate, and derives the symmetric link radius from its spread.
///
/// Sites with non-positive or missing XP-EHH are background and excluded
/// from the fit. Too few retained sites is a hard error: the radius becomes
/// ground truth for every downstream label.
pub fn estimate_footprint(
    sites: &[(i64, Option<f64>)],
    sweep_position: i64,
    params: &FootprintParams,
) -> Result<SweepFootprint, PipelineError> {
    let lo = sweep_position - params.window;
    let hi = sweep_position + params.window;
    let retained: Vec<f64> = sites
        .iter()
        .filter(|(pos, xpehh)| {
            *pos >= lo && *pos <= hi && matches!(xpehh, Some(x) if *x > 0.0)
        })
        .map(|(pos, _)| *pos as f64)
        .collect();

    if retained.len() < 2 {
        return Err(PipelineError::CorpusIncomplete(format!(
            "only {} site(s) with positive XP-EHH within {}bp of the sweep",
            retained.len(),
            params.window
        )));
    }

    let n = retained.len() as f64;
    let mean = retained.iter().sum::<f64>() / n;
    // Sample standard deviation (n - 1).
    let var = retained.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let sd = var.sqrt();

    let g = params.granularity.max(1) as f64;
    let radius = ((Z_975 * sd / g).round() * g) as i64;

    Ok(SweepFootprint {
        mean,
        sd,
        radius,
        n_sites: retained.len(),
    })
}

/// Relationship of a variant site to the known sweep event. Assigned once
/// per labeling pass; terminal immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Neutral,
    LinkLeft,
    Sweep,
    LinkRight,
}

impl Label {
    pub const ALL: [Label; 4] = [Label::Neutral, Label::LinkLeft, Label::Sweep, Label::LinkRight];

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Neutral => "neutral",
            Label::LinkLeft => "link_left",
            Label::Sweep => "sweep",
            Label::LinkRight => "link_right",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "neutral" => Ok(Label::Neutral),
            "link_left" => Ok(Label::LinkLeft),
            "sweep" => Ok(Label::Sweep),
            "link_right" => Ok(Label::LinkRight),
            other => Err(format!("unknown label: {}", other)),
        }
    }
}

/// Classifies one position against the sweep coordinate and link radius.
/// The sweep site itself is the exact coordinate; the link intervals are
/// half-open so every position gets exactly one label.
pub fn assign_label(position: i64, sweep_position: i64, radius: i64) -> Label {
    if position == sweep_position {
        Label::Sweep
    } else if position >= sweep_position - radius && position < sweep_position {
        Label::LinkLeft
    } else if position > sweep_position && position <= sweep_position + radius {
        Label::LinkRight
    } else {
        Label::Neutral
    }
}

/// Rewrites the label of every persisted row against the given radius in a
/// single keyed update. Idempotent: re-running with the same radius and
/// coordinate yields identical labels.
pub fn relabel_store<T: StatStore>(
    store: &mut T,
    sweep_position: i64,
    radius: i64,
) -> Result<usize, PipelineError> {
    let assignments: Vec<(String, Label)> = store
        .all_rows()
        .iter()
        .map(|row| {
            (
                row.uniq_id.clone(),
                assign_label(row.position, sweep_position, radius),
            )
        })
        .collect();
    store.update_labels(&assignments)
}
