use crate::process::{
    PipelineError, RawSimulation, RawSite, SimulationSource, SubpopPair, PLOIDY,
};

use flate2::read::MultiGzDecoder;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Opens a plain or gzip-compressed VCF for buffered reading.
pub fn open_vcf_reader(path: &Path) -> Result<Box<dyn BufRead + Send>, PipelineError> {
    let file = File::open(path)?;
    if path.extension().and_then(|s| s.to_str()) == Some("gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn parse_genotype(field: &str, position: i64) -> Result<[u8; PLOIDY], PipelineError> {
    let mut calls = [0u8; PLOIDY];
    let mut alleles = field.split(|c| c == '|' || c == '/');
    for slot in calls.iter_mut() {
        let token = alleles.next().ok_or_else(|| {
            PipelineError::Parse(format!(
                "genotype '{}' at position {} is not diploid",
                field, position
            ))
        })?;
        *slot = token.parse().map_err(|_| {
            PipelineError::Parse(format!(
                "unparseable allele '{}' at position {}",
                token, position
            ))
        })?;
    }
    if alleles.next().is_some() {
        return Err(PipelineError::Parse(format!(
            "genotype '{}' at position {} has more than {} calls",
            field, position, PLOIDY
        )));
    }
    Ok(calls)
}

/// Parses one simulator-output VCF into raw site records. Sample columns
/// are sub-population-major: the first `pop1.samples` individuals belong to
/// the first sub-population, the rest to the second.
pub fn parse_simulation_vcf(
    path: &Path,
    name: &str,
    expected_calls: usize,
) -> Result<RawSimulation, PipelineError> {
    let reader = open_vcf_reader(path)?;
    let mut sites = Vec::new();
    let mut saw_header = false;

    for line in reader.lines() {
        let line = line?;
        if line.starts_with("##") {
            continue;
        }
        if line.starts_with("#CHROM") {
            let samples = line.split('\t').skip(9).count();
            if samples * PLOIDY != expected_calls {
                return Err(PipelineError::MalformedSimulation {
                    sim: name.to_string(),
                    reason: format!(
                        "{} sample column(s), expected {}",
                        samples,
                        expected_calls / PLOIDY
                    ),
                });
            }
            saw_header = true;
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 10 {
            return Err(PipelineError::Parse(format!(
                "truncated VCF record in {}: {}",
                name, line
            )));
        }
        let position: i64 = fields[1]
            .parse()
            .map_err(|_| PipelineError::Parse(format!("invalid position in {}: {}", name, fields[1])))?;

        let mut calls = Vec::with_capacity(expected_calls);
        for gt in &fields[9..] {
            calls.extend_from_slice(&parse_genotype(gt, position)?);
        }

        let alts: Vec<String> = match fields[4] {
            "." => Vec::new(),
            alt => alt.split(',').map(String::from).collect(),
        };

        sites.push(RawSite {
            position,
            vcf_row_id: fields[2].to_string(),
            reference: fields[3].to_string(),
            alts,
            calls,
        });
    }

    if !saw_header {
        return Err(PipelineError::Parse(format!(
            "{} has no #CHROM header line",
            name
        )));
    }
    Ok(RawSimulation {
        name: name.to_string(),
        sites,
    })
}

/// Simulation source backed by a folder of per-simulation VCF files
/// (`.vcf` or `.vcf.gz`); the file name is the simulation identifier.
pub struct VcfFolderSource {
    folder: PathBuf,
    expected_calls: usize,
}

impl VcfFolderSource {
    pub fn new(folder: &Path, subpops: &SubpopPair) -> Self {
        VcfFolderSource {
            folder: folder.to_path_buf(),
            expected_calls: subpops.total_call_columns(),
        }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.folder.join(id)
    }
}

impl SimulationSource for VcfFolderSource {
    fn simulation_ids(&self) -> Result<Vec<String>, PipelineError> {
        let mut ids: Vec<String> = fs::read_dir(&self.folder)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                let file_name = path.file_name().and_then(|n| n.to_str())?;
                if file_name.ends_with(".vcf") || file_name.ends_with(".vcf.gz") {
                    Some(file_name.to_string())
                } else {
                    None
                }
            })
            .collect();
        if ids.is_empty() {
            return Err(PipelineError::NoVcfFiles(
                self.folder.display().to_string(),
            ));
        }
        ids.sort();
        Ok(ids)
    }

    fn load(&self, ids: &[String]) -> Result<Vec<RawSimulation>, PipelineError> {
        ids.iter()
            .map(|id| parse_simulation_vcf(&self.path_for(id), id, self.expected_calls))
            .collect()
    }
}
