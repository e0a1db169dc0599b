//! Per-locus mosaicism detection and result writing

use crate::estimator::estimate;
use crate::likelihood::ReadObservation;
use crate::observation::{check_inclusion, extract_genotype, extract_read_vector};
use crate::significance::SignificanceTester;
use crate::stutter::StutterTable;
use crate::utils::log_progress;
use crate::vcf::{SampleCall, StrLocus, VcfHeader};
use crate::{DetectionResult, Genotype, MosaicConfig, PrancstrError, PrancstrResult};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::time::Instant;

/// Format field holding the per-read allele support
pub const READ_FIELD: &str = "MALLREADS";

pub const HEADER: [&str; 17] = [
    "sample",
    "chrom",
    "pos",
    "locus",
    "motif",
    "A",
    "B",
    "C",
    "f",
    "pval",
    "reads",
    "mosaic_support",
    "stutter_u",
    "stutter_d",
    "stutter_rho",
    "quality",
    "depth",
];

/// Record and sample selection
#[derive(Debug, Clone, Default)]
pub struct DetectionOptions {
    /// Only these samples are tested when set
    pub samples: Option<HashSet<String>>,
    pub only_passing: bool,
    /// Test every called sample with reads, even without genotype support
    pub output_all: bool,
}

impl DetectionOptions {
    fn includes_sample(&self, sample: &str) -> bool {
        self.samples
            .as_ref()
            .map_or(true, |samples| samples.contains(sample))
    }
}

/// One output line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRow {
    pub sample: String,
    pub chrom: String,
    pub pos: u32,
    pub locus: String,
    pub motif: String,
    #[serde(rename = "A")]
    pub allele_a: i64,
    #[serde(rename = "B")]
    pub allele_b: i64,
    #[serde(rename = "C")]
    pub mosaic_allele: Option<i64>,
    #[serde(rename = "f")]
    pub mosaic_fraction: f64,
    pub pval: f64,
    pub reads: String,
    pub mosaic_support: u32,
    pub stutter_u: f64,
    pub stutter_d: f64,
    pub stutter_rho: f64,
    pub quality: Option<f64>,
    pub depth: i64,
}

/// Validate estimator configuration parameters
pub fn validate_mosaic_config(config: &MosaicConfig) -> PrancstrResult<()> {
    if config.window <= 0 {
        return Err(PrancstrError::InvalidConfig(
            "window must be positive".to_string(),
        ));
    }

    if config.floor_probability <= 0.0 || config.floor_probability >= 1.0 {
        return Err(PrancstrError::InvalidConfig(
            "floor_probability must be between 0 and 1".to_string(),
        ));
    }

    if config.search_margin < 0 {
        return Err(PrancstrError::InvalidConfig(
            "search_margin must not be negative".to_string(),
        ));
    }

    if config.max_fraction <= 0.0 || config.max_fraction > 0.5 {
        return Err(PrancstrError::InvalidConfig(
            "max_fraction must be in (0, 0.5]".to_string(),
        ));
    }

    if config.initial_fraction < 0.0 || config.initial_fraction > config.max_fraction {
        return Err(PrancstrError::InvalidConfig(
            "initial_fraction must be between 0 and max_fraction".to_string(),
        ));
    }

    if config.max_iterations == 0 {
        return Err(PrancstrError::InvalidConfig(
            "max_iterations must be at least 1".to_string(),
        ));
    }

    if config.convergence_tolerance <= 0.0
        || config.null_fraction <= 0.0
        || config.solver_tolerance <= 0.0
    {
        return Err(PrancstrError::InvalidConfig(
            "tolerances must be positive".to_string(),
        ));
    }

    Ok(())
}

/// Fit the mosaic allele and fraction for one sample and test f = 0
pub fn detect_mosaicism(
    reads: &ReadObservation,
    a: i64,
    b: i64,
    table: &StutterTable,
    config: &MosaicConfig,
    tester: &SignificanceTester,
    locus_name: &str,
) -> DetectionResult {
    let fitted = estimate(reads, a, b, table, config, locus_name);
    let pvalue = tester.pvalue(
        reads,
        a,
        b,
        fitted.allele,
        fitted.fraction,
        table,
        config,
    );
    let mosaic_support = fitted.allele.map_or(0, |c| reads.count(c));

    DetectionResult::new(a, b, fitted.allele, fitted.fraction, pvalue, mosaic_support)
}

/// Test every selected sample at a locus.
///
/// Loci lacking read support or stutter annotations are skipped with a
/// warning; samples that fail the inclusion checks are skipped silently.
pub fn process_locus(
    locus: &StrLocus,
    sample_names: &[String],
    options: &DetectionOptions,
    config: &MosaicConfig,
    tester: &SignificanceTester,
) -> Vec<OutputRow> {
    let locus_name = locus.name();

    if options.only_passing && !options.output_all && !locus.is_passing() {
        log::warn!("Skipping non-passing record {}", locus_name);
        return Vec::new();
    }
    if !locus.has_format(READ_FIELD) {
        log::warn!("Could not find {} for {}", READ_FIELD, locus_name);
        return Vec::new();
    }
    let Some(params) = locus.stutter_params() else {
        log::warn!("Could not find stutter info for {}", locus_name);
        return Vec::new();
    };
    let (Some(period), Some(motif)) = (locus.period(), locus.motif()) else {
        log::warn!("Could not find repeat period for {}", locus_name);
        return Vec::new();
    };

    let table = StutterTable::new(params, config.window);
    let mut rows = Vec::new();

    for (sample_name, call) in sample_names.iter().zip(&locus.samples) {
        if !options.includes_sample(sample_name) {
            continue;
        }

        let Some((reads, genotype)) = sample_observation(call, locus, period, sample_name) else {
            continue;
        };

        log::debug!(
            "Checking mosaicism for sample {} at {}",
            sample_name,
            locus_name
        );
        log::debug!("genotype={:?} reads={:?}", genotype, reads.reads());

        let (a, b) = match check_inclusion(genotype, &reads, options.output_all) {
            Ok(alleles) => alleles,
            Err(reason) => {
                log::debug!("Skipping sample {} at {}: {:?}", sample_name, locus_name, reason);
                continue;
            }
        };

        let result = detect_mosaicism(&reads, a, b, &table, config, tester, &locus_name);
        log::debug!(
            "Inferred best_C={:?} best_f={}",
            result.mosaic_allele,
            result.mosaic_fraction
        );

        rows.push(OutputRow {
            sample: sample_name.clone(),
            chrom: locus.chrom.clone(),
            pos: locus.pos,
            locus: locus.id.clone(),
            motif: motif.clone(),
            allele_a: result.allele_a,
            allele_b: result.allele_b,
            mosaic_allele: result.mosaic_allele,
            mosaic_fraction: result.mosaic_fraction,
            pval: result.pvalue,
            reads: call.read_support.clone().unwrap_or_default(),
            mosaic_support: result.mosaic_support,
            stutter_u: params.up,
            stutter_d: params.down,
            stutter_rho: params.rho,
            quality: call.quality,
            depth: call.depth,
        });
    }

    rows
}

fn sample_observation(
    call: &SampleCall,
    locus: &StrLocus,
    period: i64,
    sample_name: &str,
) -> Option<(ReadObservation, Genotype)> {
    let genotype = match call.genotype.as_deref() {
        Some(gt) => match extract_genotype(gt, &locus.alleles, period) {
            Ok(genotype) => genotype,
            Err(e) => {
                log::warn!("Skipping sample {} at {}: {}", sample_name, locus.name(), e);
                return None;
            }
        },
        None => Genotype::Uncalled,
    };

    let reads = match extract_read_vector(call.read_support.as_deref().unwrap_or(""), period) {
        Ok(reads) => reads,
        Err(e) => {
            log::warn!("Skipping sample {} at {}: {}", sample_name, locus.name(), e);
            return None;
        }
    };

    Some((reads, genotype))
}

/// Tab-separated result writer
pub struct ResultWriter {
    writer: csv::Writer<Box<dyn Write>>,
}

impl ResultWriter {
    /// Write to standard output for `stdout`, otherwise to `<prefix>.tab`
    pub fn create(prefix: &str) -> PrancstrResult<Self> {
        let output: Box<dyn Write> = if prefix == "stdout" {
            Box::new(std::io::stdout())
        } else {
            Box::new(File::create(format!("{}.tab", prefix))?)
        };
        Self::from_writer(output)
    }

    pub fn from_writer(output: Box<dyn Write>) -> PrancstrResult<Self> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(output);
        writer.write_record(HEADER)?;
        Ok(Self { writer })
    }

    pub fn write_rows(&mut self, rows: &[OutputRow]) -> PrancstrResult<()> {
        for row in rows {
            self.writer.serialize(row)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> PrancstrResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Counts reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub records: usize,
    pub invalid_records: usize,
    pub results: usize,
    pub mosaic_calls: usize,
}

/// Parse and test a single VCF data line
fn process_line(
    line: &str,
    header: &VcfHeader,
    options: &DetectionOptions,
    config: &MosaicConfig,
    tester: &SignificanceTester,
) -> Option<Vec<OutputRow>> {
    match StrLocus::from_line(line, &header.indices) {
        Ok(locus) => Some(process_locus(&locus, &header.samples, options, config, tester)),
        Err(e) => {
            log::warn!("Skipping invalid VCF record: {}", e);
            None
        }
    }
}

/// Run detection over VCF data lines, testing loci in parallel batches and
/// writing results in input order
pub fn run_detection<I>(
    lines: I,
    header: &VcfHeader,
    writer: &mut ResultWriter,
    options: &DetectionOptions,
    config: &MosaicConfig,
    num_threads: usize,
    batch_size: usize,
) -> PrancstrResult<RunSummary>
where
    I: IntoIterator<Item = PrancstrResult<String>>,
{
    validate_mosaic_config(config)?;
    let tester = SignificanceTester::boundary_mixture()?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads.max(1))
        .build()
        .map_err(|e| PrancstrError::InvalidConfig(format!("Could not start worker pool: {}", e)))?;

    let batch_size = batch_size.max(1);
    let start_time = Instant::now();
    let mut summary = RunSummary::default();
    let mut batch: Vec<String> = Vec::with_capacity(batch_size);
    let mut lines = lines.into_iter().peekable();

    while lines.peek().is_some() {
        batch.clear();
        while batch.len() < batch_size {
            match lines.next() {
                Some(line) => batch.push(line?),
                None => break,
            }
        }

        let batch_results: Vec<Option<Vec<OutputRow>>> = pool.install(|| {
            batch
                .par_iter()
                .map(|line| process_line(line, header, options, config, &tester))
                .collect()
        });

        summary.records += batch.len();
        for rows in batch_results {
            let Some(rows) = rows else {
                summary.invalid_records += 1;
                continue;
            };
            summary.results += rows.len();
            summary.mosaic_calls += rows.iter().filter(|r| r.mosaic_allele.is_some()).count();
            writer.write_rows(&rows)?;
        }

        log_progress(summary.records, start_time.elapsed());
    }

    writer.flush()?;
    Ok(summary)
}
