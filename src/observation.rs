//! Conversion of per-sample VCF fields into genotypes and read observations

use crate::likelihood::ReadObservation;
use crate::{Genotype, PrancstrError, PrancstrResult};

/// Parse a read-support string of the form `allele1|count1;allele2|count2...`
/// where alleles are bp offsets from the reference. Offsets are converted to
/// repeat units by floor division with `period`.
///
/// Parsing stops at the first entry without a `|`, so `.` and empty strings
/// give an empty observation.
pub fn extract_read_vector(support: &str, period: i64) -> PrancstrResult<ReadObservation> {
    let mut reads = ReadObservation::new();

    for allele_data in support.split(';') {
        let Some((allele, count)) = allele_data.split_once('|') else {
            break;
        };
        let allele = allele.trim().parse::<i64>().map_err(|_| {
            PrancstrError::InvalidRecord(format!("Invalid read support allele: {}", allele_data))
        })?;
        let count = count.trim().parse::<u32>().map_err(|_| {
            PrancstrError::InvalidRecord(format!("Invalid read support count: {}", allele_data))
        })?;
        reads.add(allele.div_euclid(period), count);
    }

    Ok(reads)
}

/// Genotype in repeat units from a GT string and the record's alleles.
///
/// Allele lengths are taken relative to the reference allele, then floor
/// divided by `period`. Missing calls give `Genotype::Uncalled` and haploid
/// calls are treated as homozygous.
pub fn extract_genotype(gt: &str, alleles: &[String], period: i64) -> PrancstrResult<Genotype> {
    let ref_len = alleles
        .first()
        .map(|a| a.len() as i64)
        .ok_or_else(|| PrancstrError::InvalidRecord("Record has no reference allele".to_string()))?;

    let indices: Vec<&str> = gt.split(['/', '|']).collect();
    if indices.is_empty() || indices.iter().any(|i| i.is_empty() || *i == ".") {
        return Ok(Genotype::Uncalled);
    }

    let mut lengths = Vec::with_capacity(indices.len());
    for index in &indices {
        let index = index
            .parse::<usize>()
            .map_err(|_| PrancstrError::InvalidRecord(format!("Invalid genotype: {}", gt)))?;
        let allele = alleles.get(index).ok_or_else(|| {
            PrancstrError::InvalidRecord(format!("Genotype {} refers to a missing allele", gt))
        })?;
        lengths.push((allele.len() as i64 - ref_len).div_euclid(period));
    }

    match lengths.as_slice() {
        [a] => Ok(Genotype::Called { a: *a, b: *a }),
        [a, b] => Ok(Genotype::Called { a: *a, b: *b }),
        _ => Err(PrancstrError::InvalidRecord(format!(
            "Only diploid or haploid genotypes are supported: {}",
            gt
        ))),
    }
}

/// Why a sample was not tested at a locus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Uncalled,
    NoReads,
    /// Neither genotype allele appears among the reads
    GenotypeUnsupported,
    /// Only one distinct read length, so there is nothing to test
    SingleReadValue,
}

/// Decide whether a sample should be tested, returning its alleles if so.
///
/// Uncalled samples and samples without reads are always skipped; the other
/// checks are bypassed by `output_all`.
pub fn check_inclusion(
    genotype: Genotype,
    reads: &ReadObservation,
    output_all: bool,
) -> Result<(i64, i64), SkipReason> {
    let (a, b) = genotype.alleles().ok_or(SkipReason::Uncalled)?;
    if reads.is_empty() {
        return Err(SkipReason::NoReads);
    }
    if !output_all {
        if !reads.contains(a) && !reads.contains(b) {
            return Err(SkipReason::GenotypeUnsupported);
        }
        if reads.distinct() == 1 {
            return Err(SkipReason::SingleReadValue);
        }
    }
    Ok((a, b))
}
