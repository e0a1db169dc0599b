//! STR VCF file processing functionality

use crate::utils::is_gzipped;
use crate::{PrancstrError, PrancstrResult, StutterParams};
use flate2::read::MultiGzDecoder;
use rust_htslib::tbx::{self, Read as TbxRead};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

/// Column indices for VCF parsing
#[derive(Debug, Clone)]
pub struct VcfColumnIndices {
    pub chrom: usize,
    pub pos: usize,
    pub id: usize,
    pub ref_allele: usize,
    pub alt: usize,
    pub filter: usize,
    pub info: usize,
    pub format: usize,
    pub samples_start: usize,
}

impl VcfColumnIndices {
    pub fn from_header(header_line: &str) -> PrancstrResult<Self> {
        let fields: Vec<&str> = header_line.trim().split('\t').collect();
        let find = |names: &[&str]| {
            fields
                .iter()
                .position(|col| names.contains(col))
                .ok_or_else(|| {
                    PrancstrError::InvalidRecord(format!(
                        "{} column not found in VCF header",
                        names[0]
                    ))
                })
        };

        let format = find(&["FORMAT"])?;
        Ok(VcfColumnIndices {
            chrom: find(&["CHROM", "#CHROM"])?,
            pos: find(&["POS"])?,
            id: find(&["ID"])?,
            ref_allele: find(&["REF"])?,
            alt: find(&["ALT"])?,
            filter: find(&["FILTER"])?,
            info: find(&["INFO"])?,
            format,
            samples_start: format + 1,
        })
    }
}

/// Tandem repeat callers whose VCFs can be recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcfType {
    Gangstr,
    Advntr,
    Hipstr,
    Eh,
    Popstr,
}

impl VcfType {
    /// Identify the caller from the `##` meta lines
    pub fn infer(meta_lines: &[String]) -> PrancstrResult<Self> {
        for line in meta_lines {
            let line = line.to_lowercase();
            if line.starts_with("##command=gangstr") {
                return Ok(VcfType::Gangstr);
            }
            if line.starts_with("##command=hipstr") {
                return Ok(VcfType::Hipstr);
            }
            if line.starts_with("##source=advntr") {
                return Ok(VcfType::Advntr);
            }
            if line.starts_with("##command=popstr") {
                return Ok(VcfType::Popstr);
            }
            if line.starts_with("##alt=<id=str") {
                return Ok(VcfType::Eh);
            }
        }
        Err(PrancstrError::UnsupportedVcfType(
            "could not identify the caller from the VCF header".to_string(),
        ))
    }
}

impl FromStr for VcfType {
    type Err = PrancstrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gangstr" => Ok(VcfType::Gangstr),
            "advntr" => Ok(VcfType::Advntr),
            "hipstr" => Ok(VcfType::Hipstr),
            "eh" => Ok(VcfType::Eh),
            "popstr" => Ok(VcfType::Popstr),
            other => Err(PrancstrError::UnsupportedVcfType(other.to_string())),
        }
    }
}

impl fmt::Display for VcfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VcfType::Gangstr => "gangstr",
            VcfType::Advntr => "advntr",
            VcfType::Hipstr => "hipstr",
            VcfType::Eh => "eh",
            VcfType::Popstr => "popstr",
        };
        write!(f, "{}", name)
    }
}

/// Meta lines, column layout and sample names of a VCF
#[derive(Debug, Clone)]
pub struct VcfHeader {
    pub meta: Vec<String>,
    pub indices: VcfColumnIndices,
    pub samples: Vec<String>,
}

impl VcfHeader {
    pub fn from_lines(lines: &[String]) -> PrancstrResult<Self> {
        let mut meta = Vec::new();
        let mut column_line = None;

        for line in lines {
            if line.starts_with("##") {
                meta.push(line.clone());
            } else if line.starts_with('#') {
                column_line = Some(line.as_str());
            }
        }

        let column_line = column_line.ok_or_else(|| {
            PrancstrError::InvalidRecord("#CHROM header line not found in VCF".to_string())
        })?;
        let indices = VcfColumnIndices::from_header(column_line)?;
        let samples = column_line
            .trim()
            .split('\t')
            .skip(indices.samples_start)
            .map(|s| s.to_string())
            .collect();

        Ok(VcfHeader {
            meta,
            indices,
            samples,
        })
    }
}

/// Per-sample FORMAT values used by the detector
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleCall {
    pub genotype: Option<String>,
    pub quality: Option<f64>,
    pub depth: i64,
    pub read_support: Option<String>,
}

/// One STR locus with its per-sample calls
#[derive(Debug, Clone)]
pub struct StrLocus {
    pub chrom: String,
    pub pos: u32,
    pub id: String,
    /// Reference allele followed by the alternate alleles
    pub alleles: Vec<String>,
    pub filter: String,
    pub info: HashMap<String, String>,
    pub format: Vec<String>,
    pub samples: Vec<SampleCall>,
}

impl StrLocus {
    pub fn from_line(line: &str, indices: &VcfColumnIndices) -> PrancstrResult<Self> {
        let fields: Vec<&str> = line.trim_end().split('\t').collect();

        if fields.len() <= indices.format {
            return Err(PrancstrError::InvalidRecord(format!(
                "Invalid VCF line format - not enough columns: {}",
                line
            )));
        }

        let pos = fields[indices.pos].parse::<u32>().map_err(|_| {
            PrancstrError::InvalidRecord(format!("Invalid position: {}", fields[indices.pos]))
        })?;

        let mut alleles = vec![fields[indices.ref_allele].to_string()];
        let alt = fields[indices.alt];
        if alt != "." {
            alleles.extend(alt.split(',').map(|a| a.to_string()));
        }

        let info = fields[indices.info]
            .split(';')
            .filter(|entry| !entry.is_empty() && *entry != ".")
            .map(|entry| match entry.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (entry.to_string(), String::new()),
            })
            .collect();

        let format: Vec<String> = fields[indices.format]
            .split(':')
            .map(|s| s.to_string())
            .collect();

        let samples = fields
            .iter()
            .skip(indices.samples_start)
            .map(|sample| parse_sample(sample, &format))
            .collect();

        Ok(StrLocus {
            chrom: fields[indices.chrom].to_string(),
            pos,
            id: fields[indices.id].to_string(),
            alleles,
            filter: fields[indices.filter].to_string(),
            info,
            format,
            samples,
        })
    }

    /// `chrom:pos`, used to identify the locus in log messages
    pub fn name(&self) -> String {
        format!("{}:{}", self.chrom, self.pos)
    }

    pub fn is_passing(&self) -> bool {
        self.filter == "PASS" || self.filter == "."
    }

    pub fn has_format(&self, key: &str) -> bool {
        self.format.iter().any(|k| k == key)
    }

    pub fn info_f64(&self, key: &str) -> Option<f64> {
        self.info.get(key).and_then(|v| v.parse::<f64>().ok())
    }

    /// HipSTR in-frame stutter model, with degenerate values replaced
    pub fn stutter_params(&self) -> Option<StutterParams> {
        Some(StutterParams::new(
            self.info_f64("INFRAME_UP")?,
            self.info_f64("INFRAME_DOWN")?,
            self.info_f64("INFRAME_PGEOM")?,
        ))
    }

    /// Repeat unit length in bp
    pub fn period(&self) -> Option<i64> {
        self.info
            .get("PERIOD")
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|&p| p > 0)
    }

    pub fn motif(&self) -> Option<String> {
        Some(infer_repeat_sequence(&self.alleles[0], self.period()? as usize))
    }
}

fn parse_sample(sample: &str, format: &[String]) -> SampleCall {
    let values: HashMap<&str, &str> = format
        .iter()
        .map(|k| k.as_str())
        .zip(sample.split(':'))
        .filter(|(_, v)| !v.is_empty() && *v != ".")
        .collect();

    SampleCall {
        genotype: values.get("GT").map(|v| v.to_string()),
        quality: values.get("Q").and_then(|v| v.parse::<f64>().ok()),
        depth: values
            .get("DP")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
            .max(0),
        read_support: values.get("MALLREADS").map(|v| v.to_string()),
    }
}

/// Most frequent k-mer of length `period` in `seq`, reported as its
/// lexicographically smallest rotation
pub fn infer_repeat_sequence(seq: &str, period: usize) -> String {
    let seq = seq.to_uppercase();
    if period == 0 || period > seq.len() {
        return "N".repeat(period);
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order = Vec::new();
    for start in 0..=(seq.len() - period) {
        let kmer = &seq[start..start + period];
        let count = counts.entry(kmer).or_insert(0);
        if *count == 0 {
            order.push(kmer);
        }
        *count += 1;
    }

    let mut best = order[0];
    for &kmer in &order {
        if counts[kmer] > counts[best] {
            best = kmer;
        }
    }

    (0..period)
        .map(|i| format!("{}{}", &best[i..], &best[..i]))
        .min()
        .unwrap_or_else(|| best.to_string())
}

/// A `chrom[:start-end]` region with 1-based inclusive coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub chrom: String,
    pub start: u64,
    pub end: Option<u64>,
}

impl FromStr for Region {
    type Err = PrancstrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PrancstrError::InvalidConfig(format!("Invalid region: {}", s));

        let Some((chrom, span)) = s.rsplit_once(':') else {
            if s.is_empty() {
                return Err(invalid());
            }
            return Ok(Region {
                chrom: s.to_string(),
                start: 1,
                end: None,
            });
        };

        let (start, end) = span.split_once('-').ok_or_else(invalid)?;
        let start = start.replace(',', "").parse::<u64>().map_err(|_| invalid())?;
        let end = end.replace(',', "").parse::<u64>().map_err(|_| invalid())?;
        if chrom.is_empty() || start == 0 || end < start {
            return Err(invalid());
        }

        Ok(Region {
            chrom: chrom.to_string(),
            start,
            end: Some(end),
        })
    }
}

/// Reader over a plain or gzip-compressed VCF
pub struct VcfReader {
    header: VcfHeader,
    reader: Box<dyn BufRead + Send>,
}

impl VcfReader {
    pub fn new<P: AsRef<Path>>(path: P) -> PrancstrResult<Self> {
        let file = File::open(&path)
            .map_err(|_| PrancstrError::FileNotFound(path.as_ref().to_string_lossy().to_string()))?;

        let mut reader: Box<dyn BufRead + Send> = if is_gzipped(&path)? {
            Box::new(BufReader::new(MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        let mut header_lines = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            let trimmed = line.trim_end();
            if !trimmed.starts_with('#') {
                return Err(PrancstrError::InvalidRecord(
                    "Data line found before the #CHROM header line".to_string(),
                ));
            }
            header_lines.push(trimmed.to_string());
            if !trimmed.starts_with("##") {
                break;
            }
        }

        let header = VcfHeader::from_lines(&header_lines)?;
        Ok(VcfReader { header, reader })
    }

    pub fn header(&self) -> &VcfHeader {
        &self.header
    }

    /// Data lines following the header
    pub fn lines(self) -> VcfLineIterator {
        VcfLineIterator {
            reader: self.reader,
        }
    }
}

/// Iterator over VCF data lines
pub struct VcfLineIterator {
    reader: Box<dyn BufRead + Send>,
}

impl Iterator for VcfLineIterator {
    type Item = PrancstrResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();

        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {
                    let trimmed = line.trim_end();
                    if trimmed.is_empty() || trimmed.starts_with('#') {
                        continue;
                    }
                    return Some(Ok(trimmed.to_string()));
                }
                Err(e) => return Some(Err(PrancstrError::Io(e))),
            }
        }
    }
}

/// Fetch the header and the data lines overlapping `region` from a
/// bgzipped, tabix-indexed VCF
pub fn read_region<P: AsRef<Path>>(
    path: P,
    region: &Region,
) -> PrancstrResult<(VcfHeader, Vec<String>)> {
    let mut reader = tbx::Reader::from_path(path.as_ref())?;
    let header = VcfHeader::from_lines(reader.header())?;

    let tid = reader.tid(&region.chrom)?;
    let end = region.end.unwrap_or_else(|| u64::from(u32::MAX));
    reader.fetch(tid, region.start - 1, end)?;

    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record?;
        lines.push(String::from_utf8_lossy(&record).trim_end().to_string());
    }

    Ok((header, lines))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const COLUMNS: &str = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2";

    fn indices() -> VcfColumnIndices {
        VcfColumnIndices::from_header(COLUMNS).unwrap()
    }

    #[test]
    fn test_column_indices() {
        let indices = indices();
        assert_eq!(indices.chrom, 0);
        assert_eq!(indices.info, 7);
        assert_eq!(indices.format, 8);
        assert_eq!(indices.samples_start, 9);

        assert!(VcfColumnIndices::from_header("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO").is_err());
    }

    #[test]
    fn test_locus_from_line() {
        let line = "chr1\t1000\tSTR_1\tACACAC\tACACACAC,ACAC\t.\tPASS\t\
                    INFRAME_UP=0.05;INFRAME_DOWN=0.02;INFRAME_PGEOM=0.9;PERIOD=2\t\
                    GT:Q:DP:MALLREADS\t0|1:0.98:20:0|10;2|10\t./.:.:-1:.";
        let locus = StrLocus::from_line(line, &indices()).unwrap();

        assert_eq!(locus.name(), "chr1:1000");
        assert_eq!(locus.id, "STR_1");
        assert_eq!(locus.alleles, vec!["ACACAC", "ACACACAC", "ACAC"]);
        assert!(locus.is_passing());
        assert!(locus.has_format("MALLREADS"));
        assert_eq!(locus.period(), Some(2));
        assert_eq!(locus.motif(), Some("AC".to_string()));
        assert_eq!(
            locus.stutter_params(),
            Some(StutterParams { up: 0.05, down: 0.02, rho: 0.9 })
        );

        assert_eq!(
            locus.samples[0],
            SampleCall {
                genotype: Some("0|1".to_string()),
                quality: Some(0.98),
                depth: 20,
                read_support: Some("0|10;2|10".to_string()),
            }
        );
        assert_eq!(
            locus.samples[1],
            SampleCall {
                genotype: Some("./.".to_string()),
                ..SampleCall::default()
            }
        );
    }

    #[test]
    fn test_locus_missing_stutter_and_trailing_fields() {
        let line = "chr2\t50\t.\tTTTT\t.\t.\tlowQ\tPERIOD=1\tGT:Q:DP:MALLREADS\t0|0\t0|0:0.5";
        let locus = StrLocus::from_line(line, &indices()).unwrap();

        assert!(!locus.is_passing());
        assert_eq!(locus.alleles, vec!["TTTT"]);
        assert_eq!(locus.stutter_params(), None);
        assert_eq!(locus.samples[0].read_support, None);
        assert_eq!(locus.samples[1].quality, Some(0.5));
        assert_eq!(locus.samples[1].depth, 0);
    }

    #[test]
    fn test_locus_invalid_line() {
        assert!(StrLocus::from_line("chr1\t100\t.\tA", &indices()).is_err());
        assert!(StrLocus::from_line("chr1\tx\t.\tA\tT\t.\tPASS\t.\tGT", &indices()).is_err());
    }

    #[test]
    fn test_infer_repeat_sequence() {
        assert_eq!(infer_repeat_sequence("CACACACA", 2), "AC");
        assert_eq!(infer_repeat_sequence("tcattcattcat", 4), "ATTC");
        assert_eq!(infer_repeat_sequence("AA", 3), "NNN");
    }

    #[test]
    fn test_vcf_type() {
        let meta = vec![
            "##fileformat=VCFv4.1".to_string(),
            "##command=hipstr --bams x.bam".to_string(),
        ];
        assert_eq!(VcfType::infer(&meta).unwrap(), VcfType::Hipstr);

        let meta = vec!["##command=GangSTR --bam x.bam".to_string()];
        assert_eq!(VcfType::infer(&meta).unwrap(), VcfType::Gangstr);

        assert!(VcfType::infer(&["##fileformat=VCFv4.2".to_string()]).is_err());

        assert_eq!("HipSTR".parse::<VcfType>().unwrap(), VcfType::Hipstr);
        assert!("freebayes".parse::<VcfType>().is_err());
        assert_eq!(VcfType::Eh.to_string(), "eh");
    }

    #[test]
    fn test_region_parse() {
        assert_eq!(
            "chr1:100-200".parse::<Region>().unwrap(),
            Region { chrom: "chr1".to_string(), start: 100, end: Some(200) }
        );
        assert_eq!(
            "chrX".parse::<Region>().unwrap(),
            Region { chrom: "chrX".to_string(), start: 1, end: None }
        );
        assert!("chr1:200-100".parse::<Region>().is_err());
        assert!("chr1:0-100".parse::<Region>().is_err());
        assert!("chr1:abc".parse::<Region>().is_err());
    }

    #[test]
    fn test_vcf_reader() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "##fileformat=VCFv4.1").unwrap();
        writeln!(temp_file, "##command=hipstr").unwrap();
        writeln!(temp_file, "{}", COLUMNS).unwrap();
        writeln!(temp_file, "chr1\t100\t.\tAC\tACAC\t.\tPASS\tPERIOD=2\tGT\t0|1\t0|0").unwrap();
        writeln!(temp_file).unwrap();
        writeln!(temp_file, "chr1\t200\t.\tAC\tACAC\t.\tPASS\tPERIOD=2\tGT\t0|1\t0|0").unwrap();

        let reader = VcfReader::new(temp_file.path()).unwrap();
        assert_eq!(reader.header().samples, vec!["S1", "S2"]);
        assert_eq!(reader.header().meta.len(), 2);

        let lines: Vec<String> = reader.lines().collect::<PrancstrResult<_>>().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("chr1\t200"));
    }

    #[test]
    fn test_vcf_reader_gzipped() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let temp_file = NamedTempFile::new().unwrap();
        let mut encoder = GzEncoder::new(File::create(temp_file.path()).unwrap(), Compression::default());
        writeln!(encoder, "##command=hipstr").unwrap();
        writeln!(encoder, "{}", COLUMNS).unwrap();
        writeln!(encoder, "chr1\t100\t.\tAC\tACAC\t.\tPASS\tPERIOD=2\tGT\t0|1\t0|0").unwrap();
        encoder.finish().unwrap();

        let reader = VcfReader::new(temp_file.path()).unwrap();
        assert_eq!(reader.lines().count(), 1);
    }

    #[test]
    fn test_vcf_reader_missing_header() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "chr1\t100\t.\tAC\tACAC\t.\tPASS\tPERIOD=2\tGT\t0|1").unwrap();
        assert!(VcfReader::new(temp_file.path()).is_err());
        assert!(VcfReader::new("/nonexistent/file.vcf").is_err());
    }
}
