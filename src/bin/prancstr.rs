//! CLI binary for prancSTR - detects somatic mosaicism at STRs from HipSTR VCFs

use clap::Parser;
use env_logger::Env;
use std::collections::HashSet;
use std::path::PathBuf;
use prancstr_rs::{
    detect::{run_detection, validate_mosaic_config, DetectionOptions, ResultWriter},
    utils::{get_num_cpus, validate_file_readable, validate_output_prefix, Timer},
    vcf::{read_region, Region, VcfHeader, VcfReader, VcfType},
    MosaicConfig, PrancstrError, PrancstrResult,
};

type VcfLines = Box<dyn Iterator<Item = PrancstrResult<String>>>;

#[derive(Parser)]
#[command(name = "prancstr")]
#[command(version)]
#[command(about = "prancSTR - detection of somatic mosaicism at short tandem repeats")]
#[command(long_about = "
prancSTR tests each called sample at each STR locus for a third, mosaic allele
present in a fraction of reads. For every sample with genotype (A,B) it jointly
estimates the mosaic allele C and mosaic fraction f by maximum likelihood under
the locus' PCR stutter model, then tests H0: f=0 with a boundary-corrected
likelihood-ratio test.

Input must be a HipSTR VCF with MALLREADS, Q and DP FORMAT fields and the
INFRAME_UP, INFRAME_DOWN, INFRAME_PGEOM and PERIOD INFO fields.

Results are written as a tab-separated table to <out>.tab, one line per
tested sample and locus.
")]
struct Args {
    /// Input STR VCF file
    #[arg(long, value_name = "FILE")]
    vcf: PathBuf,

    /// Output file prefix. Use stdout to print results to standard output
    #[arg(long, value_name = "PREFIX")]
    out: String,

    /// VCF type: auto, gangstr, advntr, hipstr, eh or popstr
    #[arg(long, default_value = "auto")]
    vcftype: String,

    /// Comma-separated list of samples to process
    #[arg(long, value_delimiter = ',')]
    samples: Option<Vec<String>>,

    /// Restrict to the region chrom:start-end. Requires the VCF to be bgzipped and tabix indexed
    #[arg(long)]
    region: Option<String>,

    /// Only process records where FILTER==PASS
    #[arg(long)]
    only_passing: bool,

    /// Force output results for all loci
    #[arg(long)]
    output_all: bool,

    /// Maximum number of C/f alternations before giving up on convergence
    #[arg(long, default_value_t = 100)]
    max_iterations: usize,

    /// Number of worker threads
    #[arg(long, default_value_t = get_num_cpus())]
    threads: usize,

    /// Number of loci read and tested per parallel batch
    #[arg(long, default_value_t = 512)]
    batch_size: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print helpful debug messages
    #[arg(short, long)]
    debug: bool,

    /// Don't print warnings to the screen
    #[arg(short, long)]
    quiet: bool,
}

fn run() -> PrancstrResult<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();

    log::info!("Starting prancSTR analysis");
    log::info!("Input VCF: {:?}", args.vcf);
    log::info!("Output prefix: {}", args.out);
    log::info!("Number of threads: {}", args.threads);

    validate_file_readable(&args.vcf)?;
    validate_output_prefix(&args.out)?;

    let config = MosaicConfig {
        max_iterations: args.max_iterations,
        ..MosaicConfig::default()
    };
    validate_mosaic_config(&config)?;

    let options = DetectionOptions {
        samples: args
            .samples
            .map(|samples| samples.into_iter().collect::<HashSet<String>>()),
        only_passing: args.only_passing,
        output_all: args.output_all,
    };

    let _timer = Timer::new("Reading VCF header");
    let (header, lines): (VcfHeader, VcfLines) = match &args.region {
        Some(region) => {
            let region: Region = region.parse()?;
            let (header, lines) = read_region(&args.vcf, &region)?;
            let lines: VcfLines = Box::new(lines.into_iter().map(Ok));
            (header, lines)
        }
        None => {
            let reader = VcfReader::new(&args.vcf)?;
            let header = reader.header().clone();
            let lines: VcfLines = Box::new(reader.lines());
            (header, lines)
        }
    };

    let vcftype = if args.vcftype == "auto" {
        VcfType::infer(&header.meta)?
    } else {
        args.vcftype.parse::<VcfType>()?
    };
    if vcftype != VcfType::Hipstr {
        return Err(PrancstrError::UnsupportedVcfType(format!(
            "{} (only HipSTR VCFs are currently supported)",
            vcftype
        )));
    }

    if let Some(samples) = &options.samples {
        for sample in samples {
            if !header.samples.contains(sample) {
                log::warn!("Sample {} not found in VCF", sample);
            }
        }
    }

    let _timer = Timer::new("Detecting mosaicism");
    let mut writer = ResultWriter::create(&args.out)?;
    let summary = run_detection(
        lines,
        &header,
        &mut writer,
        &options,
        &config,
        args.threads,
        args.batch_size,
    )?;

    log::info!("Results summary:");
    log::info!("  Records processed: {}", summary.records);
    log::info!("  Invalid records skipped: {}", summary.invalid_records);
    log::info!("  Sample/locus pairs tested: {}", summary.results);
    log::info!("  Pairs with a mosaic allele: {}", summary.mosaic_calls);
    if args.out != "stdout" {
        log::info!("Results written to: {}.tab", args.out);
    }
    log::info!("Analysis completed successfully");

    Ok(())
}

/// Handle application errors and provide user-friendly messages
fn handle_error(error: PrancstrError) -> ! {
    match error {
        PrancstrError::FileNotFound(path) => {
            eprintln!("Error: File not found: {}", path);
            eprintln!("Please check that the file exists and is readable.");
        }
        PrancstrError::InvalidRecord(msg) => {
            eprintln!("Error: Invalid VCF data: {}", msg);
            eprintln!("Please check that your VCF file is properly formatted.");
        }
        PrancstrError::InvalidConfig(msg) => {
            eprintln!("Error: Invalid configuration: {}", msg);
            eprintln!("Please check your command line options.");
        }
        PrancstrError::UnsupportedVcfType(msg) => {
            eprintln!("Error: Unsupported VCF type: {}", msg);
            eprintln!("prancSTR currently only supports HipSTR VCFs.");
        }
        PrancstrError::Htslib(ref e) => {
            eprintln!("Error: VCF index error: {}", e);
            eprintln!("--region requires a bgzipped VCF with a tabix (.tbi) index.");
        }
        PrancstrError::Io(ref e) => {
            eprintln!("Error: I/O error: {}", e);
            eprintln!("Please check file permissions and disk space.");
        }
        PrancstrError::Csv(ref e) => {
            eprintln!("Error: Output writing error: {}", e);
            eprintln!("Please check that the output location is writable.");
        }
    }
    std::process::exit(1);
}

fn main() {
    if let Err(e) = run() {
        handle_error(e);
    }
}
