//! Utility functions for file handling and common operations

use crate::{PrancstrError, PrancstrResult};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Check if a file is gzip compressed
pub fn is_gzipped<P: AsRef<Path>>(path: P) -> PrancstrResult<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0; 2];

    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1f, 0x8b]),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(PrancstrError::Io(e)),
    }
}

/// Get the number of CPU cores, with a fallback default
pub fn get_num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

/// Validate that a file exists and is readable
pub fn validate_file_readable<P: AsRef<Path>>(path: P) -> PrancstrResult<()> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PrancstrError::FileNotFound(path.to_string_lossy().to_string()));
    }

    File::open(path).map_err(|_| PrancstrError::FileNotFound(path.to_string_lossy().to_string()))?;

    Ok(())
}

/// Check that an output prefix can be written: its directory must exist and
/// it must not itself name a directory
pub fn validate_output_prefix(prefix: &str) -> PrancstrResult<()> {
    if prefix == "stdout" {
        return Ok(());
    }

    let path = Path::new(prefix);
    if path.is_dir() && prefix.ends_with(std::path::MAIN_SEPARATOR) {
        return Err(PrancstrError::InvalidConfig(format!(
            "The output location {} is a directory",
            prefix
        )));
    }

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    if !directory.is_dir() {
        return Err(PrancstrError::FileNotFound(format!(
            "The directory which contains the output location {} does not exist",
            prefix
        )));
    }

    Ok(())
}

/// Log progress through the input records
pub fn log_progress(records: usize, elapsed: std::time::Duration) {
    if records > 0 {
        log::debug!(
            "Finished {} records, time/record={:.5}sec",
            records,
            elapsed.as_secs_f64() / records as f64
        );
    }
}

/// Timer utility for measuring execution time
pub struct Timer {
    start: std::time::Instant,
    name: String,
}

impl Timer {
    pub fn new(name: &str) -> Self {
        log::info!("Starting timer: {}", name);
        Timer {
            start: std::time::Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }

    pub fn log_elapsed(&self) {
        let duration = self.elapsed();
        log::info!("Timer '{}' elapsed: {:.2?}", self.name, duration);
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.log_elapsed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_is_gzipped() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "##fileformat=VCFv4.1").unwrap();
        assert!(!is_gzipped(temp_file.path()).unwrap());

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(&[0x1f, 0x8b]).unwrap();
        assert!(is_gzipped(temp_file.path()).unwrap());

        let temp_file = NamedTempFile::new().unwrap();
        assert!(!is_gzipped(temp_file.path()).unwrap());
    }

    #[test]
    fn test_get_num_cpus() {
        assert!(get_num_cpus() >= 1);
    }

    #[test]
    fn test_validate_file_readable() {
        let temp_file = NamedTempFile::new().unwrap();
        assert!(validate_file_readable(temp_file.path()).is_ok());
        assert!(validate_file_readable("/nonexistent/file.vcf").is_err());
    }

    #[test]
    fn test_validate_output_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("calls");
        assert!(validate_output_prefix(prefix.to_str().unwrap()).is_ok());
        assert!(validate_output_prefix("stdout").is_ok());
        assert!(validate_output_prefix("/nonexistent/dir/calls").is_err());

        let as_directory = format!("{}{}", dir.path().display(), std::path::MAIN_SEPARATOR);
        assert!(validate_output_prefix(&as_directory).is_err());
    }

    #[test]
    fn test_timer() {
        let timer = Timer::new("test");
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(timer.elapsed().as_millis() >= 1);
    }
}
