//! On-disk layout of a recording session.
//!
//! ```text
//! <output_dir>/<YYYYmmdd_HHMMSS>[_n]/
//!     images/0.jpg, 1.jpg, ...
//!     pose.csv     one row per sample, 6 columns
//!     force.csv    one row per sample
//! ```
//!
//! Values are written with six decimals, comma-separated.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use metaball_types::{MetaballError, RecordingSample};
use tracing::info;

const SESSION_DIR_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Persist `samples` into a fresh, timestamped directory under `output_dir`
/// and return its path.
///
/// # Errors
///
/// [`MetaballError::PersistFailure`] on any filesystem error.
pub fn write_session(output_dir: &Path, samples: &[RecordingSample]) -> Result<PathBuf, MetaballError> {
    let stamp = Local::now().format(SESSION_DIR_FORMAT).to_string();
    let dir = create_unique_dir(output_dir, &stamp).map_err(|e| persist_error(output_dir, e))?;
    write_samples(&dir, samples).map_err(|e| persist_error(&dir, e))?;
    info!(dir = %dir.display(), samples = samples.len(), "recording saved");
    Ok(dir)
}

fn persist_error(path: &Path, e: io::Error) -> MetaballError {
    MetaballError::PersistFailure(format!("{}: {e}", path.display()))
}

/// Create `<parent>/<stem>`, or `<stem>_1`, `<stem>_2`, ... if taken.
fn create_unique_dir(parent: &Path, stem: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(parent)?;
    let mut suffix = 0u32;
    loop {
        let name = if suffix == 0 {
            stem.to_string()
        } else {
            format!("{stem}_{suffix}")
        };
        let candidate = parent.join(name);
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => return Err(e),
        }
    }
}

fn write_samples(dir: &Path, samples: &[RecordingSample]) -> io::Result<()> {
    let images = dir.join("images");
    fs::create_dir_all(&images)?;

    let mut pose_csv = BufWriter::new(File::create(dir.join("pose.csv"))?);
    let mut force_csv = BufWriter::new(File::create(dir.join("force.csv"))?);

    for (i, sample) in samples.iter().enumerate() {
        fs::write(images.join(format!("{i}.jpg")), &sample.image)?;
        write_row(&mut pose_csv, &sample.pose)?;
        write_row(&mut force_csv, &sample.force)?;
    }

    pose_csv.flush()?;
    force_csv.flush()
}

fn write_row<W: Write>(out: &mut W, values: &[f64]) -> io::Result<()> {
    let row = values
        .iter()
        .map(|v| format!("{v:.6}"))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(out, "{row}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(n: usize) -> Vec<RecordingSample> {
        (0..n)
            .map(|i| RecordingSample {
                pose: [i as f64, 0.5, -1.0, 0.0, 0.0, 0.125],
                force: vec![1.0 / 3.0, 0.0, 9.81, 0.0, 0.0, 0.0],
                image: vec![0xFF, 0xD8, i as u8, 0xFF, 0xD9],
            })
            .collect()
    }

    #[test]
    fn writes_expected_layout() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        let dir = write_session(root.path(), &samples(3))?;

        let pose = fs::read_to_string(dir.join("pose.csv"))?;
        let lines: Vec<&str> = pose.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "2.000000,0.500000,-1.000000,0.000000,0.000000,0.125000");

        let force = fs::read_to_string(dir.join("force.csv"))?;
        assert!(force.starts_with("0.333333,0.000000,9.810000"));

        assert_eq!(fs::read(dir.join("images").join("1.jpg"))?, vec![0xFF, 0xD8, 1, 0xFF, 0xD9]);
        assert_eq!(fs::read_dir(dir.join("images"))?.count(), 3);
        Ok(())
    }

    #[test]
    fn directory_name_is_timestamp() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        let dir = write_session(root.path(), &samples(1))?;
        let name = dir.file_name().and_then(|n| n.to_str()).ok_or("no name")?;
        assert_eq!(name.len(), 15);
        assert_eq!(&name[8..9], "_");
        assert!(name[..8].chars().all(|c| c.is_ascii_digit()));
        Ok(())
    }

    #[test]
    fn collisions_get_numeric_suffix() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        let a = create_unique_dir(root.path(), "20240101_120000")?;
        let b = create_unique_dir(root.path(), "20240101_120000")?;
        let c = create_unique_dir(root.path(), "20240101_120000")?;
        assert!(a.ends_with("20240101_120000"));
        assert!(b.ends_with("20240101_120000_1"));
        assert!(c.ends_with("20240101_120000_2"));
        Ok(())
    }

    #[test]
    fn unwritable_root_is_persist_failure() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        let blocker = root.path().join("file");
        fs::write(&blocker, b"x")?;
        let err = write_session(&blocker, &samples(1)).unwrap_err();
        assert!(matches!(err, MetaballError::PersistFailure(_)));
        Ok(())
    }
}
