use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// `studentName_rollNumber.ext`, with whitespace runs collapsed to `_` and path separators
/// removed.
pub fn entry_name(student_name: &str, roll_number: &str, extension: &str) -> String {
    format!(
        "{}_{}.{}",
        normalize_part(student_name),
        normalize_part(roll_number),
        extension
    )
}

fn normalize_part(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' => ' ',
            other => other,
        })
        .collect();
    let joined = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    if joined.is_empty() {
        "unnamed".to_string()
    } else {
        joined
    }
}

/// Zip archive spooled to a temporary file; entries are appended as they are produced.
pub struct ArchiveBuilder {
    zip: ZipWriter<File>,
    spool: NamedTempFile,
    names: HashSet<String>,
    entries: usize,
}

pub struct FinishedArchive {
    spool: NamedTempFile,
    pub size_bytes: u64,
    pub checksum: String,
    pub entries: usize,
}

impl FinishedArchive {
    pub fn path(&self) -> &Path {
        self.spool.path()
    }
}

impl ArchiveBuilder {
    pub fn create() -> Result<Self> {
        let spool = NamedTempFile::new().context("failed to create archive spool file")?;
        let file = spool
            .reopen()
            .context("failed to open archive spool file")?;
        Ok(Self {
            zip: ZipWriter::new(file),
            spool,
            names: HashSet::new(),
            entries: 0,
        })
    }

    fn unique_name(&mut self, name: &str) -> String {
        if self.names.insert(name.to_string()) {
            return name.to_string();
        }
        let (stem, extension) = match name.rsplit_once('.') {
            Some((stem, extension)) => (stem, format!(".{extension}")),
            None => (name, String::new()),
        };
        let mut counter = 2;
        loop {
            let candidate = format!("{stem}_{counter}{extension}");
            if self.names.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }

    /// Appends an entry and returns the name it was stored under.
    pub fn append(&mut self, name: &str, bytes: &[u8]) -> Result<String> {
        let name = self.unique_name(name);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip
            .start_file(name.as_str(), options)
            .with_context(|| format!("failed to start archive entry {name}"))?;
        self.zip
            .write_all(bytes)
            .with_context(|| format!("failed to write archive entry {name}"))?;
        self.entries += 1;
        Ok(name)
    }

    pub fn finish(self) -> Result<FinishedArchive> {
        let mut file = self.zip.finish().context("failed to finalize archive")?;
        file.flush().context("failed to flush archive")?;
        let size_bytes = file
            .metadata()
            .context("failed to stat archive")?
            .len();
        file.seek(SeekFrom::Start(0))
            .context("failed to rewind archive")?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher).context("failed to hash archive")?;

        Ok(FinishedArchive {
            spool: self.spool,
            size_bytes,
            checksum: hex::encode(hasher.finalize()),
            entries: self.entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_names_normalize_whitespace() {
        assert_eq!(entry_name("Asha  Verma", "21CS014", "pdf"), "Asha_Verma_21CS014.pdf");
        assert_eq!(entry_name(" Ravi\tKumar ", "21/CS/02", "pdf"), "Ravi_Kumar_21_CS_02.pdf");
        assert_eq!(entry_name("", "", "pdf"), "unnamed_unnamed.pdf");
    }

    #[test]
    fn colliding_entries_get_suffixes_and_checksum_matches() -> Result<()> {
        let mut builder = ArchiveBuilder::create()?;
        let first = builder.append("Asha_Verma_21CS014.pdf", b"one")?;
        let second = builder.append("Asha_Verma_21CS014.pdf", b"two")?;
        assert_eq!(first, "Asha_Verma_21CS014.pdf");
        assert_eq!(second, "Asha_Verma_21CS014_2.pdf");

        let finished = builder.finish()?;
        assert_eq!(finished.entries, 2);
        let bytes = std::fs::read(finished.path())?;
        assert_eq!(bytes.len() as u64, finished.size_bytes);
        assert_eq!(hex::encode(Sha256::digest(&bytes)), finished.checksum);

        let archive = zip::ZipArchive::new(File::open(finished.path())?)?;
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["Asha_Verma_21CS014.pdf", "Asha_Verma_21CS014_2.pdf"]);
        Ok(())
    }
}
