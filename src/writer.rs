use crate::config::{BATCH_FILE_PREFIX, BATCH_FILE_SUFFIX, DEFAULT_COMPRESSION_LEVEL};
use crate::error::WriteError;
use crate::models::{Batch, CleanArticle};
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const WRITE_BUFFER_SIZE: usize = 128 * 1024;

/// Largest batch number whose file name still sorts correctly by name alone.
pub const MAX_NAME_SORTED_BATCH: u32 = 9999;

/// What ended up on disk for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReceipt {
    pub number: u32,
    pub path: PathBuf,
    pub articles: usize,
    /// Compressed size
    pub bytes: u64,
}

/// `wikipedia_batch_0007.jsonl.zst`; numbers past 9999 simply grow wider.
pub fn batch_file_name(number: u32) -> String {
    format!("{}{:04}{}", BATCH_FILE_PREFIX, number, BATCH_FILE_SUFFIX)
}

/// Inverse of [`batch_file_name`]. `None` for anything that is not a batch file.
pub fn batch_number(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix(BATCH_FILE_PREFIX)?
        .strip_suffix(BATCH_FILE_SUFFIX)
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))?
        .parse()
        .ok()
}

/// Writes batches as zstd-compressed JSON lines, one file per batch.
pub struct BatchWriter {
    output_dir: PathBuf,
    level: i32,
    compression_threads: u32,
}

impl BatchWriter {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            level: DEFAULT_COMPRESSION_LEVEL,
            compression_threads: num_cpus::get() as u32,
        }
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn path_for(&self, number: u32) -> PathBuf {
        self.output_dir.join(batch_file_name(number))
    }

    /// Encodes and compresses `batch`, then renames it into place so a
    /// partially written file never carries the final name.
    pub fn write(&self, batch: &Batch) -> Result<BatchReceipt, WriteError> {
        let payload = encode_lines(batch)?;

        let path = self.path_for(batch.number);
        let tmp_path = path.with_extension("zst.tmp");

        if batch.number == MAX_NAME_SORTED_BATCH + 1 {
            warn!(
                batch = batch.number,
                "Batch numbers now exceed four digits; order files by parsed number, not by name"
            );
        }

        let written = self
            .compress_to(&tmp_path, &payload)
            .map_err(|e| WriteError::io(&tmp_path, e))
            .and_then(|()| fs::rename(&tmp_path, &path).map_err(|e| WriteError::io(&path, e)));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                debug!(path = %tmp_path.display(), error = %cleanup, "No temp file to remove");
            }
            return Err(e);
        }

        let bytes = fs::metadata(&path)
            .map_err(|e| WriteError::io(&path, e))?
            .len();

        debug!(
            batch = batch.number,
            articles = batch.len(),
            raw_bytes = payload.len(),
            bytes,
            "Batch file written"
        );

        Ok(BatchReceipt {
            number: batch.number,
            path,
            articles: batch.len(),
            bytes,
        })
    }

    fn compress_to(&self, path: &Path, payload: &[u8]) -> std::io::Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);

        let mut encoder = zstd::stream::write::Encoder::new(writer, self.level)?;
        encoder.long_distance_matching(true)?;
        encoder.multithread(self.compression_threads)?;
        encoder.write_all(payload)?;

        let mut writer = encoder.finish()?;
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| e.into_error())?
            .sync_all()
    }
}

/// Compact JSON per article, joined by `\n` with no trailing newline.
fn encode_lines(batch: &Batch) -> Result<Vec<u8>, WriteError> {
    let mut payload = Vec::with_capacity(batch.len() * 2048);
    for (i, article) in batch.articles.iter().enumerate() {
        if i > 0 {
            payload.push(b'\n');
        }
        serde_json::to_writer(&mut payload, article).map_err(|source| WriteError::Encode {
            number: batch.number,
            source,
        })?;
    }
    Ok(payload)
}

/// Reads a batch file back into its articles, in file order.
pub fn read_batch(path: impl AsRef<Path>) -> Result<Vec<CleanArticle>> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("Failed to open batch file: {}", path.display()))?;
    let decoder = zstd::stream::read::Decoder::new(file)
        .with_context(|| format!("Failed to start decompressing: {}", path.display()))?;

    let mut articles = Vec::new();
    for (i, line) in BufReader::new(decoder).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to decompress: {}", path.display()))?;
        if line.is_empty() {
            continue;
        }
        let article: CleanArticle = serde_json::from_str(&line)
            .with_context(|| format!("Bad record on line {} of {}", i + 1, path.display()))?;
        articles.push(article);
    }
    Ok(articles)
}

/// Batch files in `dir`, ordered by batch number (not by name, which stops
/// agreeing past [`MAX_NAME_SORTED_BATCH`]).
pub fn list_batches(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut files: Vec<(u32, PathBuf)> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list output directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|path| {
            let number = path.file_name()?.to_str().and_then(batch_number)?;
            Some((number, path))
        })
        .collect();
    files.sort_by_key(|(number, _)| *number);
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn batch(number: u32, ids: std::ops::Range<u64>) -> Batch {
        Batch {
            number,
            articles: ids
                .map(|id| CleanArticle::new(id, format!("Title {}", id), format!("Body of {}", id)))
                .collect(),
        }
    }

    #[test]
    fn file_names_are_zero_padded() {
        assert_eq!(batch_file_name(0), "wikipedia_batch_0000.jsonl.zst");
        assert_eq!(batch_file_name(42), "wikipedia_batch_0042.jsonl.zst");
        assert_eq!(batch_file_name(12345), "wikipedia_batch_12345.jsonl.zst");
    }

    #[test]
    fn written_batch_reads_back_in_order() {
        let dir = TempDir::new().unwrap();
        let writer = BatchWriter::new(dir.path());
        let original = batch(3, 10..25);

        let receipt = writer.write(&original).unwrap();
        assert_eq!(receipt.number, 3);
        assert_eq!(receipt.articles, 15);
        assert_eq!(receipt.path, dir.path().join("wikipedia_batch_0003.jsonl.zst"));
        assert!(receipt.bytes > 0);

        let articles = read_batch(&receipt.path).unwrap();
        assert_eq!(articles, original.articles);
    }

    #[test]
    fn lines_are_compact_without_trailing_newline() {
        let dir = TempDir::new().unwrap();
        let writer = BatchWriter::new(dir.path());
        let mut b = batch(0, 1..3);
        b.articles[0].title = "Zürich".into();

        let receipt = writer.write(&b).unwrap();
        let raw = zstd::decode_all(File::open(&receipt.path).unwrap()).unwrap();
        let text = String::from_utf8(raw).unwrap();

        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            r#"{"id":1,"title":"Zürich","text":"Body of 1","url":"https://en.wikipedia.org/wiki?curid=1"}"#
        );
        assert!(!text.ends_with('\n'));
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let writer = BatchWriter::new(dir.path()).with_level(1);
        writer.write(&batch(0, 0..5)).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["wikipedia_batch_0000.jsonl.zst".to_string()]);
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let writer = BatchWriter::new(dir.path().join("gone"));
        let err = writer.write(&batch(0, 0..1)).unwrap_err();
        assert!(matches!(err, WriteError::Io { .. }));
    }

    #[test]
    fn failed_rename_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        let writer = BatchWriter::new(dir.path()).with_level(1);
        // A non-empty directory squatting on the final name makes the rename fail.
        let blocker = writer.path_for(0);
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), "x").unwrap();

        let err = writer.write(&batch(0, 0..3)).unwrap_err();

        assert!(matches!(err, WriteError::Io { .. }));
        let leftovers: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left: {:?}", leftovers);
    }

    #[test]
    fn batch_numbers_parse_from_names() {
        assert_eq!(batch_number("wikipedia_batch_0007.jsonl.zst"), Some(7));
        assert_eq!(batch_number("wikipedia_batch_10000.jsonl.zst"), Some(10000));
        assert_eq!(batch_number(&batch_file_name(123_456)), Some(123_456));
        assert_eq!(batch_number("wikipedia_batch_.jsonl.zst"), None);
        assert_eq!(batch_number("wikipedia_batch_00x1.jsonl.zst"), None);
        assert_eq!(batch_number("wikipedia_batch_0001.jsonl.zst.tmp"), None);
        assert_eq!(batch_number("notes.txt"), None);
    }

    #[test]
    fn listing_orders_five_digit_numbers_after_four() {
        let dir = TempDir::new().unwrap();
        let writer = BatchWriter::new(dir.path()).with_level(1);
        for number in [10000, 1001, 9999] {
            writer.write(&batch(number, 0..1)).unwrap();
        }

        let names: Vec<String> = list_batches(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "wikipedia_batch_1001.jsonl.zst",
                "wikipedia_batch_9999.jsonl.zst",
                "wikipedia_batch_10000.jsonl.zst",
            ]
        );
    }

    #[test]
    fn listing_sorts_by_batch_number() {
        let dir = TempDir::new().unwrap();
        let writer = BatchWriter::new(dir.path());
        for number in [2, 0, 11, 1] {
            writer.write(&batch(number, 0..1)).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let names: Vec<String> = list_batches(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                batch_file_name(0),
                batch_file_name(1),
                batch_file_name(2),
                batch_file_name(11),
            ]
        );
    }
}
