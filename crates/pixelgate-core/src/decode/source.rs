//! Byte sources the engine reads encoded images from.
//!
//! Resolving URIs and fetching bytes happens elsewhere; the engine only opens
//! a stream, reads it to the end and drops it.

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::ImageFrom;

/// A readable origin of encoded image bytes.
pub trait ByteSource: Send + Sync {
    /// Open a fresh stream positioned at the first byte.
    fn open_stream(&self) -> io::Result<Box<dyn Read + '_>>;

    /// Provenance tag reported with the decoded image.
    fn image_from(&self) -> ImageFrom;
}

/// Read a source to the end. The stream is dropped on every exit path.
pub(crate) fn read_all(source: &dyn ByteSource) -> io::Result<Vec<u8>> {
    let mut stream = source.open_stream()?;
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Bytes already in memory (downloaded, bundled, or from a disk cache).
#[derive(Debug, Clone)]
pub struct MemorySource {
    bytes: Arc<[u8]>,
    from: ImageFrom,
}

impl MemorySource {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
            from: ImageFrom::Memory,
        }
    }

    /// Override the provenance tag, e.g. for bytes fetched from the network.
    pub fn with_image_from(mut self, from: ImageFrom) -> Self {
        self.from = from;
        self
    }
}

impl ByteSource for MemorySource {
    fn open_stream(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(Cursor::new(&self.bytes[..])))
    }

    fn image_from(&self) -> ImageFrom {
        self.from
    }
}

/// An image file on local disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn open_stream(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(BufReader::new(File::open(&self.path)?)))
    }

    fn image_from(&self) -> ImageFrom {
        ImageFrom::Disk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_reads_all() {
        let source = MemorySource::new(vec![1u8, 2, 3]);
        assert_eq!(read_all(&source).unwrap(), vec![1, 2, 3]);
        assert_eq!(source.image_from(), ImageFrom::Memory);
    }

    #[test]
    fn test_memory_source_reopens_from_start() {
        let source = MemorySource::new(vec![9u8; 16]).with_image_from(ImageFrom::Network);
        assert_eq!(read_all(&source).unwrap().len(), 16);
        assert_eq!(read_all(&source).unwrap().len(), 16);
        assert_eq!(source.image_from(), ImageFrom::Network);
    }

    #[test]
    fn test_file_source() {
        let path = std::env::temp_dir().join(format!("pixelgate-source-{}.bin", std::process::id()));
        std::fs::write(&path, [7u8, 8, 9]).unwrap();

        let source = FileSource::new(&path);
        assert_eq!(read_all(&source).unwrap(), vec![7, 8, 9]);
        assert_eq!(source.image_from(), ImageFrom::Disk);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let source = FileSource::new("/nonexistent/pixelgate/missing.png");
        let err = read_all(&source).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
