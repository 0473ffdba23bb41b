use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;
use crate::processing::pcm;
use crate::processing::wav_format::{WavSpec, WAV_HEADER_SIZE};

/// Streaming PCM WAV writer for the intermediate audio artifact.
///
/// ## File Format
///
/// ```text
/// [44-byte WAV header, sizes patched on close]
/// [little-endian integer PCM at spec.bit_depth...]
/// ```
pub struct WavFileWriter {
    file_path: PathBuf,
    spec: WavSpec,
    file: Option<File>,
    data_bytes: u64,
}

impl WavFileWriter {
    pub fn new(file_path: PathBuf, spec: WavSpec) -> Self {
        Self {
            file_path,
            spec,
            file: None,
            data_bytes: 0,
        }
    }

    /// Create (or truncate) the file and write a placeholder header.
    pub fn open(&mut self) -> Result<(), CaptureError> {
        if self.file.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).map_err(|e| CaptureError::storage("failed to create directory", e))?;
        }

        let mut file = File::create(&self.file_path).map_err(|e| CaptureError::storage("failed to create file", e))?;
        file.write_all(&self.spec.header(0))
            .map_err(|e| CaptureError::storage("write failed", e))?;

        self.file = Some(file);
        self.data_bytes = 0;
        Ok(())
    }

    /// Encode and append samples at the writer's bit depth.
    pub fn write_samples(&mut self, samples: &[f32]) -> Result<(), CaptureError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::StorageError("file is not open for writing".into()))?;
        let data = pcm::encode_pcm(samples, self.spec.bit_depth)?;
        file.write_all(&data)
            .map_err(|e| CaptureError::storage("write failed", e))?;
        self.data_bytes += data.len() as u64;
        Ok(())
    }

    /// Patch the header sizes, close the file and return its SHA-256.
    pub fn close(&mut self) -> Result<String, CaptureError> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| CaptureError::StorageError("file is not open".into()))?;

        let data_size = u32::try_from(self.data_bytes)
            .map_err(|_| CaptureError::StorageError(format!("{} bytes exceed the WAV size limit", self.data_bytes)))?;

        file.seek(SeekFrom::Start(0))
            .map_err(|e| CaptureError::storage("seek failed", e))?;
        file.write_all(&self.spec.header(data_size))
            .map_err(|e| CaptureError::storage("header patch failed", e))?;
        file.flush().map_err(|e| CaptureError::storage("flush failed", e))?;
        drop(file);

        sha256_file(&self.file_path)
    }

    /// Total bytes written so far, including the header.
    pub fn bytes_written(&self) -> u64 {
        WAV_HEADER_SIZE as u64 + self.data_bytes
    }

    pub fn duration_secs(&self) -> f64 {
        self.spec.duration_secs(self.data_bytes)
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

/// Compute SHA-256 hex digest of a file.
pub fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let data = fs::read(path).map_err(|e| CaptureError::storage("failed to read file for checksum", e))?;
    Ok(hex_encode(&Sha256::digest(&data)))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
