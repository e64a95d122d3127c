//! Streaming artifact digests

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use toolpin_store::HashAlgorithm;

/// Digests of one artifact, computed in a single pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDigests {
    pub sha256: String,
    pub sha512: String,
    pub size: u64,
}

impl ArtifactDigests {
    pub fn get(&self, algorithm: HashAlgorithm) -> &str {
        match algorithm {
            HashAlgorithm::Sha256 => &self.sha256,
            HashAlgorithm::Sha512 => &self.sha512,
        }
    }

    /// Case-insensitive comparison against an expected digest.
    pub fn matches(&self, algorithm: HashAlgorithm, expected: &str) -> bool {
        self.get(algorithm).eq_ignore_ascii_case(expected.trim())
    }

    pub fn of_bytes(data: &[u8]) -> Self {
        let mut writer = DigestWriter::new(io::sink());
        // Writing to io::sink cannot fail.
        let _ = writer.write_all(data);
        writer.finish().1
    }

    pub fn of_file(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let mut writer = DigestWriter::new(io::sink());
        io::copy(&mut file, &mut writer)?;
        Ok(writer.finish().1)
    }
}

/// Writer adapter that hashes everything passing through it.
pub struct DigestWriter<W> {
    inner: W,
    sha256: Sha256,
    sha512: Sha512,
    size: u64,
}

impl<W: Write> DigestWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            sha256: Sha256::new(),
            sha512: Sha512::new(),
            size: 0,
        }
    }

    pub fn finish(self) -> (W, ArtifactDigests) {
        let digests = ArtifactDigests {
            sha256: hex::encode(self.sha256.finalize()),
            sha512: hex::encode(self.sha512.finalize()),
            size: self.size,
        };
        (self.inner, digests)
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.sha256.update(&buf[..n]);
        self.sha512.update(&buf[..n]);
        self.size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Read a whole file. Signature verification needs the full message.
pub fn read_artifact(path: &Path) -> io::Result<Vec<u8>> {
    let mut data = Vec::new();
    File::open(path)?.read_to_end(&mut data)?;
    Ok(data)
}
