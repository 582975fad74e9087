//! Named binary blobs for fitted pipeline parts.
//!
//! A blob is `MAGIC | crc32(payload) as u32 LE | payload`, the payload being
//! the bincode encoding of the artifact.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};

pub const MODEL: &str = "model";
pub const PREPROCESSOR: &str = "preprocessor";

const MAGIC: &[u8; 4] = b"SRKB";
const HEADER_LEN: usize = MAGIC.len() + 4;

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidArtifactName {
            name: name.to_string(),
        })
    }
}

pub fn encode_blob<T: Serialize>(name: &str, artifact: &T) -> Result<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(artifact, bincode::config::standard())
        .map_err(|e| Error::corrupt(name, format!("encode failed: {e}")))?;
    let mut blob = Vec::with_capacity(HEADER_LEN + payload.len());
    blob.extend_from_slice(MAGIC);
    blob.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    blob.extend_from_slice(&payload);
    Ok(blob)
}

pub fn decode_blob<T: DeserializeOwned>(name: &str, blob: &[u8]) -> Result<T> {
    if blob.len() < HEADER_LEN {
        return Err(Error::corrupt(name, format!("blob is {} bytes, shorter than the header", blob.len())));
    }
    let (header, payload) = blob.split_at(HEADER_LEN);
    if header[..MAGIC.len()] != MAGIC[..] {
        return Err(Error::corrupt(name, "bad magic"));
    }
    let mut crc = [0u8; 4];
    crc.copy_from_slice(&header[MAGIC.len()..]);
    let expected = u32::from_le_bytes(crc);
    let actual = crc32fast::hash(payload);
    if expected != actual {
        return Err(Error::corrupt(
            name,
            format!("checksum mismatch - expected: {expected:08x}, actual: {actual:08x}"),
        ));
    }

    let (artifact, read) = bincode::serde::decode_from_slice::<T, _>(payload, bincode::config::standard())
        .map_err(|e| Error::corrupt(name, e))?;
    if read != payload.len() {
        return Err(Error::corrupt(
            name,
            format!("{} trailing bytes after payload", payload.len() - read),
        ));
    }
    Ok(artifact)
}

/// Storage for opaque named blobs. `load` returns whatever was last saved
/// under the name.
pub trait ArtifactStore: Send + Sync {
    fn put(&self, name: &str, blob: Vec<u8>) -> Result<()>;

    /// Fails with `ArtifactNotFound` when nothing was saved under `name`.
    fn get(&self, name: &str) -> Result<Vec<u8>>;

    fn save<T: Serialize>(&self, name: &str, artifact: &T) -> Result<()>
    where
        Self: Sized,
    {
        validate_name(name)?;
        let blob = encode_blob(name, artifact)?;
        debug!(artifact = name, bytes = blob.len(), "saving artifact");
        self.put(name, blob)
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T>
    where
        Self: Sized,
    {
        validate_name(name)?;
        let blob = self.get(name)?;
        debug!(artifact = name, bytes = blob.len(), "loading artifact");
        decode_blob(name, &blob)
    }
}

/// Blobs as `<dir>/<name>.bin`.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        FsArtifactStore {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.bin"))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, name: &str, blob: Vec<u8>) -> Result<()> {
        validate_name(name)?;
        fs::create_dir_all(&self.dir)?;
        let path = self.path_of(name);
        let tmp = self.dir.join(format!(".{name}.bin.tmp"));
        fs::write(&tmp, &blob)?;
        fs::rename(&tmp, &path)?;
        info!(artifact = name, path = %path.display(), bytes = blob.len(), "saved artifact");
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Vec<u8>> {
        validate_name(name)?;
        match fs::read(self.path_of(name)) {
            Ok(blob) => Ok(blob),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::ArtifactNotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(&self, name: &str, blob: Vec<u8>) -> Result<()> {
        validate_name(name)?;
        self.blobs.write().insert(name.to_string(), blob);
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Vec<u8>> {
        validate_name(name)?;
        self.blobs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ArtifactNotFound {
                name: name.to_string(),
            })
    }
}
