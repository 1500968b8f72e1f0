//! Application storage behind the gate.
//!
//! Below the scoped-storage tier, reads and writes need the storage grant;
//! without it writes are silently skipped and reads come back empty. Files
//! are locked with `fs2` while being read or written so two instances of the
//! application cannot interleave lines.

use crate::error::{GateError, Result};
use crate::flow::SCOPED_STORAGE_TIER;
use crate::models::PlatformTier;
use crate::platform::CapabilityOracle;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ScopedStorage {
    root: PathBuf,
    tier: PlatformTier,
}

impl ScopedStorage {
    pub fn new(root: impl Into<PathBuf>, tier: PlatformTier) -> Self {
        Self {
            root: root.into(),
            tier,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn make_dirs(&self, rel_path: &str) -> Result<PathBuf> {
        let path = self.resolve(rel_path)?;
        fs::create_dir_all(&path).map_err(|source| GateError::Storage {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Replace `filename` with `lines`. Returns false when skipped for lack of grant.
    pub fn write_lines(
        &self,
        oracle: &dyn CapabilityOracle,
        filename: &str,
        lines: &[String],
    ) -> Result<bool> {
        if !self.allowed(oracle) {
            debug!(filename, tier = %self.tier, "write skipped, no legacy grant");
            return Ok(false);
        }

        let path = self.resolve(filename)?;
        let io_err = |source| GateError::Storage {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;

        #[allow(clippy::incompatible_msrv)] // fs2 crate method, not std
        file.lock_exclusive().map_err(io_err)?;

        let written = (|| {
            file.set_len(0)?;
            let mut writer = BufWriter::new(&file);
            for line in lines {
                writeln!(writer, "{line}")?;
            }
            writer.flush()
        })();

        #[allow(clippy::incompatible_msrv)] // fs2 crate method, not std
        let _ = file.unlock();

        written.map_err(io_err)?;
        debug!(path = %path.display(), lines = lines.len(), "wrote file");
        Ok(true)
    }

    /// Lines of `filename`; empty when the file is missing or access is not held
    pub fn read_lines(&self, oracle: &dyn CapabilityOracle, filename: &str) -> Result<Vec<String>> {
        if !self.allowed(oracle) {
            debug!(filename, tier = %self.tier, "read skipped, no legacy grant");
            return Ok(Vec::new());
        }

        let path = self.resolve(filename)?;
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(GateError::Storage { path, source }),
        };

        #[allow(clippy::incompatible_msrv)] // fs2 crate method, not std
        file.lock_shared().map_err(|source| GateError::Storage {
            path: path.clone(),
            source,
        })?;

        let lines: io::Result<Vec<String>> = BufReader::new(&file).lines().collect();

        #[allow(clippy::incompatible_msrv)] // fs2 crate method, not std
        let _ = file.unlock();

        lines.map_err(|source| GateError::Storage { path, source })
    }

    /// Copy the bytes of `from` over `to`, creating `to`'s parent directories.
    /// Returns false when skipped for lack of grant.
    pub fn copy(&self, oracle: &dyn CapabilityOracle, from: &str, to: &str) -> Result<bool> {
        if !self.allowed(oracle) {
            debug!(from, to, tier = %self.tier, "copy skipped, no legacy grant");
            return Ok(false);
        }

        let src_path = self.resolve(from)?;
        let dst_path = self.resolve(to)?;
        // Truncating the destination would wipe the source
        if src_path == dst_path {
            return Ok(true);
        }

        let src_err = |source| GateError::Storage {
            path: src_path.clone(),
            source,
        };
        let dst_err = |source| GateError::Storage {
            path: dst_path.clone(),
            source,
        };

        let src = File::open(&src_path).map_err(src_err)?;
        if let Some(parent) = dst_path.parent() {
            fs::create_dir_all(parent).map_err(dst_err)?;
        }
        let dst = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&dst_path)
            .map_err(dst_err)?;

        #[allow(clippy::incompatible_msrv)] // fs2 crate method, not std
        src.lock_shared().map_err(src_err)?;
        #[allow(clippy::incompatible_msrv)] // fs2 crate method, not std
        let locked = dst.lock_exclusive();
        if let Err(e) = locked {
            #[allow(clippy::incompatible_msrv)] // fs2 crate method, not std
            let _ = src.unlock();
            return Err(dst_err(e));
        }

        let copied = (|| {
            dst.set_len(0)?;
            let mut writer = BufWriter::new(&dst);
            let bytes = io::copy(&mut BufReader::new(&src), &mut writer)?;
            writer.flush()?;
            Ok::<_, io::Error>(bytes)
        })();

        #[allow(clippy::incompatible_msrv)] // fs2 crate method, not std
        let _ = dst.unlock();
        #[allow(clippy::incompatible_msrv)] // fs2 crate method, not std
        let _ = src.unlock();

        let bytes = copied.map_err(dst_err)?;
        debug!(from = %src_path.display(), to = %dst_path.display(), bytes, "copied file");
        Ok(true)
    }

    /// Sorted names of entries directly under `rel_path`
    pub fn list(&self, rel_path: &str) -> Result<Vec<String>> {
        let path = self.resolve(rel_path)?;
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(GateError::Storage { path, source }),
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    fn allowed(&self, oracle: &dyn CapabilityOracle) -> bool {
        self.tier >= SCOPED_STORAGE_TIER || oracle.is_access_granted().unwrap_or(false)
    }

    /// Join `rel_path` onto the root, refusing absolute paths and `..`
    fn resolve(&self, rel_path: &str) -> Result<PathBuf> {
        let rel = Path::new(rel_path);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(GateError::OutsideRoot(rel_path.to_string()));
        }
        Ok(self.root.join(rel))
    }
}
