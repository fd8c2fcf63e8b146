//! Primary/backup checkpoint pair on disk.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::format::{CompressionType, decode_state, encode_state};
use crate::compute::RunnerState;

/// Errors raised when no usable checkpoint can be read.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("No checkpoint found at {} or {}", .primary.display(), .backup.display())]
    NotFound { primary: PathBuf, backup: PathBuf },
    #[error("Checkpoint {} is unusable and no backup exists at {}", .primary.display(), .backup.display())]
    NoBackup { primary: PathBuf, backup: PathBuf },
    #[error("Checkpoint {} and backup {} are both corrupt", .primary.display(), .backup.display())]
    BothCorrupt { primary: PathBuf, backup: PathBuf },
    #[error("Failed to read checkpoint: {0}")]
    Io(#[from] io::Error),
}

/// Path of the backup blob that pairs with `primary`.
pub fn backup_path(primary: &Path) -> PathBuf {
    let mut name = OsString::from(primary.as_os_str());
    name.push("_backup");
    PathBuf::from(name)
}

/// Writes and recovers the checkpoint pair of one run.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    primary: PathBuf,
    backup: PathBuf,
    compression: CompressionType,
}

impl CheckpointStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let primary = path.as_ref().to_path_buf();
        Self {
            backup: backup_path(&primary),
            primary,
            compression: CompressionType::None,
        }
    }

    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    pub fn primary(&self) -> &Path {
        &self.primary
    }

    pub fn backup(&self) -> &Path {
        &self.backup
    }

    /// Persist `state` to the primary blob, and to the backup on even iterations.
    pub fn save(&self, state: &RunnerState) -> io::Result<()> {
        let blob = encode_state(state, self.compression)?;
        write_atomic(&self.primary, &blob)?;
        if state.iteration % 2 == 0 {
            write_atomic(&self.backup, &blob)?;
        }
        debug!(
            "Checkpointed iteration {} to {} ({} bytes)",
            state.iteration,
            self.primary.display(),
            blob.len()
        );
        Ok(())
    }

    /// Read the primary blob, falling back to the backup if it is missing or corrupt.
    pub fn recover(&self) -> Result<RunnerState, RecoveryError> {
        let primary_failure = match read_blob(&self.primary) {
            Ok(Some(state)) => return Ok(state),
            Ok(None) => {
                warn!(
                    "Checkpoint {} not found; trying backup {}",
                    self.primary.display(),
                    self.backup.display()
                );
                None
            }
            Err(e) => {
                warn!(
                    "Checkpoint {} is unusable ({}); trying backup {}",
                    self.primary.display(),
                    e,
                    self.backup.display()
                );
                Some(e)
            }
        };

        match (read_blob(&self.backup), primary_failure) {
            (Ok(Some(state)), _) => {
                info!(
                    "Recovered iteration {} from backup {}",
                    state.iteration,
                    self.backup.display()
                );
                Ok(state)
            }
            (Ok(None), None) => Err(RecoveryError::NotFound {
                primary: self.primary.clone(),
                backup: self.backup.clone(),
            }),
            (Ok(None), Some(_)) => Err(RecoveryError::NoBackup {
                primary: self.primary.clone(),
                backup: self.backup.clone(),
            }),
            (Err(e), _) if is_corruption(&e) => Err(RecoveryError::BothCorrupt {
                primary: self.primary.clone(),
                backup: self.backup.clone(),
            }),
            (Err(e), _) => Err(RecoveryError::Io(e)),
        }
    }
}

/// `Ok(None)` when the file does not exist.
fn read_blob(path: &Path) -> io::Result<Option<RunnerState>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    decode_state(&bytes).map(Some)
}

fn is_corruption(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof | io::ErrorKind::Unsupported
    )
}

/// Write through a temporary sibling and rename into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut writer = BufWriter::new(File::create(&tmp)?);
    writer.write_all(bytes)?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{Runner, RunnerError};
    use crate::schema::{CandidateValue, ParameterSpace, ParameterSpec, RunStatus, RunnerConfig};
    use tempfile::tempdir;

    fn space() -> ParameterSpace {
        let spec = ParameterSpec::builder(-2.0, 2.0, 0.5)
            .limits(-3.0, 3.0)
            .scaled()
            .build()
            .unwrap();
        ParameterSpace::from_pairs([("a", spec.clone()), ("b", spec)]).unwrap()
    }

    fn config(iterations: usize) -> RunnerConfig {
        RunnerConfig {
            rand_seed_number: 12,
            threshold: 5,
            max_offspring: 4,
            radius: 0.5,
            iterations,
            random_seed: Some(21),
            ..Default::default()
        }
    }

    fn bowl(values: &[CandidateValue]) -> f64 {
        -(values[0].value - 0.7).powi(2) - (values[1].value + 1.1).powi(2)
    }

    fn checkpointed_run(path: &Path, iterations: usize) -> RunnerState {
        let mut runner = Runner::new(config(iterations), space(), bowl)
            .unwrap()
            .with_checkpoint(CheckpointStore::new(path));
        runner.run().unwrap();
        runner.into_state()
    }

    fn corrupt(path: &Path) {
        let mut bytes = fs::read(path).unwrap();
        bytes[..4].copy_from_slice(b"JUNK");
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_backup_path() {
        assert_eq!(
            backup_path(Path::new("runs/paddy.ckpt")),
            PathBuf::from("runs/paddy.ckpt_backup")
        );
    }

    #[test]
    fn test_recover_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run");
        let state = checkpointed_run(&path, 3);

        let recovered = CheckpointStore::new(&path).recover().unwrap();
        assert_eq!(recovered.iteration, 3);
        assert_eq!(recovered.ledger, state.ledger);
        assert_eq!(recovered.config, state.config);
        assert_eq!(recovered, state);
    }

    #[test]
    fn test_backup_tracks_even_iterations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run");
        checkpointed_run(&path, 3);

        let store = CheckpointStore::new(&path);
        let backup = decode_state(&fs::read(store.backup()).unwrap()).unwrap();
        assert_eq!(backup.iteration, 2);
        assert_eq!(backup.status, RunStatus::Running);
        assert!(!dir.path().join("run.tmp").exists());
    }

    #[test]
    fn test_corrupt_primary_falls_back_to_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run");
        checkpointed_run(&path, 3);
        corrupt(&path);

        let recovered = CheckpointStore::new(&path).recover().unwrap();
        assert_eq!(recovered.iteration, 2);
    }

    #[test]
    fn test_missing_primary_falls_back_to_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run");
        checkpointed_run(&path, 2);
        fs::remove_file(&path).unwrap();

        let recovered = CheckpointStore::new(&path).recover().unwrap();
        assert_eq!(recovered.iteration, 2);
        assert_eq!(recovered.status, RunStatus::Completed);
    }

    #[test]
    fn test_both_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run");
        checkpointed_run(&path, 3);
        corrupt(&path);
        corrupt(&backup_path(&path));

        let err = CheckpointStore::new(&path).recover().unwrap_err();
        assert!(matches!(err, RecoveryError::BothCorrupt { .. }));
    }

    #[test]
    fn test_truncated_primary_without_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run");
        checkpointed_run(&path, 1);
        fs::remove_file(backup_path(&path)).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        let err = CheckpointStore::new(&path).recover().unwrap_err();
        assert!(matches!(err, RecoveryError::NoBackup { .. }));
    }

    #[test]
    fn test_nothing_to_recover() {
        let dir = tempdir().unwrap();
        let err = CheckpointStore::new(dir.path().join("absent"))
            .recover()
            .unwrap_err();
        assert!(matches!(err, RecoveryError::NotFound { .. }));

        let err = Runner::recover(dir.path().join("absent"), bowl).err().unwrap();
        assert!(matches!(
            err,
            RunnerError::Recovery(RecoveryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_resume_from_backup_matches_uninterrupted_run() {
        let dir = tempdir().unwrap();
        let whole = checkpointed_run(&dir.path().join("whole"), 4);

        // Snapshot of a four-iteration run interrupted after iteration 2.
        let path = dir.path().join("crashed");
        let mut state = checkpointed_run(&path, 2);
        state.status = RunStatus::Running;
        state.iteration_limit = 4;
        state.iteration_bests.pop();
        CheckpointStore::new(&path).save(&state).unwrap();
        corrupt(&path);

        let mut resumed = Runner::recover(&path, bowl).unwrap();
        assert_eq!(resumed.iteration(), 2);
        assert_eq!(resumed.resume().unwrap(), RunStatus::Completed);
        assert_eq!(resumed.ledger(), &whole.ledger);
        assert_eq!(resumed.iteration_bests(), whole.iteration_bests.as_slice());
    }

    #[test]
    fn test_recover_then_extend() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run");
        checkpointed_run(&path, 2);

        let mut runner = Runner::recover(&path, bowl).unwrap();
        assert_eq!(runner.resume().unwrap(), RunStatus::Completed);
        assert_eq!(runner.iteration(), 2);
        assert_eq!(runner.extend(2).unwrap(), RunStatus::Completed);
        assert_eq!(runner.iteration(), 4);

        let on_disk = CheckpointStore::new(&path).recover().unwrap();
        assert_eq!(&on_disk, runner.state());
    }
}
