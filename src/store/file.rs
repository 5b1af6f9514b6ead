//! JSON snapshot persistence for single-process deployments.

// std
use std::{
	fs::{self, File},
	io::{self, Write},
	path::{Path, PathBuf},
};
// self
use crate::store::{
	StoreError,
	memory::{Persistence, SnapshotStore, StoreSnapshot},
};

/// Store that rewrites a JSON snapshot after each mutation.
pub type FileStore = SnapshotStore<JsonFile>;

/// Writes each snapshot to a sibling `.tmp` file, then renames it over the target.
#[derive(Clone, Debug)]
pub struct JsonFile {
	path: PathBuf,
}
impl JsonFile {
	fn read(path: &Path) -> Result<StoreSnapshot, StoreError> {
		let bytes = match fs::read(path) {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StoreSnapshot::default()),
			Err(e) => return Err(io_failure("read", path, e)),
		};

		if bytes.is_empty() {
			return Ok(StoreSnapshot::default());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Snapshot {} is not valid JSON: {e}", path.display()),
		})
	}

	fn prepare_dir(path: &Path) -> Result<(), StoreError> {
		match path.parent() {
			Some(dir) if !dir.as_os_str().is_empty() =>
				fs::create_dir_all(dir).map_err(|e| io_failure("create", dir, e)),
			_ => Ok(()),
		}
	}
}
impl Persistence for JsonFile {
	fn persist(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
		Self::prepare_dir(&self.path)?;

		let bytes = serde_json::to_vec_pretty(snapshot).map_err(|e| StoreError::Serialization {
			message: format!("Snapshot could not be encoded: {e}"),
		})?;
		let staging = self.path.with_extension("tmp");
		let mut file = File::create(&staging).map_err(|e| io_failure("create", &staging, e))?;

		file.write_all(&bytes).map_err(|e| io_failure("write", &staging, e))?;
		file.sync_all().map_err(|e| io_failure("sync", &staging, e))?;
		drop(file);

		fs::rename(&staging, &self.path).map_err(|e| io_failure("replace", &self.path, e))
	}
}

impl FileStore {
	/// Opens the snapshot at `path`, starting empty when the file is missing.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		JsonFile::prepare_dir(&path)?;

		let snapshot = JsonFile::read(&path)?;

		Ok(Self::from_parts(snapshot, JsonFile { path }))
	}
}

fn io_failure(action: &str, path: &Path, e: io::Error) -> StoreError {
	StoreError::Backend { message: format!("Could not {action} {}: {e}", path.display()) }
}
