//! # Learned pose store
//!
//! Named pose persistence backing learn mode and the fixed frame transforms.
//! Poses are keyed by name (the arm side is encoded in the name, e.g.
//! `cdMo_l`) and stored together in one JSON document. Only touched before
//! servoing begins, never in the control loop.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

// Internal
use robot_if::pose::Pose;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors when accessing the pose store.
#[derive(Debug, thiserror::Error)]
pub enum PoseStoreError {
    #[error("Could not access the pose store file: {0}")]
    FileError(std::io::Error),

    #[error("Could not read the pose store: {0}")]
    DeserialiseError(serde_json::Error),

    #[error("Could not write the pose store: {0}")]
    SerialiseError(serde_json::Error),

    #[error("No pose named \"{0}\" in the store")]
    NotFound(String),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A named pose store backed by a JSON file.
pub struct PoseStore {
    path: PathBuf,
    poses: HashMap<String, Pose>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PoseStore {
    /// Open the store at the given path. A missing file yields an empty
    /// store, it will be created on the first save.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PoseStoreError> {
        let path = path.as_ref().to_path_buf();

        let poses = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(PoseStoreError::FileError)?;
            serde_json::from_str(&contents).map_err(PoseStoreError::DeserialiseError)?
        }
        else {
            HashMap::new()
        };

        Ok(Self { path, poses })
    }

    /// Load the pose stored under the given name.
    pub fn load(&self, name: &str) -> Result<Pose, PoseStoreError> {
        self.poses
            .get(name)
            .copied()
            .ok_or_else(|| PoseStoreError::NotFound(name.to_string()))
    }

    /// Store a pose under the given name and write the store to disk.
    pub fn save(&mut self, name: &str, pose: &Pose) -> Result<(), PoseStoreError> {
        self.poses.insert(name.to_string(), *pose);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(PoseStoreError::FileError)?;
        }

        let contents =
            serde_json::to_string_pretty(&self.poses).map_err(PoseStoreError::SerialiseError)?;
        fs::write(&self.path, contents).map_err(PoseStoreError::FileError)?;

        Ok(())
    }

    /// True if a pose is stored under the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.poses.contains_key(name)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion};

    fn temp_store_path(tag: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("pose_store_test_{}_{}.json", tag, std::process::id()));
        path
    }

    #[test]
    fn test_round_trip() {
        let path = temp_store_path("round_trip");
        let _ = fs::remove_file(&path);

        let pose = Pose::from_parts(
            Translation3::new(0.1, -0.25, 0.4),
            UnitQuaternion::from_euler_angles(0.3, -0.1, 1.2),
        );

        {
            let mut store = PoseStore::open(&path).unwrap();
            store.save("cdMo_l", &pose).unwrap();
        }

        // Reopen from disk and compare
        let store = PoseStore::open(&path).unwrap();
        let loaded = store.load("cdMo_l").unwrap();

        assert!((loaded.translation.vector - pose.translation.vector).norm() < 1e-12);
        assert!(
            (loaded.rotation.scaled_axis() - pose.rotation.scaled_axis()).norm() < 1e-12
        );

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_name() {
        let path = temp_store_path("missing");
        let _ = fs::remove_file(&path);

        let store = PoseStore::open(&path).unwrap();

        assert!(!store.contains("cdMo_r"));
        assert!(matches!(
            store.load("cdMo_r"),
            Err(PoseStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_multiple_names() {
        let path = temp_store_path("multiple");
        let _ = fs::remove_file(&path);

        let left = Pose::from_parts(
            Translation3::new(0.1, 0.0, 0.3),
            UnitQuaternion::identity(),
        );
        let right = Pose::from_parts(
            Translation3::new(-0.1, 0.0, 0.3),
            UnitQuaternion::identity(),
        );

        let mut store = PoseStore::open(&path).unwrap();
        store.save("cdMo_l", &left).unwrap();
        store.save("cdMo_r", &right).unwrap();

        let store = PoseStore::open(&path).unwrap();
        assert!((store.load("cdMo_l").unwrap().translation.vector[0] - 0.1).abs() < 1e-12);
        assert!((store.load("cdMo_r").unwrap().translation.vector[0] + 0.1).abs() < 1e-12);

        let _ = fs::remove_file(&path);
    }
}
