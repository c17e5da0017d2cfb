//! Remote store transports.
//!
//! One provider is active at a time; Google Drive is the only
//! implementation shipped today.

pub mod google_drive;
pub mod storage;

pub use google_drive::{DriveConfig, DriveStore};
pub use storage::{
    parse_project_file_name, project_file_name, project_file_properties, CreateFile,
    RemoteFileHandle, RemoteStore, UpdateFile, FILE_PREFIX, FILE_SUFFIX, PROJECT_FILE_MIME,
};
