//! Local filesystem support: the directory store, artifact permissions and
//! cleanup of incomplete outputs.

pub mod partial;
pub mod permissions;
pub mod store;

pub use partial::PartialFile;
pub use permissions::FilePermissions;
pub use store::DirectoryStore;
