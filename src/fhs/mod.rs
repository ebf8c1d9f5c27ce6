//! Filesystem-hierarchy skeleton: layout files and the builder that applies them.

pub mod builder;
pub mod layout;
pub mod resolve;

pub use builder::{FhsRootBuilder, PACKAGE_DB_DIR};
pub use layout::{rootfs_path, FhsLayout, FileContent, FileEntry, SymlinkEntry};
pub use resolve::{relative_path, resolve_in_rootfs, resolve_parent_in_rootfs};
