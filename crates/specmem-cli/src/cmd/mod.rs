pub mod context;
pub mod init;
pub mod memory;
pub mod note;
pub mod profile;
