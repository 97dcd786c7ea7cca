pub mod constants;
pub mod enumerate;
pub mod file_ops;
pub mod filesystem;

pub use enumerate::DirWalk;
pub use filesystem::WindowsFilesystem;
