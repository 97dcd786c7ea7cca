pub mod combine;
pub mod constants;
pub mod normalizer;

pub use combine::combine;
pub use normalizer::{
    CanonicalPath, PathFormatOptions, PathKind, full_path, is_device, is_logical_drive, is_rooted,
    is_unc, normalize,
};
