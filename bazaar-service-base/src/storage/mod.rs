pub mod blob;
pub mod fs;
pub mod memory;
pub mod zip;
