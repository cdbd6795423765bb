pub mod compressor;
pub mod eq;
