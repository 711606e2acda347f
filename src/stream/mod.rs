pub mod binary_reader;
pub mod json_writer;
pub mod xml_reader;

/// Deepest container nesting either reader accepts.
pub(crate) const MAX_DEPTH: usize = 512;
