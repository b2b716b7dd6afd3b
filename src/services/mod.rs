pub(crate) mod catalog;
pub(crate) mod consolidation;
pub(crate) mod consolidation_writer;
pub(crate) mod errors;
pub(crate) mod omr;
pub(crate) mod scoring;
