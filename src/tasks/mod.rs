pub(crate) mod reprocess;
pub(crate) mod scanning;
pub(crate) mod scheduler;
