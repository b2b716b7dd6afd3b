pub(crate) mod catalog;
pub(crate) mod consolidated_results;
pub(crate) mod detected_responses;
pub(crate) mod health;
pub(crate) mod scan_jobs;
