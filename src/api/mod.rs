pub(crate) mod errors;
pub(crate) mod handlers;
pub(crate) mod omr;
pub(crate) mod results;
pub(crate) mod router;
pub(crate) mod scans;
pub(crate) mod validation;
