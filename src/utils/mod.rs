pub mod clock;
pub mod logger;
pub mod redact;
pub mod similarity;
