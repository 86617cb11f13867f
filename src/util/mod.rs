mod format;
mod hash;

pub use format::{datetime_from_git, format_duration, format_span};
pub use hash::{short_digest, sha256_hex};
