pub mod parse;
pub mod rollover;
pub mod select;

pub use parse::{parse_exif_date, TimestampCandidate};
pub use rollover::apply_day_begins;
pub use select::{select_oldest, ResolvedTimestamp, SelectorOptions};
