pub mod frame;

pub use frame::{format_timestamp, parse_timestamp, timestamp_series, timestamps};
