//! Best-effort parsing of generator output.
//!
//! The generator is asked for structured output (JSON arrays and objects)
//! but is free to ignore that. Each helper here is one tier of a fallback
//! chain and never fails: it either finds what it is looking for or says so.
//!
//! - [`parse_string_list`] / [`find_json_object`]: JSON, raw or fenced
//! - [`extract_alternatives_from_text`]: numbered, quoted, paragraph prose
//! - [`extract_best_index_from_text`]: ordinal claims and score comparisons
//! - [`extract_round_count`]: the first standalone integer

mod index;
mod json;
mod patterns;

pub use index::{extract_best_index_from_text, extract_round_count, first_integer};
pub use json::{find_json_array, find_json_object, parse_string_list, value_as_index};
pub use patterns::{
    clean_item, extract_alternatives_from_text, extract_with_pattern, TextPattern,
    MIN_PATTERN_ITEMS,
};
