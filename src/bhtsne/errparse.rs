//! Extraction of the KL divergence bh_tsne prints while iterating.
//!
//! bh_tsne reports lines such as `Iteration 50: error is 43.2791 (50 iterations in 0.12 seconds)`.
//! We retain the smallest of the `error is <float>` messages.

use lazy_static::lazy_static;
use regex::Regex;

use super::error::{TsneError, TsneResult};

lazy_static! {
    static ref ERROR_MSG: Regex = Regex::new(r"error is \d+\.\d+").unwrap();
}

/// returns the smallest error reported in text, None if there is no `error is <float>` message.
///
/// The minimum is taken on the matched strings, in lexicographic order. It coincides with the numeric minimum
/// as long as all reported values have the same number of digits in their integer part,
/// which is the case for the fixed format bh_tsne uses over a run.
pub fn parse_error(text: &str) -> Option<f64> {
    let smallest = ERROR_MSG.find_iter(text).map(|m| m.as_str()).min()?;
    let value = smallest.split_whitespace().last()?;
    match value.parse::<f64>() {
        Ok(v) => Some(v),
        Err(e) => {
            log::error!("parse_error could not decode {:?} : {}", smallest, e);
            None
        }
    }
} // end of parse_error

/// same as [parse_error] but returns TsneError::NoParseableError when no message is found
pub fn trial_error(text: &str) -> TsneResult<f64> {
    parse_error(text).ok_or(TsneError::NoParseableError)
}

// end of mod tests
