//! Static price table for the cost accountant.
//!
//! Input and output tokens are priced independently, in dollars per 1K
//! tokens. An unrecognized model is an error, never a silent zero that
//! would corrupt every downstream cost report.

use crate::error::AppError;

/// (model identifier, input $/1K tokens, output $/1K tokens)
const PRICE_TABLE: [(&str, f64, f64); 4] = [
    ("gemini-2.5-flash-lite", 0.0001, 0.0004),
    ("gemini-3-flash-preview", 0.0003, 0.0012),
    ("gemini-3-pro-preview", 0.00125, 0.01),
    ("gemini-1.5-pro", 0.00125, 0.005),
];

/// Estimated cost of one provider call. Pure and deterministic: the same
/// (model, token counts) always yields the same value.
pub fn estimate_cost(model: &str, input_tokens: i64, output_tokens: i64) -> Result<f64, AppError> {
    let (_, input_rate, output_rate) = PRICE_TABLE
        .iter()
        .find(|(m, _, _)| *m == model)
        .ok_or_else(|| AppError::UnknownModelPricing(model.to_string()))?;

    Ok((input_tokens as f64 / 1000.0) * input_rate + (output_tokens as f64 / 1000.0) * output_rate)
}
