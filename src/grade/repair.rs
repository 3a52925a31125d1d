#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! One primary call, at most one corrective call.

use super::{
    client::{Capability, CapabilityClient},
    extract::extract,
    prompt::PromptContext,
    results::AiFeedback,
    validate::validate,
};
use crate::error::{GradingError, StructuredOutputError};

/// Extracts and validates a raw response.
pub fn parse_response(raw: &str) -> Result<AiFeedback, StructuredOutputError> {
    let value = extract(raw)?;
    validate(&value)
}

/// Requests feedback for one submission and returns a validated result.
///
/// If the first response cannot be extracted or validated, a single
/// corrective request carrying the malformed text, the error and the schema
/// is sent without the prefix. A second failure yields
/// [`GradingError::RepairFailed`] with both messages, including when the
/// corrective call itself fails. Size and transport errors on the first
/// call are returned as they are.
pub async fn generate_validated<C: Capability>(
    client: &CapabilityClient<C>,
    context: &PromptContext,
    prefix: &str,
    suffix: &str,
    preview_chars: usize,
) -> Result<AiFeedback, GradingError> {
    let raw = client.send(Some(prefix), suffix).await?;

    let original = match parse_response(&raw) {
        Ok(feedback) => return Ok(feedback),
        Err(e) => e,
    };
    tracing::warn!("Structured output rejected ({original}); sending one corrective request");

    let request = context.repair_request(&raw, &original.to_string(), preview_chars);
    let retry_raw = match client.send(None, &request).await {
        Ok(raw) => raw,
        Err(e) => {
            return Err(GradingError::RepairFailed {
                original: original.to_string(),
                retry:    e.to_string(),
            });
        }
    };

    match parse_response(&retry_raw) {
        Ok(feedback) => {
            tracing::info!("Corrective request produced valid output");
            Ok(feedback)
        }
        Err(retry) => Err(GradingError::RepairFailed {
            original: original.to_string(),
            retry:    retry.to_string(),
        }),
    }
}
