use tracing::warn;

use crate::{
    adapter::types::{Choice, Logprobs, ResponseBatch, ScoredResult},
    error::AdapterError,
};

/// Scores every choice in `outputs` against the continuation that starts at its
/// context length.
///
/// Choices are flattened response-then-choice and paired positionally with
/// `context_lengths` in a single pass, so the two must have the same length.
/// The final echoed position is excluded from the scored range.
pub fn parse_scores(
    outputs: &ResponseBatch,
    context_lengths: &[i64],
) -> Result<Vec<ScoredResult>, AdapterError> {
    if let Some((index, &value)) = context_lengths.iter().enumerate().find(|(_, v)| **v <= 0) {
        return Err(AdapterError::InvalidContextLength { index, value });
    }

    let choices = outputs.choice_count();
    if choices != context_lengths.len() {
        return Err(AdapterError::ContextLengthMismatch {
            choices,
            context_lengths: context_lengths.len(),
        });
    }

    outputs
        .responses()
        .iter()
        .flat_map(|response| response.choices.iter())
        .zip(context_lengths.iter().copied())
        .enumerate()
        .map(|(index, (choice, context_length))| {
            // positive, checked above
            score_choice(index, choice, context_length as usize)
        })
        .collect()
}

/// Extracts the top-level `result` text of each response, empty when absent.
pub fn parse_generations(outputs: &ResponseBatch) -> Vec<String> {
    outputs
        .responses()
        .iter()
        .map(|response| response.result.clone().unwrap_or_default())
        .collect()
}

fn score_choice(
    index: usize,
    choice: &Choice,
    context_length: usize,
) -> Result<ScoredResult, AdapterError> {
    let logprobs = choice
        .logprobs
        .as_ref()
        .ok_or_else(|| AdapterError::MalformedResponse(format!("choice {index} has no logprobs")))?;

    if context_length >= logprobs.token_logprobs.len() {
        warn!(
            choice = index,
            context_length,
            positions = logprobs.token_logprobs.len(),
            "context covers every returned position; was the prompt echoed?"
        );
    }

    let end = logprobs.token_logprobs.len().saturating_sub(1);
    let scored: Vec<f64> = (context_length..end)
        .map(|position| {
            logprobs.token_logprobs[position].ok_or_else(|| {
                AdapterError::MalformedResponse(format!(
                    "choice {index} has no log-probability at position {position}"
                ))
            })
        })
        .collect::<Result<_, _>>()?;

    let summed_logprob = scored.iter().fold(0.0, |acc, logprob| acc + logprob);

    let mut is_greedy = true;
    for (offset, logprob) in scored.iter().copied().enumerate() {
        if !is_top_alternative(index, logprobs, context_length + offset, logprob)? {
            is_greedy = false;
            break;
        }
    }

    Ok(ScoredResult {
        summed_logprob,
        is_greedy,
    })
}

/// Whether the observed token at `position` is the argmax of its top
/// alternatives. Token text is compared when the server returned it, otherwise
/// the observed log-probability is compared with the best alternative's.
fn is_top_alternative(
    index: usize,
    logprobs: &Logprobs,
    position: usize,
    logprob: f64,
) -> Result<bool, AdapterError> {
    let top = logprobs
        .top_logprobs
        .get(position)
        .and_then(Option::as_ref)
        .filter(|top| !top.is_empty())
        .ok_or_else(|| {
            AdapterError::MalformedResponse(format!(
                "choice {index} has no top alternatives at position {position}"
            ))
        })?;

    let best = top.values().copied().fold(f64::NEG_INFINITY, f64::max);

    let token = logprobs
        .tokens
        .as_ref()
        .and_then(|tokens| tokens.get(position));
    Ok(match token {
        Some(token) => top.get(token).is_some_and(|value| *value >= best),
        None => logprob >= best,
    })
}
