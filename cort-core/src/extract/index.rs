//! Numeric extraction from evaluator and round-estimator prose.

use regex::Regex;
use std::sync::LazyLock;

// Explicit claims, checked in order. Numbers are 1-indexed in the text.
static ORDINAL_CLAIMS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // "the best response is 2", "best response: 1", "best is #3"
        r"\bbest(?:\s+(?:response|alternative|option|candidate|answer))?(?:\s+is)?(?:\s*[:\-]\s*|\s+)(?:the\s+)?(?:response|alternative|option|candidate|number)?\s*#?(\d+)\b",
        // "I recommend alternative 2", "choose response #2"
        r"\b(?:recommend|prefer|choose|select|pick)(?:\s+(?:the\s+)?(?:response|alternative|option|candidate))?\s*#?(\d+)\b",
        // "alternative 2 is the best", "response #2 is best"
        r"\b(?:response|alternative|option|candidate)\s*#?(\d+)\s+(?:is|as|was|seems)\s+(?:the\s+)?(?:clear\s+)?best\b",
    ]
    .iter()
    .map(|pattern| Regex::new(&format!("(?i){pattern}")).expect("invalid regex"))
    .collect()
});

static SCORE_CLAIM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:response|alternative|option|candidate)\s*#?(\d+)\s*[:\-,]?\s*(?:'s\s+)?(?:score[sd]?|rating|rated)\s*(?:is|of)?\s*[:=]?\s*(\d+(?:\.\d+)?)",
    )
    .expect("invalid regex")
});

static STANDALONE_INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+)\b").expect("invalid regex"));

/// Pick the best candidate index out of free-form evaluation text.
///
/// `candidate_count` is the number of candidates that were judged. The
/// result is 0-indexed and always within `[0, candidate_count - 1]`
/// (0 when there are no candidates). Checks, in order:
///
/// 1. an explicit claim such as "the best response is 2", read as 1-indexed;
/// 2. at least two per-candidate scores ("Response 2 score: 9"), taking the
///    highest score and the lower index on ties;
/// 3. otherwise 0, keeping the current best.
pub fn extract_best_index_from_text(text: &str, candidate_count: usize) -> usize {
    if candidate_count == 0 {
        return 0;
    }
    let last = candidate_count - 1;

    for pattern in ORDINAL_CLAIMS.iter() {
        let claimed = pattern
            .captures(text)
            .and_then(|caps| caps[1].parse::<usize>().ok());
        if let Some(number) = claimed {
            return number.saturating_sub(1).min(last);
        }
    }

    let scores: Vec<(usize, f64)> = SCORE_CLAIM
        .captures_iter(text)
        .filter_map(|caps| {
            let index = caps[1].parse::<usize>().ok()?.checked_sub(1)?;
            let score = caps[2].parse::<f64>().ok()?;
            (index < candidate_count).then_some((index, score))
        })
        .collect();

    if scores.len() >= 2 {
        let mut best = scores[0];
        for &(index, score) in &scores[1..] {
            if score > best.1 || (score == best.1 && index < best.0) {
                best = (index, score);
            }
        }
        return best.0;
    }

    0
}

/// The first standalone integer in `text`, if any.
pub fn first_integer(text: &str) -> Option<usize> {
    STANDALONE_INTEGER
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

/// Read a recommended round count from `text`.
///
/// Returns the first standalone integer when it lies in `1..=max_rounds`,
/// else `max_rounds`.
pub fn extract_round_count(text: &str, max_rounds: usize) -> usize {
    match first_integer(text) {
        Some(n) if (1..=max_rounds).contains(&n) => n,
        _ => max_rounds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_best_index_from_text_cases() {
        let cases = [
            ("The best response is 2.", 1),
            ("Response 1 score: 7, Response 2 score: 9", 1),
            ("I recommend alternative 2 because it's more comprehensive.", 1),
            ("Looking at all options, response #2 is best.", 1),
            ("Evaluation with best response: 1", 0),
        ];

        for (text, expected) in cases {
            assert_eq!(
                extract_best_index_from_text(text, 3),
                expected,
                "Failed to extract correct index from: {text}"
            );
        }
    }

    #[test]
    fn test_out_of_range_claim_is_clamped() {
        assert_eq!(extract_best_index_from_text("The best response is 9", 3), 2);
        assert_eq!(extract_best_index_from_text("The best response is 0", 3), 0);
    }

    #[test]
    fn test_score_ties_prefer_lower_index() {
        let text = "Response 1 score: 6\nResponse 2 score: 8\nResponse 3 score: 8";
        assert_eq!(extract_best_index_from_text(text, 3), 1);
    }

    #[test]
    fn test_single_score_is_not_enough() {
        assert_eq!(extract_best_index_from_text("Response 3 score: 10", 3), 0);
    }

    #[test]
    fn test_scores_for_unknown_candidates_are_ignored() {
        let text = "Response 5 score: 10, Response 1 score: 4, Response 2 score: 5";
        assert_eq!(extract_best_index_from_text(text, 2), 1);
    }

    #[test]
    fn test_nothing_matches_keeps_current_best() {
        assert_eq!(
            extract_best_index_from_text("They are all quite similar.", 4),
            0
        );
        assert_eq!(extract_best_index_from_text("anything", 0), 0);
    }

    #[test]
    fn test_extract_round_count() {
        assert_eq!(
            extract_round_count("For this query, 3 rounds would be appropriate.", 5),
            3
        );
        assert_eq!(
            extract_round_count("This requires careful consideration.", 5),
            5
        );
        assert_eq!(extract_round_count("Use 9 rounds", 5), 5);
        assert_eq!(extract_round_count("0", 5), 5);
        assert_eq!(extract_round_count("round2 then 4", 5), 4);
    }
}
