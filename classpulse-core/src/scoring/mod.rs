//! Praise and attention rules.
//!
//! Both sides follow the same pattern: a boolean eligibility check over a
//! [`StudentAggregate`], then an additive score per sub-type. The highest
//! strictly greater score wins; equal scores keep the earlier sub-type in
//! canonical order.
//!
//! [`StudentAggregate`]: crate::aggregate::StudentAggregate

mod attention;
mod praise;

pub use attention::{AttentionType, attention_score, needs_attention, select_attention_type};
pub use praise::{
    BASE_SCORE, PraiseType, is_praise_worthy, praise_score, select_praise_type,
};

/// Pick the candidate with the strictly highest score above `floor`.
///
/// Candidates are visited in the given order, so ties keep the earlier one.
fn best_above<T: Copy>(candidates: impl IntoIterator<Item = T>, floor: i64, score: impl Fn(T) -> i64) -> Option<T> {
    let mut best = None;
    let mut best_score = floor;
    for candidate in candidates {
        let s = score(candidate);
        if s > best_score {
            best = Some(candidate);
            best_score = s;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_above_keeps_first_of_equal_scores() {
        let picked = best_above(["a", "b", "c"], 0, |c| if c == "a" { 1 } else { 3 });
        assert_eq!(picked, Some("b"));
    }

    #[test]
    fn best_above_requires_beating_the_floor() {
        assert_eq!(best_above([1, 2], 5, |_| 5), None);
        assert_eq!(best_above(Vec::<i32>::new(), 0, |_| 9), None);
    }
}
