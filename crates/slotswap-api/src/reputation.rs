use slotswap_types::api::CompatibilityIndicators;
use slotswap_types::models::{Book, NewsletterSlot, Profile};

/// Reputation gap under which two partners count as equally reliable.
const RELIABILITY_TOLERANCE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub auto_confirm: bool,
}

/// Decide at creation time whether a request skips `pending`.
///
/// The slot owner opts in through either rule: approving friends, or a
/// minimum reputation (0 disables it). A missing profile never auto-confirms.
pub fn evaluate(target: Option<&Profile>, requester: Option<&Profile>, are_friends: bool) -> Verdict {
    let (Some(target), Some(requester)) = (target, requester) else {
        return Verdict { auto_confirm: false };
    };

    let by_friendship = target.auto_approve_friends && are_friends;
    let by_reputation = target.auto_approve_min_reputation > 0.0
        && requester.reputation_score >= target.auto_approve_min_reputation;

    Verdict {
        auto_confirm: by_friendship || by_reputation,
    }
}

/// Display-only hints shown on a swap card.
pub fn compatibility(
    slot: &NewsletterSlot,
    book: Option<&Book>,
    owner: Option<&Profile>,
    requester: Option<&Profile>,
) -> CompatibilityIndicators {
    let genre_match = book.is_some_and(|b| b.primary_genre == slot.preferred_genre);
    let (audience_comparable, reliability_match) = match (owner, requester) {
        (Some(owner), Some(requester)) => (
            true,
            (owner.reputation_score - requester.reputation_score).abs() <= RELIABILITY_TOLERANCE,
        ),
        _ => (false, false),
    };

    CompatibilityIndicators {
        genre_match,
        audience_comparable,
        reliability_match,
    }
}
