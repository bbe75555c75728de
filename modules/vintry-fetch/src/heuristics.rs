// Escalation heuristics: pure functions from fetched content and response
// metadata to an escalation decision. No I/O, no state.

use vintry_common::{ContentSignals, Escalation, EscalationReason, FetchTier};

/// Bodies shorter than this that also carry shell markers are treated as
/// unrendered JS applications.
const MIN_RENDERED_BODY_LEN: usize = 800;

/// Markers characteristic of an unrendered single-page-app shell.
const PLACEHOLDER_MARKERS: &[&str] = &[
    "you need to enable javascript",
    "please enable javascript",
    "javascript is required",
    "enable javascript to run this app",
    "<noscript",
    "id=\"root\"></div>",
    "id=\"app\"></div>",
];

/// Text markers of bot-challenge interstitials.
const CHALLENGE_MARKERS: &[&str] = &[
    "checking your browser",
    "verify you are human",
    "verifying you are human",
    "are you a robot",
    "cf-chl",
    "cf-browser-verification",
    "just a moment...",
    "attention required",
    "access denied",
    "captcha",
];

/// HTTP statuses typical of bot-challenge responses.
const CHALLENGE_STATUSES: &[u16] = &[403, 429, 503];

pub fn is_challenge_status(status: u16) -> bool {
    CHALLENGE_STATUSES.contains(&status)
}

/// Inspect one fetched body and its status code for the signals the router
/// and the domain profile care about.
pub fn detect_signals(body: &str, http_status: u16) -> ContentSignals {
    let lower = body.to_lowercase();
    ContentSignals {
        http_status,
        body_len: body.trim().len(),
        placeholder_markers: PLACEHOLDER_MARKERS.iter().any(|m| lower.contains(m)),
        challenge_markers: CHALLENGE_MARKERS.iter().any(|m| lower.contains(m)),
    }
}

/// Why this body cannot be accepted as-is, if it can't. None means the
/// content is usable at the tier that fetched it.
pub fn escalation_reason(signals: &ContentSignals) -> Option<EscalationReason> {
    if signals.challenge_markers {
        Some(EscalationReason::ChallengeMarkers)
    } else if is_challenge_status(signals.http_status) {
        Some(EscalationReason::ChallengeStatus)
    } else if signals.body_len == 0 {
        Some(EscalationReason::EmptyBody)
    } else if signals.body_len < MIN_RENDERED_BODY_LEN && signals.placeholder_markers {
        Some(EscalationReason::UnrenderedShell)
    } else if signals.http_status >= 400 {
        Some(EscalationReason::FetchFailed)
    } else {
        None
    }
}

/// Decide whether a fetch at `current_tier` should escalate, and to where.
///
/// Returns None both when the content looks fine and when there is no tier
/// left to escalate to: at the top of the ladder the router reports the
/// fetch as failed rather than returning degraded content.
pub fn evaluate(
    signals: &ContentSignals,
    current_tier: FetchTier,
    max_tier: FetchTier,
) -> Option<Escalation> {
    let reason = escalation_reason(signals)?;
    let next = current_tier.next().filter(|t| *t <= max_tier)?;

    Some(Escalation {
        reason,
        recommended_tier: next,
    })
}
