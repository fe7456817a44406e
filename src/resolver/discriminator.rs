//! Pure classification of "is this candidate a real, user-facing top-level
//! window". Implemented as an ordered rule table so the policy is testable
//! in isolation from any live window; later rules are only consulted when
//! earlier ones do not decide.

use crate::common::config::DiscriminatorSettings;
use crate::sys::ax::{role, subrole};
use crate::sys::geometry::Size;
use crate::sys::window_server::{NORMAL_WINDOW_LEVEL, WindowServerId};

#[derive(Clone, Copy, Debug)]
pub struct WindowCandidate<'a> {
    pub id: WindowServerId,
    pub role: &'a str,
    pub subrole: &'a str,
    pub title: &'a str,
    pub size: Size,
    pub layer: i32,
    pub bundle_id: Option<&'a str>,
    pub app_name: &'a str,
    pub executable_path: Option<&'a str>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Verdict {
    Accept,
    Reject,
}

type Rule = fn(&WindowCandidate<'_>, &DiscriminatorSettings) -> Option<Verdict>;

const RULES: &[Rule] = &[nonstandard_window_kind, helper_surface, reserved_level];

/// Total function, never fails: the first rule that decides wins, and the
/// default is accept.
pub fn is_actual_window(candidate: &WindowCandidate<'_>, settings: &DiscriminatorSettings) -> bool {
    for rule in RULES {
        if let Some(verdict) = rule(candidate, settings) {
            return verdict == Verdict::Accept;
        }
    }
    true
}

/// Sheets, popovers, system dialog chrome, and floating palettes are not
/// top-level windows, unless size and title say otherwise.
fn nonstandard_window_kind(
    candidate: &WindowCandidate<'_>,
    settings: &DiscriminatorSettings,
) -> Option<Verdict> {
    let nonstandard = matches!(
        candidate.subrole,
        subrole::DIALOG | subrole::SYSTEM_DIALOG | subrole::FLOATING_WINDOW | subrole::UNKNOWN
    ) || matches!(candidate.role, role::SHEET | role::POPOVER);
    if !nonstandard {
        return None;
    }
    let looks_top_level = candidate.size.width >= settings.min_dimension
        && candidate.size.height >= settings.min_dimension
        && !candidate.title.is_empty();
    if looks_top_level {
        // A genuine top-level surface with an odd subrole; let the
        // remaining rules decide.
        None
    } else {
        Some(Verdict::Reject)
    }
}

/// Tiny untitled surfaces are GPU compositing helpers, not user windows.
/// The threshold is strict: exactly `min_dimension` in both dimensions
/// passes.
fn helper_surface(
    candidate: &WindowCandidate<'_>,
    settings: &DiscriminatorSettings,
) -> Option<Verdict> {
    let undersized = candidate.size.width < settings.min_dimension
        || candidate.size.height < settings.min_dimension;
    if undersized && candidate.title.is_empty() {
        Some(Verdict::Reject)
    } else {
        None
    }
}

/// Windows outside the normal application level band are system chrome,
/// unless the bundle id is whitelisted.
fn reserved_level(
    candidate: &WindowCandidate<'_>,
    settings: &DiscriminatorSettings,
) -> Option<Verdict> {
    if candidate.layer == NORMAL_WINDOW_LEVEL {
        return None;
    }
    let whitelisted = candidate
        .bundle_id
        .is_some_and(|bundle| settings.level_whitelist.iter().any(|b| b == bundle));
    if whitelisted {
        None
    } else {
        Some(Verdict::Reject)
    }
}
