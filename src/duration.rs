//! Duration negotiation: maps a requested length onto what a provider can
//! actually render, plus the extension plan needed to reach the rest.

use crate::error::ClipError;
use crate::provider::{DurationStrategy, ProviderKind};

/// Extension work needed on top of the initial clip.
///
/// Not registered anywhere yet: a plan only exists once submission succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanSkeleton {
    pub target_duration_sec: u32,
    pub extension_increment_sec: u32,
    pub extensions_planned: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiation {
    /// Legal duration for the initial submission.
    pub initial_sec: u32,
    pub plan: Option<PlanSkeleton>,
}

/// Compute the initial submission length and, for extensible providers,
/// the extension plan for `requested_sec`.
pub fn negotiate(provider: ProviderKind, requested_sec: u32) -> Result<Negotiation, ClipError> {
    let profile = provider.profile();

    match profile.strategy {
        DurationStrategy::FixedDuration => Ok(Negotiation {
            initial_sec: nearest_legal(profile.legal_initial_sec, requested_sec),
            plan: None,
        }),
        DurationStrategy::Extensible => {
            if let Some((min, max)) = profile.bounds_sec
                && !(min..=max).contains(&requested_sec)
            {
                return Err(ClipError::InvalidDuration {
                    provider,
                    requested: requested_sec,
                    min,
                    max,
                });
            }

            let initial_sec = profile.legal_initial_sec.last().copied().unwrap_or(requested_sec);
            let plan = match profile.extension {
                Some(limits) if requested_sec > initial_sec => {
                    let remaining = requested_sec - initial_sec;
                    Some(PlanSkeleton {
                        target_duration_sec: requested_sec,
                        extension_increment_sec: limits.increment_sec,
                        extensions_planned: remaining
                            .div_ceil(limits.increment_sec)
                            .min(limits.max_extensions),
                    })
                }
                _ => None,
            };

            Ok(Negotiation { initial_sec, plan })
        }
    }
}

/// Seconds of video produced after `completed` extensions.
pub fn achieved_duration_sec(initial_sec: u32, increment_sec: u32, completed: u32) -> u32 {
    initial_sec + increment_sec * completed
}

/// Element of `legal` closest to `requested`; ties go to the smaller value.
fn nearest_legal(legal: &[u32], requested: u32) -> u32 {
    legal
        .iter()
        .copied()
        .min_by_key(|&d| (d.abs_diff(requested), d))
        .unwrap_or(requested)
}
