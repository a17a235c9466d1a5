//! Layout phase classification and the effective work area.

use crate::Rect;
use serde::{Deserialize, Serialize};

/// How much horizontal room a set of windows needs.
///
/// Variants are ordered by required width, so `Fits < Expanded < Overflow`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Everything fits in the visible work area (phase 1).
    #[default]
    Fits,
    /// Needs the expanded canvas but fits inside it (phase 2).
    Expanded,
    /// Overflows even the expanded canvas (phase 3); handled by the
    /// tiler's smart-resize fallback on the true work area.
    Overflow,
}

/// Total width needed for `widths`: the windows plus a gap on both sides of
/// each one (`count + 1` gaps).
pub fn required_width<I>(widths: I, spacing: i32) -> i64
where
    I: IntoIterator<Item = i32>,
{
    let mut count = 0i64;
    let mut sum = 0i64;
    for width in widths {
        count += 1;
        sum += i64::from(width.max(0));
    }
    if count == 0 {
        return 0;
    }
    sum + (count + 1) * i64::from(spacing.max(0))
}

/// Classify a set of window widths against a work-area width.
///
/// Pure and order-independent. An empty set always fits.
pub fn classify<I>(widths: I, work_area_width: i32, spacing: i32, expansion_ratio: f64) -> Phase
where
    I: IntoIterator<Item = i32>,
{
    let mut widths = widths.into_iter().peekable();
    if widths.peek().is_none() {
        return Phase::Fits;
    }

    let total = required_width(widths, spacing);
    let available = i64::from(work_area_width);

    if total <= available {
        Phase::Fits
    } else if total as f64 <= available as f64 * expansion_ratio {
        Phase::Expanded
    } else {
        Phase::Overflow
    }
}

/// The rectangle the tiler should lay windows out in for `phase`.
///
/// Only the expanded phase grows the area, symmetrically around the work
/// area's center so layouts radiate from the same visual center in every
/// phase. The growth is split into two equal integer halves, which keeps the
/// center exact in integer arithmetic.
pub fn effective_work_area(work_area: Rect, phase: Phase, expansion_ratio: f64) -> Rect {
    match phase {
        Phase::Fits | Phase::Overflow => work_area,
        Phase::Expanded => {
            let extra = f64::from(work_area.width) * (expansion_ratio - 1.0).max(0.0);
            let half = (extra / 2.0).round() as i32;
            Rect::new(
                work_area.x - half,
                work_area.y,
                work_area.width + 2 * half,
                work_area.height,
            )
        }
    }
}
