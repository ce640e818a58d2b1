use chrono::{DateTime, TimeDelta, Utc};
use log::debug;

use super::switch_actions::synthesize_switch_actions;
use crate::models::{ConsumptionPlan, PlanItem, PriceInterval};

/// Gives every interval the summed window-clipped duration of its plateau,
/// the run of consecutive intervals sharing its price. Among equally priced
/// intervals the selection then prefers the longest contiguous run, which
/// keeps the number of switch actions down.
pub fn apply_weights(
    price_list: &[PriceInterval],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<PriceInterval> {
    let mut weighted = price_list.to_vec();

    let mut plateau_start = 0;
    while plateau_start < weighted.len() {
        let price = weighted[plateau_start].price;
        let plateau_end = weighted[plateau_start..]
            .iter()
            .position(|item| item.price != price)
            .map_or(weighted.len(), |offset| plateau_start + offset);

        let weight = weighted[plateau_start..plateau_end]
            .iter()
            .fold(TimeDelta::zero(), |total, item| {
                total + item.clipped_duration(from, to)
            });
        for item in &mut weighted[plateau_start..plateau_end] {
            item.weight = Some(weight);
        }

        plateau_start = plateau_end;
    }

    weighted
}

/// Greedily picks the cheapest intervals until `required` is covered.
///
/// Candidates are ordered by price, then by descending weight, then by start
/// time. Each interval contributes at most its part inside `[from, to]`; the
/// last one taken may be cut short to fit the remaining budget. The result is
/// ordered by start time and never exceeds the available duration.
pub fn select_plan_items(
    price_list: &[PriceInterval],
    required: TimeDelta,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<PlanItem> {
    let mut candidates = price_list.to_vec();
    candidates.sort_by(|a, b| {
        a.price
            .cmp(&b.price)
            .then_with(|| b.weight.unwrap_or_default().cmp(&a.weight.unwrap_or_default()))
            .then_with(|| a.starts_at.cmp(&b.starts_at))
    });

    let mut consumed = TimeDelta::zero();
    let mut selected = Vec::new();
    for candidate in candidates {
        let remaining = required - consumed;
        if remaining <= TimeDelta::zero() {
            break;
        }

        let available = candidate.clipped_duration(from, to);
        if available <= TimeDelta::zero() {
            continue;
        }

        if available <= remaining {
            consumed += available;
            selected.push(PlanItem::new(candidate, available));
        } else {
            consumed += remaining;
            selected.push(PlanItem::new(candidate, remaining));
            break;
        }
    }

    selected.sort_by_key(|item| item.price_list_item.starts_at);
    selected
}

/// Builds a processing plan consuming `required` within `[now, finish_at)`.
pub fn compute_consumption_plan(
    price_list: &[PriceInterval],
    required: TimeDelta,
    now: DateTime<Utc>,
    finish_at: DateTime<Utc>,
) -> ConsumptionPlan {
    let weighted = apply_weights(price_list, now, finish_at);
    let mut items = select_plan_items(&weighted, required, now, finish_at);
    synthesize_switch_actions(&mut items, finish_at);

    debug!(
        "Computed consumption plan with {} items for {} min before {}",
        items.len(),
        required.num_minutes(),
        finish_at
    );
    ConsumptionPlan::new(now, required, finish_at, items)
}
