use chrono::{DateTime, Utc};

use crate::models::{PlanItem, SwitchAction};

/// Attaches ON/OFF switch actions to time-ordered plan items.
///
/// Adjacent selected intervals share a single ON span. A partial allocation
/// that opens a span is pushed to the end of its interval (or of the window)
/// so it can run straight into the next interval; a partial allocation that
/// continues a span ends it early. Read in time order, the actions always
/// alternate ON, OFF, ... starting with ON and ending with OFF.
pub fn synthesize_switch_actions(items: &mut [PlanItem], to: DateTime<Utc>) {
    let mut prev_is_adjacent = false;

    for index in 0..items.len() {
        if prev_is_adjacent && index > 0 {
            let previous_end = items[index - 1].price_list_item.ends_at();
            if items[index].price_list_item.starts_at != previous_end {
                items[index - 1]
                    .switch_actions
                    .push(SwitchAction::new(previous_end, false));
                prev_is_adjacent = false;
            }
        }

        let item = &mut items[index];
        let starts_at = item.price_list_item.starts_at;
        if item.is_partial() {
            if prev_is_adjacent {
                item.switch_actions
                    .push(SwitchAction::new(starts_at + item.duration, false));
                prev_is_adjacent = false;
            } else {
                let ends_at = item.price_list_item.ends_at().min(to);
                item.switch_actions
                    .push(SwitchAction::new(ends_at - item.duration, true));
                prev_is_adjacent = true;
            }
        } else if !prev_is_adjacent {
            item.switch_actions.push(SwitchAction::new(starts_at, true));
            prev_is_adjacent = true;
        }
    }

    if let Some(last) = items.last_mut() {
        let span_open = last
            .switch_actions
            .last()
            .is_none_or(SwitchAction::switch_on);
        if span_open {
            let span_start = last
                .switch_actions
                .iter()
                .rev()
                .find(|action| action.switch_on())
                .map_or(last.price_list_item.starts_at, SwitchAction::at);
            last.switch_actions
                .push(SwitchAction::new(span_start + last.duration, false));
        }
    }
}
