//! Cheapest-hours charge planning.

use bon::Builder;
use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeDelta};

use crate::{
    core::price::{PriceCurve, PriceSlot},
    prelude::*,
    quantity::{
        cost::Cost,
        energy::KilowattHours,
        percent::Percent,
        power::Kilowatts,
        rate::KilowattHourRate,
    },
};

/// A contiguous run of whole charge hours.
///
/// Chargers and cars dislike being started and stopped every hour, so the
/// selected hours are merged into as few runs as possible.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChargeWindow {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,

    /// Mean price over the window's constituent hours.
    pub mean_rate: KilowattHourRate,
}

impl ChargeWindow {
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }
}

/// The built charge plan: disjoint windows, sorted by start time.
#[derive(Clone, Debug, PartialEq)]
pub struct ChargePlan {
    pub windows: Vec<ChargeWindow>,

    /// Whole hours required to reach the target state of charge.
    pub hours_needed: usize,

    /// Hours actually selected, possibly fewer than needed.
    pub hours_selected: usize,

    /// Estimated cost of the selected hours, informational only.
    pub estimated_cost: Cost,

    pub currency: Option<String>,

    /// `false` when the plan cannot reach the target before the deadline.
    pub reaches_target: bool,
}

/// Outcome of a planning cycle. Both non-plan outcomes are normal
/// conditions, not errors.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// Nothing to charge, nothing to schedule.
    AlreadyCharged,

    /// No usable price slots in the planning horizon.
    NoPriceData,

    Planned(ChargePlan),
}

#[derive(Builder)]
pub struct Planner<'a> {
    now: DateTime<Local>,

    /// The car must be ready by this time; without it any future hour is
    /// acceptable.
    ready_at: Option<DateTime<Local>>,

    state_of_charge: Percent,
    battery_capacity: KilowattHours,

    /// Whatever is lower: the charger's or the onboard charger's rate.
    charge_power: Kilowatts,

    curve: &'a PriceCurve,
}

impl Planner<'_> {
    /// Build the charge plan. Deterministic: the same inputs always produce
    /// the same plan.
    #[instrument(skip_all)]
    pub fn plan(&self) -> Outcome {
        let needed_energy = self.battery_capacity * self.state_of_charge.missing_proportion();
        let hours_needed = (needed_energy / self.charge_power).ceil();
        if hours_needed <= 0.0 {
            info!(?needed_energy, "the battery is already at the target");
            return Outcome::AlreadyCharged;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let hours_needed = hours_needed as usize;

        let mut available = self.curve.availability_window(self.now, self.ready_at);
        if available.is_empty() {
            warn!("no usable price slots in the planning horizon");
            return Outcome::NoPriceData;
        }

        // Stable by price: an exact price tie goes to the earlier payload slot.
        available.sort_by_key(|slot| slot.rate);
        let cheapest = &available[..hours_needed.min(available.len())];

        let hourly_energy = self.charge_power * TimeDelta::hours(1);
        let estimated_cost = cheapest.iter().map(|slot| slot.rate * hourly_energy).sum();

        #[allow(clippy::cast_possible_wrap)]
        let reaches_target = cheapest.len() == hours_needed
            && self
                .ready_at
                .is_none_or(|ready_at| self.now + TimeDelta::hours(hours_needed as i64) <= ready_at);

        Outcome::Planned(ChargePlan {
            hours_needed,
            hours_selected: cheapest.len(),
            windows: merge_contiguous(cheapest.to_vec()),
            estimated_cost,
            currency: self.curve.currency.clone(),
            reaches_target,
        })
    }
}

/// Merge back-to-back hourly slots into contiguous windows.
///
/// The result is disjoint, sorted by start, and covers exactly the input
/// hours. Duplicate start times are a data-quality precondition on the
/// caller.
pub fn merge_contiguous(mut slots: Vec<PriceSlot>) -> Vec<ChargeWindow> {
    slots.sort_by_key(|slot| slot.start);

    let mut windows = Vec::new();
    let mut run: Vec<PriceSlot> = Vec::new();
    for slot in slots {
        if let Some(last) = run.last()
            && slot.start != last.start + TimeDelta::hours(1)
        {
            windows.push(close_run(&run));
            run.clear();
        }
        run.push(slot);
    }
    if !run.is_empty() {
        windows.push(close_run(&run));
    }
    windows
}

fn close_run(run: &[PriceSlot]) -> ChargeWindow {
    #[allow(clippy::cast_precision_loss)]
    let mean_rate = KilowattHourRate(
        run.iter().map(|slot| slot.rate.0).sum::<f64>() / run.len() as f64,
    );
    ChargeWindow { start: run[0].start, end: run[run.len() - 1].end, mean_rate }
}

/// Resolve the raw `input_datetime` state into the planning deadline.
///
/// Accepts both date-time and time-only states; a deadline that has already
/// passed means "tomorrow at that time". `now` exactly at the deadline has
/// NOT passed it.
pub fn resolve_ready_at(now: DateTime<Local>, raw: &str) -> Option<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok().or_else(|| {
        let time = NaiveTime::parse_from_str(raw, "%H:%M:%S").ok()?;
        Some(now.date_naive().and_time(time))
    })?;
    let ready_at = naive.and_local_timezone(Local).earliest()?;
    if now > ready_at { Some(ready_at + TimeDelta::days(1)) } else { Some(ready_at) }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use itertools::Itertools;

    use super::*;

    fn slot(day: u32, hour: u32, rate: f64) -> PriceSlot {
        let start: DateTime<Local> =
            format!("2026-08-{day:02}T{hour:02}:00:00+02:00").parse().unwrap();
        PriceSlot { start, end: start + TimeDelta::hours(1), rate: KilowattHourRate(rate) }
    }

    fn curve(slots: &[PriceSlot]) -> PriceCurve {
        let points = slots
            .iter()
            .map(|slot| {
                serde_json::json!({
                    "start": slot.start.to_rfc3339(),
                    "end": slot.end.to_rfc3339(),
                    "value": slot.rate.0,
                })
            })
            .collect_vec();
        PriceCurve::from_attributes(
            serde_json::json!({"raw_today": points, "currency": "NOK"}),
        )
        .unwrap()
    }

    fn planner_now() -> DateTime<Local> {
        "2026-08-04T09:00:00+02:00".parse().unwrap()
    }

    #[test]
    fn merge_empty_ok() {
        assert_eq!(merge_contiguous(Vec::new()), Vec::new());
    }

    #[test]
    fn merge_single_slot_ok() {
        let windows = merge_contiguous(vec![slot(4, 10, 0.3)]);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].duration(), TimeDelta::hours(1));
        assert_eq!(windows[0].mean_rate, KilowattHourRate(0.3));
    }

    #[test]
    fn merge_splits_on_gap_ok() {
        // 10:00–11:00 and 11:00–12:00 merge, 14:00–15:00 stands alone:
        let windows =
            merge_contiguous(vec![slot(4, 10, 0.2), slot(4, 11, 0.4), slot(4, 14, 0.1)]);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].start, slot(4, 10, 0.2).start);
        assert_eq!(windows[0].end, slot(4, 11, 0.4).end);
        assert_eq!(windows[0].mean_rate, KilowattHourRate((0.2 + 0.4) / 2.0));
        assert_eq!(windows[1].start, slot(4, 14, 0.1).start);
        assert_eq!(windows[1].end, slot(4, 14, 0.1).end);
    }

    #[test]
    fn merge_is_order_independent_and_covers_all_hours() {
        let slots = vec![slot(4, 14, 0.1), slot(4, 10, 0.2), slot(4, 11, 0.4), slot(4, 23, 0.5)];
        let windows = merge_contiguous(slots.clone());

        // Disjoint and sorted:
        for (left, right) in windows.iter().tuple_windows() {
            assert!(left.end <= right.start);
        }
        // No hour lost or duplicated:
        let covered: i64 = windows.iter().map(|window| window.duration().num_hours()).sum();
        assert_eq!(usize::try_from(covered).unwrap(), slots.len());
    }

    #[test]
    fn needed_hours_ok() {
        // 75 kWh at 20% leaves 60 kWh, at 11 kW that is ceil(60 / 11) = 6 hours:
        let slots = (10..20).map(|hour| slot(4, hour, 0.1 * f64::from(hour))).collect_vec();
        let outcome = Planner::builder()
            .now(planner_now())
            .state_of_charge(Percent(20.0))
            .battery_capacity(KilowattHours(75.0))
            .charge_power(Kilowatts(11.0))
            .curve(&curve(&slots))
            .build()
            .plan();
        let Outcome::Planned(plan) = outcome else {
            panic!("expected a plan, got {outcome:?}");
        };
        assert_eq!(plan.hours_needed, 6);
        assert_eq!(plan.hours_selected, 6);
        assert!(plan.reaches_target);
    }

    #[test]
    fn planning_is_idempotent() {
        let slots = (0..24).map(|hour| slot(5, hour, f64::from((hour * 7) % 24))).collect_vec();
        let curve = curve(&slots);
        let build = || {
            Planner::builder()
                .now(planner_now())
                .state_of_charge(Percent(50.0))
                .battery_capacity(KilowattHours(75.0))
                .charge_power(Kilowatts(11.0))
                .curve(&curve)
                .build()
                .plan()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn cheapest_selection_is_optimal() {
        let slots =
            vec![slot(4, 10, 0.9), slot(4, 11, 0.2), slot(4, 12, 0.7), slot(4, 13, 0.1), slot(4, 14, 0.4)];
        let curve = curve(&slots);
        let outcome = Planner::builder()
            .now(planner_now())
            .state_of_charge(Percent(0.0))
            // 33 kWh at 11 kW: exactly 3 hours:
            .battery_capacity(KilowattHours(33.0))
            .charge_power(Kilowatts(11.0))
            .curve(&curve)
            .build()
            .plan();
        let Outcome::Planned(plan) = outcome else {
            panic!("expected a plan, got {outcome:?}");
        };

        // No other 3-hour subset is cheaper:
        let hourly_energy = Kilowatts(11.0) * TimeDelta::hours(1);
        for subset in slots.iter().combinations(3) {
            let cost: Cost = subset.iter().map(|slot| slot.rate * hourly_energy).sum();
            assert!(plan.estimated_cost.0 <= cost.0 + 1e-9);
        }
    }

    #[test]
    fn price_tie_goes_to_the_earlier_slot() {
        let slots = vec![slot(4, 10, 0.5), slot(4, 11, 0.3), slot(4, 12, 0.3), slot(4, 13, 0.4)];
        let outcome = Planner::builder()
            .now(planner_now())
            .state_of_charge(Percent(0.0))
            // One hour only:
            .battery_capacity(KilowattHours(10.0))
            .charge_power(Kilowatts(11.0))
            .curve(&curve(&slots))
            .build()
            .plan();
        let Outcome::Planned(plan) = outcome else {
            panic!("expected a plan, got {outcome:?}");
        };
        assert_eq!(plan.windows.len(), 1);
        assert_eq!(plan.windows[0].start, slot(4, 11, 0.3).start);
    }

    #[test]
    fn short_horizon_still_plans() {
        // 6 hours needed but the deadline leaves only 2:
        let slots = (10..12).map(|hour| slot(4, hour, 0.2)).collect_vec();
        let deadline = slot(4, 11, 0.2).start;
        let outcome = Planner::builder()
            .now(planner_now())
            .ready_at(deadline)
            .state_of_charge(Percent(20.0))
            .battery_capacity(KilowattHours(75.0))
            .charge_power(Kilowatts(11.0))
            .curve(&curve(&slots))
            .build()
            .plan();
        let Outcome::Planned(plan) = outcome else {
            panic!("expected a plan, got {outcome:?}");
        };
        assert_eq!(plan.hours_needed, 6);
        assert_eq!(plan.hours_selected, 2);
        assert!(!plan.reaches_target);
    }

    #[test]
    fn already_charged_ok() {
        let outcome = Planner::builder()
            .now(planner_now())
            .state_of_charge(Percent(100.0))
            .battery_capacity(KilowattHours(75.0))
            .charge_power(Kilowatts(11.0))
            .curve(&curve(&[slot(4, 10, 0.2)]))
            .build()
            .plan();
        assert_eq!(outcome, Outcome::AlreadyCharged);
    }

    #[test]
    fn no_price_data_ok() {
        let outcome = Planner::builder()
            .now(planner_now())
            .state_of_charge(Percent(0.0))
            .battery_capacity(KilowattHours(75.0))
            .charge_power(Kilowatts(11.0))
            .curve(&curve(&[]))
            .build()
            .plan();
        assert_eq!(outcome, Outcome::NoPriceData);
    }

    #[test]
    fn ready_at_in_the_future_is_kept() {
        let now = Local.with_ymd_and_hms(2026, 8, 4, 6, 0, 0).unwrap();
        let resolved = resolve_ready_at(now, "07:00:00").unwrap();
        assert_eq!(resolved, Local.with_ymd_and_hms(2026, 8, 4, 7, 0, 0).unwrap());
    }

    #[test]
    fn ready_at_boundary_is_not_rolled_over() {
        let now = Local.with_ymd_and_hms(2026, 8, 4, 7, 0, 0).unwrap();
        let resolved = resolve_ready_at(now, "07:00:00").unwrap();
        assert_eq!(resolved, now);
    }

    #[test]
    fn passed_ready_at_rolls_over_to_tomorrow() {
        let now = Local.with_ymd_and_hms(2026, 8, 4, 7, 0, 1).unwrap();
        let resolved = resolve_ready_at(now, "2026-08-04 07:00:00").unwrap();
        assert_eq!(resolved, Local.with_ymd_and_hms(2026, 8, 5, 7, 0, 0).unwrap());
    }

    #[test]
    fn unparseable_ready_at_is_none() {
        assert_eq!(resolve_ready_at(planner_now(), "unknown"), None);
    }
}
