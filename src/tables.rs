use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{
    config::Config,
    core::{plan::ChargePlan, price::PriceSlot},
    quantity::rate::KilowattHourRate,
};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table
}

pub fn build_plan_table(plan: &ChargePlan) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Date", "Start", "End", "Hours", "Mean rate"]);
    for window in &plan.windows {
        table.add_row(vec![
            Cell::new(window.start.format("%b %d")).add_attribute(Attribute::Dim),
            Cell::new(window.start.format("%H:%M")),
            Cell::new(window.end.format("%H:%M")).add_attribute(Attribute::Dim),
            Cell::new(window.duration().num_hours()).set_alignment(CellAlignment::Right),
            Cell::new(window.mean_rate).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

pub fn build_price_table(slots: &[PriceSlot]) -> Table {
    #[allow(clippy::cast_precision_loss)]
    let mean_rate = KilowattHourRate(
        slots.iter().map(|slot| slot.rate.0).sum::<f64>() / slots.len().max(1) as f64,
    );

    let mut table = new_table();
    table.set_header(vec!["Date", "Start", "End", "Rate"]);
    for slot in slots {
        table.add_row(vec![
            Cell::new(slot.start.format("%b %d")).add_attribute(Attribute::Dim),
            Cell::new(slot.start.format("%H:%M")),
            Cell::new(slot.end.format("%H:%M")).add_attribute(Attribute::Dim),
            Cell::new(slot.rate).set_alignment(CellAlignment::Right).fg(
                if slot.rate >= mean_rate { Color::Red } else { Color::Green },
            ),
        ]);
    }
    table
}

/// The startup wiring dump: one look should tell which capabilities are on.
pub fn build_config_table(config: &Config) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Setting", "Value"]);

    let mut row = |setting: &str, value: String| {
        table.add_row(vec![
            Cell::new(setting).add_attribute(Attribute::Dim),
            Cell::new(value),
        ]);
    };
    let entity = |entity: &Option<String>| entity.clone().unwrap_or_else(|| "—".to_string());

    row("Power usage", config.mains.power_usage_entity.clone());
    row("Main fuse", config.mains.main_fuse.to_string());
    row(
        "Mains",
        format!("{} × {} phases", config.mains.mains.voltage, config.mains.mains.phases),
    );
    row("Charger status", config.charger.status_entity.clone());
    row("Charger current", entity(&config.charger.current_entity));
    row("Battery capacity", config.car.battery_capacity.to_string());
    row("Charge power", config.car.charge_power.to_string());
    row("State of charge", entity(&config.car.soc_entity));
    row("Ready at", entity(&config.car.ready_at_entity));
    row("Price curve", config.plan.price_entity.clone());
    row("Smart charging toggle", entity(&config.plan.smart_charging_entity));
    row("Replan trigger", entity(&config.plan.replan_entity));
    row(
        "Presence guard",
        config.plan.presence.as_ref().map_or_else(
            || "off".to_string(),
            |guard| format!("{} + {}", guard.tracker_entity, guard.connected_entity),
        ),
    );
    row(
        "Load balancing",
        config.load_balance.as_ref().map_or_else(
            || "off".to_string(),
            |section| format!("{:?}", section.mode).to_lowercase(),
        ),
    );
    row(
        "Notifications",
        config.notify.as_ref().map_or_else(|| "off".to_string(), |notify| notify.service.to_string()),
    );
    table
}
