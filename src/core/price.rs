//! Day-ahead price curve as published by a Nordpool-style sensor.

use chrono::{DateTime, Local};
use serde::Deserialize;
use serde_json::Value;

use crate::{prelude::*, quantity::rate::KilowattHourRate};

/// One hour of the price curve with a usable price.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PriceSlot {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub rate: KilowattHourRate,
}

/// Today's and tomorrow's hourly prices, concatenated.
///
/// Tomorrow's half is empty until the exchange publishes it in the afternoon.
#[derive(Clone, Debug)]
pub struct PriceCurve {
    points: Vec<CurvePoint>,
    pub currency: Option<String>,
}

#[derive(Copy, Clone, Debug, Deserialize)]
struct CurvePoint {
    start: DateTime<Local>,
    end: DateTime<Local>,
    #[serde(rename = "value")]
    rate: Option<KilowattHourRate>,
}

#[derive(Deserialize)]
struct PriceAttributes {
    #[serde(default, rename = "raw_today")]
    today: Vec<CurvePoint>,

    #[serde(default, rename = "raw_tomorrow")]
    tomorrow: Vec<CurvePoint>,

    #[serde(default)]
    currency: Option<String>,
}

impl PriceCurve {
    /// Parse the price sensor's attribute bundle. A missing sensor reads as
    /// an empty curve, not an error.
    pub fn from_attributes(attributes: Value) -> Result<Self> {
        if attributes.is_null() {
            return Ok(Self { points: Vec::new(), currency: None });
        }
        let attributes: PriceAttributes = serde_json::from_value(attributes)
            .context("failed to parse the price sensor attributes")?;
        let mut points = attributes.today;
        points.extend(attributes.tomorrow);
        Ok(Self { points, currency: attributes.currency })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Slots inside the planning horizon: priced, not yet started, and not
    /// past the deadline. A slot starting exactly at the deadline is kept.
    pub fn availability_window(
        &self,
        now: DateTime<Local>,
        deadline: Option<DateTime<Local>>,
    ) -> Vec<PriceSlot> {
        self.points
            .iter()
            .filter(|point| point.start > now)
            .filter(|point| deadline.is_none_or(|deadline| point.start <= deadline))
            .filter_map(|point| {
                let rate = point.rate?;
                Some(PriceSlot { start: point.start, end: point.end, rate })
            })
            .collect()
    }
}
