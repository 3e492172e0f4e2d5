//! Fixed stop table and weighted stop sampling.
//!
//! Each stop carries a base importance weight and a multiplier per period of
//! the day. Sampling builds a cumulative distribution over the eligible stops
//! and binary-searches it, which selects exactly what a linear subtract-and-scan
//! over the same weights would.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopKind {
    Terminal,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DayPeriod {
    Morning,
    Evening,
    OffPeak,
}

impl DayPeriod {
    /// Morning peak is 07:00-09:00, evening peak 17:00-19:00.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            7..=8 => DayPeriod::Morning,
            17..=18 => DayPeriod::Evening,
            _ => DayPeriod::OffPeak,
        }
    }

    pub fn is_peak(self) -> bool {
        self != DayPeriod::OffPeak
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakMultipliers {
    pub morning: f64,
    pub evening: f64,
    pub off_peak: f64,
}

impl PeakMultipliers {
    pub const FLAT: Self = Self {
        morning: 1.0,
        evening: 1.0,
        off_peak: 1.0,
    };

    pub fn for_period(&self, period: DayPeriod) -> f64 {
        match period {
            DayPeriod::Morning => self.morning,
            DayPeriod::Evening => self.evening,
            DayPeriod::OffPeak => self.off_peak,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: String,
    pub name: String,
    pub location: Coordinate,
    pub kind: StopKind,
    pub weight: f64,
    pub peak: PeakMultipliers,
}

impl Stop {
    fn effective_weight(&self, period: DayPeriod, realistic: bool) -> f64 {
        let multiplier = if realistic {
            self.peak.for_period(period)
        } else {
            1.0
        };
        (self.weight * multiplier).max(0.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct WeightedStops {
    stops: Vec<Stop>,
}

impl WeightedStops {
    pub fn new(stops: Vec<Stop>) -> Self {
        Self { stops }
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Draw a stop, weighted by importance and (when `realistic`) the period's multiplier.
    ///
    /// The stop with id `exclude` is never returned. When every eligible weight is
    /// zero the last eligible stop is returned; `None` only if nothing is eligible.
    pub fn sample<R: Rng>(
        &self,
        rng: &mut R,
        period: DayPeriod,
        realistic: bool,
        exclude: Option<&str>,
    ) -> Option<&Stop> {
        let eligible: Vec<&Stop> = self
            .stops
            .iter()
            .filter(|stop| Some(stop.id.as_str()) != exclude)
            .collect();
        let last = *eligible.last()?;

        let mut cumulative = Vec::with_capacity(eligible.len());
        let mut total = 0.0;
        for stop in &eligible {
            total += stop.effective_weight(period, realistic);
            cumulative.push(total);
        }
        if total <= 0.0 {
            return Some(last);
        }

        let r: f64 = rng.gen_range(0.0..total);
        let idx = cumulative
            .partition_point(|&w| w < r)
            .min(eligible.len() - 1);
        Some(eligible[idx])
    }

    /// Uniform pick, used for cruising targets.
    pub fn random_stop<R: Rng>(&self, rng: &mut R) -> Option<&Stop> {
        if self.stops.is_empty() {
            return None;
        }
        Some(&self.stops[rng.gen_range(0..self.stops.len())])
    }

    /// Stop at `index`, wrapping around the table.
    pub fn cycled(&self, index: usize) -> Option<&Stop> {
        if self.stops.is_empty() {
            return None;
        }
        self.stops.get(index % self.stops.len())
    }
}

/// Passo Fundo stop table. Terminals attract more demand.
pub fn default_stops() -> Vec<Stop> {
    const MORNING_HUB: PeakMultipliers = PeakMultipliers {
        morning: 2.0,
        evening: 1.2,
        off_peak: 1.0,
    };
    const EVENING_HUB: PeakMultipliers = PeakMultipliers {
        morning: 1.2,
        evening: 2.0,
        off_peak: 1.0,
    };
    const RESIDENTIAL: PeakMultipliers = PeakMultipliers {
        morning: 1.5,
        evening: 1.5,
        off_peak: 0.8,
    };

    let table: [(&str, f64, f64, StopKind, f64, PeakMultipliers); 15] = [
        ("Shopping Bella Città", -28.2635, -52.4075, StopKind::Terminal, 8.0, EVENING_HUB),
        ("UPF (Campus I)", -28.2325, -52.3815, StopKind::Terminal, 10.0, MORNING_HUB),
        ("Hospital São Vicente", -28.2610, -52.4110, StopKind::Stop, 6.0, PeakMultipliers::FLAT),
        ("Parque da Gare", -28.2670, -52.4150, StopKind::Stop, 3.0, EVENING_HUB),
        ("Catedral", -28.2625, -52.4080, StopKind::Stop, 4.0, PeakMultipliers::FLAT),
        ("Bairro Boqueirão", -28.2750, -52.4250, StopKind::Stop, 5.0, RESIDENTIAL),
        ("Bairro São Cristóvão", -28.2500, -52.3900, StopKind::Stop, 5.0, RESIDENTIAL),
        ("Rodoviária", -28.2700, -52.4200, StopKind::Terminal, 9.0, PeakMultipliers::FLAT),
        ("Bourbon Shopping", -28.2580, -52.4000, StopKind::Stop, 6.0, EVENING_HUB),
        ("Praça Tamandaré", -28.2600, -52.4050, StopKind::Stop, 4.0, PeakMultipliers::FLAT),
        ("IFSUL", -28.2550, -52.3950, StopKind::Stop, 5.0, MORNING_HUB),
        ("Stok Center", -28.2800, -52.4300, StopKind::Stop, 3.0, EVENING_HUB),
        ("Petrópolis", -28.2450, -52.3850, StopKind::Stop, 4.0, RESIDENTIAL),
        ("Vila Rodrigues", -28.2550, -52.4150, StopKind::Stop, 3.0, RESIDENTIAL),
        ("Lucas Araújo", -28.2400, -52.4000, StopKind::Stop, 3.0, RESIDENTIAL),
    ];

    table
        .into_iter()
        .enumerate()
        .map(|(i, (name, lat, lng, kind, weight, peak))| Stop {
            id: format!("stop-{}", i + 1),
            name: name.to_string(),
            location: Coordinate::new(lat, lng),
            kind,
            weight,
            peak,
        })
        .collect()
}
