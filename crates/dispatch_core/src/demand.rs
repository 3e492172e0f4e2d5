//! Synthetic bot demand.

use rand::Rng;

use crate::fleet::{Passenger, PassengerId, PassengerStatus};
use crate::stops::{DayPeriod, WeightedStops};
use crate::store::FleetState;

const BOT_NAMES: [&str; 16] = [
    "João", "Maria", "Pedro", "Ana", "Lucas", "Julia", "Mateus", "Larissa", "Bruno", "Carla",
    "Diego", "Fernanda", "Gabriel", "Helena", "Igor", "Jéssica",
];

/// Builds bot passengers travelling between two distinct weighted stops.
#[derive(Debug, Clone, Copy)]
pub struct BotGenerator<'a> {
    stops: &'a WeightedStops,
}

impl<'a> BotGenerator<'a> {
    pub fn new(stops: &'a WeightedStops) -> Self {
        Self { stops }
    }

    /// `None` when the table cannot supply two distinct stops.
    pub fn generate<R: Rng>(
        &self,
        id: PassengerId,
        now_ms: u64,
        rng: &mut R,
        hour: u32,
        realistic: bool,
    ) -> Option<Passenger> {
        let period = DayPeriod::from_hour(hour);
        let origin = self.stops.sample(rng, period, realistic, None)?;
        let destination = self
            .stops
            .sample(rng, period, realistic, Some(origin.id.as_str()))?;

        let mut passenger =
            Passenger::new(id, origin.location, destination.location, now_ms, true);
        passenger.name = BOT_NAMES[rng.gen_range(0..BOT_NAMES.len())].to_string();
        Some(passenger)
    }
}

/// Bots still waiting for a bus and not yet picked by the matcher.
pub fn unassigned_waiting_bots(state: &FleetState) -> usize {
    state
        .passengers
        .iter()
        .filter(|p| {
            p.is_bot && p.status == PassengerStatus::Waiting && p.assigned_bus_id.is_none()
        })
        .count()
}

pub fn period_description(hour: u32) -> &'static str {
    match DayPeriod::from_hour(hour) {
        DayPeriod::Morning => "morning peak (7-9h)",
        DayPeriod::Evening => "evening peak (17-19h)",
        DayPeriod::OffPeak => "off-peak",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stops::default_stops;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn bots_never_travel_to_their_origin() {
        let stops = WeightedStops::new(default_stops());
        let generator = BotGenerator::new(&stops);
        let mut rng = StdRng::seed_from_u64(42);
        for i in 0..100 {
            let bot = generator
                .generate(PassengerId(i), 0, &mut rng, 8, true)
                .expect("table has many stops");
            assert!(bot.is_bot);
            assert_ne!(bot.origin, bot.destination);
            assert_eq!(bot.status, PassengerStatus::Waiting);
            assert!(!bot.name.is_empty());
        }
    }

    #[test]
    fn single_stop_table_cannot_generate() {
        let mut stops = default_stops();
        stops.truncate(1);
        let stops = WeightedStops::new(stops);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(BotGenerator::new(&stops)
            .generate(PassengerId(1), 0, &mut rng, 12, false)
            .is_none());
    }

    #[test]
    fn describes_periods() {
        assert_eq!(period_description(8), "morning peak (7-9h)");
        assert_eq!(period_description(12), "off-peak");
    }
}
