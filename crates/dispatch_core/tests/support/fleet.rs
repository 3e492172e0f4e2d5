use dispatch_core::fleet::{
    Assignment, Bus, BusId, BusState, Passenger, PassengerId, PassengerStatus,
};
use dispatch_core::geo::Coordinate;
use dispatch_core::test_helpers::{STOP_A, STOP_B};

/// Builder for bus fixtures.
#[derive(Clone, Debug)]
pub struct BusBuilder {
    id: u64,
    location: Coordinate,
    state: BusState,
    state_start_ms: u64,
    path: Vec<Coordinate>,
    assignment: Option<Assignment>,
}

impl BusBuilder {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            location: STOP_A,
            state: BusState::Available,
            state_start_ms: 0,
            path: Vec::new(),
            assignment: None,
        }
    }

    pub fn at(mut self, location: Coordinate) -> Self {
        self.location = location;
        self
    }

    pub fn with_state(mut self, state: BusState) -> Self {
        self.state = state;
        self
    }

    pub fn since(mut self, state_start_ms: u64) -> Self {
        self.state_start_ms = state_start_ms;
        self
    }

    pub fn with_path(mut self, path: Vec<Coordinate>) -> Self {
        self.path = path;
        self
    }

    /// Bind the bus to `passenger` with straight-line legs.
    pub fn serving(mut self, passenger: &Passenger) -> Self {
        self.assignment = Some(Assignment {
            passenger_id: passenger.id,
            pickup_location: passenger.origin,
            dropoff_location: passenger.destination,
            pickup_path: vec![self.location, passenger.origin],
            dropoff_path: vec![passenger.origin, passenger.destination],
        });
        self
    }

    pub fn build(self) -> Bus {
        let mut bus = Bus::new(BusId(self.id), format!("bus {}", self.id), self.location, 0);
        bus.state = self.state;
        bus.state_start_ms = self.state_start_ms;
        bus.path = self.path;
        if matches!(self.state, BusState::GoingToDropoff | BusState::Disembarking) {
            if let Some(assignment) = &self.assignment {
                bus.passengers_on_board.insert(assignment.passenger_id);
            }
        }
        bus.assignment = self.assignment;
        bus
    }
}

/// Builder for passenger fixtures.
#[derive(Clone, Debug)]
pub struct PassengerBuilder {
    id: u64,
    origin: Coordinate,
    destination: Coordinate,
    request_ms: u64,
    is_bot: bool,
    status: PassengerStatus,
    assigned_bus: Option<u64>,
}

impl PassengerBuilder {
    pub fn bot(id: u64) -> Self {
        Self {
            id,
            origin: STOP_A,
            destination: STOP_B,
            request_ms: 0,
            is_bot: true,
            status: PassengerStatus::Waiting,
            assigned_bus: None,
        }
    }

    pub fn user(id: u64) -> Self {
        Self {
            is_bot: false,
            ..Self::bot(id)
        }
    }

    pub fn from(mut self, origin: Coordinate) -> Self {
        self.origin = origin;
        self
    }

    pub fn to(mut self, destination: Coordinate) -> Self {
        self.destination = destination;
        self
    }

    pub fn requested_at(mut self, request_ms: u64) -> Self {
        self.request_ms = request_ms;
        self
    }

    pub fn with_status(mut self, status: PassengerStatus) -> Self {
        self.status = status;
        self
    }

    pub fn reserving(mut self, bus: u64) -> Self {
        self.assigned_bus = Some(bus);
        self
    }

    pub fn build(self) -> Passenger {
        let mut passenger = Passenger::new(
            PassengerId(self.id),
            self.origin,
            self.destination,
            self.request_ms,
            self.is_bot,
        );
        passenger.status = self.status;
        passenger.assigned_bus_id = self.assigned_bus.map(BusId);
        passenger
    }
}
