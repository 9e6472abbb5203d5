//! Multi-dimensional vehicle capacity.

use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Seats, wheelchair places, bike places and luggage slots.
///
/// Used both for what a request needs and for what a vehicle offers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capacities {
    pub passengers: u32,
    pub wheelchairs: u32,
    pub bikes: u32,
    pub luggage: u32,
}

impl Capacities {
    pub const ZERO: Capacities = Capacities {
        passengers: 0,
        wheelchairs: 0,
        bikes: 0,
        luggage: 0,
    };

    pub fn new(passengers: u32, wheelchairs: u32, bikes: u32, luggage: u32) -> Self {
        Self {
            passengers,
            wheelchairs,
            bikes,
            luggage,
        }
    }

    /// True iff every dimension of `self` is at most the matching one of `max`.
    pub fn fits_within(&self, max: &Capacities) -> bool {
        self.passengers <= max.passengers
            && self.wheelchairs <= max.wheelchairs
            && self.bikes <= max.bikes
            && self.luggage <= max.luggage
    }

    /// Componentwise subtraction, clamped at zero.
    pub fn saturating_sub(&self, other: &Capacities) -> Capacities {
        Capacities {
            passengers: self.passengers.saturating_sub(other.passengers),
            wheelchairs: self.wheelchairs.saturating_sub(other.wheelchairs),
            bikes: self.bikes.saturating_sub(other.bikes),
            luggage: self.luggage.saturating_sub(other.luggage),
        }
    }

    /// Componentwise minimum.
    pub fn meet(&self, other: &Capacities) -> Capacities {
        Capacities {
            passengers: self.passengers.min(other.passengers),
            wheelchairs: self.wheelchairs.min(other.wheelchairs),
            bikes: self.bikes.min(other.bikes),
            luggage: self.luggage.min(other.luggage),
        }
    }
}

impl Add for Capacities {
    type Output = Capacities;

    fn add(self, other: Capacities) -> Capacities {
        Capacities {
            passengers: self.passengers.saturating_add(other.passengers),
            wheelchairs: self.wheelchairs.saturating_add(other.wheelchairs),
            bikes: self.bikes.saturating_add(other.bikes),
            luggage: self.luggage.saturating_add(other.luggage),
        }
    }
}

impl AddAssign for Capacities {
    fn add_assign(&mut self, other: Capacities) {
        *self = *self + other;
    }
}
