//! odm-dispatch core
//!
//! Feasibility checking and booking for an on-demand ride-pooling service:
//! which vehicles can serve a ride, at which times, and committing the ride
//! without double-booking a vehicle.

pub mod allowed_times;
pub mod booking;
pub mod capacities;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod haversine;
pub mod http;
pub mod insertion;
pub mod interval;
pub mod model;
pub mod osrm;
pub mod store;
pub mod traits;
