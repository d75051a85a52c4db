pub mod budgeting;
pub mod itinerary;
pub mod seed;
pub mod trips;
pub mod weather_client;
pub mod weather_risk;
