pub mod itinerary;
pub mod raw;
pub mod request;

pub use itinerary::{Activity, DayPlan, Itinerary};
pub use raw::RawGenerationResponse;
pub use request::TripRequest;
