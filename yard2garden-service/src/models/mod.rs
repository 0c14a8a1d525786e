pub mod plan;
pub mod request;
pub mod response;

pub use plan::{GardenPlan, PlanParseError};
pub use request::{GenerationRequest, Location, SourceImage, Tier, YardInput, YardParams};
pub use response::{GenerationResponse, GenerationResult};
