pub mod batches;
pub mod eligibility;
pub mod emission;
pub mod evaluations;
pub mod health;
pub mod subjects;
