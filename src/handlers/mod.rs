pub mod confirmation;
pub mod orders;
pub mod payments;
