pub mod sources;
pub mod reports;
pub mod unit;
pub mod assessment;

pub use sources::*;
pub use reports::*;
pub use unit::*;
pub use assessment::*;
