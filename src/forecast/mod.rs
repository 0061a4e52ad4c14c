pub mod demand;
pub mod features;

pub use demand::*;
pub use features::{FeatureBuilder, FeatureFrame, HolidayCalendar};
