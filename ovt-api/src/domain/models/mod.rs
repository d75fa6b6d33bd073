mod email;
mod ids;
mod report;
mod scope;
mod statistics;
mod time_record;

pub use email::*;
pub use ids::*;
pub use report::*;
pub use scope::*;
pub use statistics::*;
pub use time_record::*;
