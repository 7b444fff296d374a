pub mod session;
pub mod timing;

pub use session::{ClientTiming, ClientTimings, Session};
pub use timing::{CustomTiming, ExecuteType, Timing};
