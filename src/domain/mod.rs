pub mod market;
pub mod observation;
pub mod port;
pub mod session;

pub use market::*;
pub use observation::*;
pub use port::*;
pub use session::*;
