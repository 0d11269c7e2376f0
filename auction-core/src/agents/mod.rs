pub mod bidder;
pub mod policy;

pub use bidder::*;
pub use policy::*;
