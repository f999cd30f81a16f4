pub mod acquisition;
pub mod channels;
pub mod context;
pub mod panorama;
pub mod trigger;
pub mod units;
pub mod viewport;
