pub mod config;
pub mod snapshot;
pub mod view_model;

pub use config::{CardConfig, Surface};
pub use snapshot::{EntityState, Snapshot};
pub use view_model::ViewModel;
