pub mod actions;
pub mod card;
pub mod home_assistant;
pub mod i18n;
pub mod live_tree;
pub mod markup;
pub mod reconcile;
pub mod render;

pub use actions::{ActionDispatcher, ServiceCall, ServiceTransport, UserAction};
pub use card::{CardError, Gesture, SoundbeatsCard, UpdateOutcome};
