pub mod governor_event;

pub use governor_event::GovernorEvent;
