pub mod controller;
pub mod wait;

pub use controller::{CloseOutcome, CloseStep, NavState, NavigationController, OpenOutcome};
pub use wait::{Command, ControlHandle, Controls, Delays};
