mod notification;
mod webhook_event;

pub use notification::*;
pub use webhook_event::*;
