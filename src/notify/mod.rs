//! Change notification for collection trees.
//!
//! Every collection owns a [`ChangeHub`]. Nested collections link their hub
//! to the hub of the collection holding their owning record, so a fire in a
//! leaf reaches the root. Observers either register a callback or take a
//! channel subscription:
//!
//! ```ignore
//! let hub = ChangeHub::new();
//! hub.on_change(|| println!("re-render"));
//! let sub = hub.subscribe(16);
//!
//! {
//!     let _hold = hub.hold();
//!     hub.fire();
//!     hub.fire();
//! } // one delivery here
//!
//! assert_eq!(sub.drain(), 1);
//! ```

mod hub;
mod subscription;

pub use hub::{ChangeHub, HoldGuard};
pub use subscription::ChangeSubscription;
