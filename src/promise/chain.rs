//! Chain composer: settles a child promise from a reaction's return value.
//!
//! When a success or failure reaction runs, whatever it returns drives the
//! settlement of the child promise created at registration:
//!
//! - a plain value or error settles the child immediately through the
//!   normal resolution path;
//! - another promise defers the child: an internal identity success/failure
//!   pair is registered on it that forwards its eventual outcome into the
//!   child (flattening), so the async-delivery rule holds transitively.
//!
//! A derived child belongs to its chain. If the consumer settles it
//! directly, the forwarding here trips the exactly-once contract; that is a
//! usage bug and fatal.

use crate::promise::reaction::{ReactionSet, Resolution};
use crate::promise::Promise;

/// Settles `child` according to what a reaction returned.
pub(super) fn settle_child<V, E>(child: &Promise<V, E>, resolution: Resolution<V, E>)
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    match resolution {
        Resolution::Value(value) => child
            .resolve_value(value)
            .expect("derived promise was resolved outside its chain"),
        Resolution::Error(error) => child
            .resolve_error(Some(error))
            .expect("derived promise was resolved outside its chain"),
        Resolution::Chain(source) => {
            let forward = ReactionSet::new()
                .on_success(Resolution::Value)
                .on_failure(Resolution::Error);
            let _ = source
                .register_with(forward, Some(child.clone()))
                .expect("promise returned from a reaction already had reactions registered");
        }
    }
}
