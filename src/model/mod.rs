//! Entity model: studies, rounds, members and lifecycle stages.
//!
//! Plain value types with their own invariants. Nothing here touches
//! storage, the cache or the bus; the state machine and the façade drive
//! these types through their mutation methods.

mod aggregate;
mod member;
mod round;
mod stage;
mod study;

pub use aggregate::Aggregate;
pub use member::Member;
pub use round::Round;
pub use stage::Stage;
pub use study::Study;
