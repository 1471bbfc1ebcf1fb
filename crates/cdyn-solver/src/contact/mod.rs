//! Mortar contact with Lagrange multipliers and a primal-dual active set.

pub mod active_set;
pub mod interface;
pub mod manager;

pub use active_set::{ActiveSet, ActiveSetHistory, ActiveSetUpdate};
pub use interface::{ContactInterfaceDefinition, MortarOperators, Projection, SlaveGeometry};
pub use manager::{ContactConstraintManager, ContactPair, NodalQuantity, Slot};
