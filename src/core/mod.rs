//! Domain types: orders, shelves, temperatures, wall-clock access.

pub mod order;
pub mod shelf;
pub mod temperature;
pub mod time;

pub use order::{Order, OrderState};
pub use shelf::Shelf;
pub use temperature::Temperature;
