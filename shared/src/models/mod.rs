//! Domain models for microgreens farm operations

mod consumable;
mod crop;
mod crop_plan;
mod lookup;
mod order;
mod product_inventory;
mod recipe;
mod reference;
mod reservation;
mod units;

pub use consumable::*;
pub use crop::*;
pub use crop_plan::*;
pub use lookup::*;
pub use order::*;
pub use product_inventory::*;
pub use recipe::*;
pub use reference::*;
pub use reservation::*;
pub use units::*;
