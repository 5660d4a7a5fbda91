//! HTTP handlers for the Microgreens Farm Operations API

mod activity;
mod consumable;
mod crop;
mod crop_plan;
mod health;
mod lookup;
mod order;
mod product_inventory;
mod recipe;
mod reporting;
mod reservation;

pub use activity::*;
pub use consumable::*;
pub use crop::*;
pub use crop_plan::*;
pub use health::*;
pub use lookup::*;
pub use order::*;
pub use product_inventory::*;
pub use recipe::*;
pub use reporting::*;
pub use reservation::*;
