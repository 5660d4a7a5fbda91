//! Business logic services for the Microgreens Farm Operations server

pub mod activity;
pub mod consumable;
pub mod crop;
pub mod crop_events;
pub mod crop_plan;
pub mod crop_tasks;
pub mod order;
pub mod product_inventory;
pub mod recipe;
pub mod reporting;
pub mod reservation;

pub use activity::ActivityService;
pub use consumable::ConsumableService;
pub use crop::CropService;
pub use crop_plan::CropPlanService;
pub use crop_tasks::CropTaskService;
pub use order::OrderService;
pub use product_inventory::ProductInventoryService;
pub use recipe::RecipeService;
pub use reporting::ReportingService;
pub use reservation::ReservationService;
