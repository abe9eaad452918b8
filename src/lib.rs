pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::auto_placement::{
    AutoPlaceError, AutoPlaceReport, AutoPlaceTicket, AutoPlacementOrchestrator, OverflowEntry,
    OverflowReason,
};
pub use application::commands::AppState;
pub use application::interaction::{
    DragOrigin, DragSession, DropOutcome, DropPreview, InteractionController, InteractionError,
};
pub use application::planners::{HeuristicPlanner, ManualOnlyPlanner};
pub use application::schedule_store::{
    ItemState, PlacementSource, ScheduleError, ScheduleStore, StoreOperation,
};
pub use domain::models::{
    DurationTable, ItemKind, Placement, Policy, Priority, SchedulableItem, TimeWindow, WorkWeek,
};
pub use domain::placement::{can_place, BlackoutRule, PlacementCandidate, PlacementRejection};
pub use domain::time_grid::GridError;
pub use infrastructure::error::InfraError;
pub use infrastructure::planning_client::{PlanningCollaborator, ReqwestPlanningClient};
