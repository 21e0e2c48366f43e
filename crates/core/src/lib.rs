pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod wire;

pub use domain::client::{Client, ClientId};
pub use domain::project::{Project, ProjectId, ProjectSummary};
pub use domain::time_entry::{
    CreateTimeEntryCommand, TimeEntry, TimeEntryFilter, UpdateTimeEntryCommand, UserId,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
