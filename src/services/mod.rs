// Service exports
pub mod collaborators;
pub mod memory;
pub mod notifier;
pub mod postgres;
pub mod scheduler;
pub mod store;

pub use collaborators::{CollaboratorError, HttpCollaborators, PaymentService, VerificationService};
pub use memory::MemoryStore;
pub use notifier::{LogNotifier, NotificationDispatcher, Notifier};
pub use postgres::PostgresStore;
pub use scheduler::{spawn_matching_loop, spawn_sweep_loop};
pub use store::{EntryStore, StoreError};
