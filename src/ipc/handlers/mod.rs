pub mod backup_exchange;
pub mod batches;
pub mod core;
pub mod courses;
pub mod schedule_form;
pub mod schedules;
pub mod setup;
pub mod trainers;
pub mod upstream;
