//! Background services.

pub mod abandoned_job_sweeper;

pub use abandoned_job_sweeper::AbandonedJobSweeper;
