//! One-shot tasks
//!
//! Tasks do not go through a lifecycle state machine. Each run gets a
//! [`TaskRunner`] that schedules start and stop jobs and follows the
//! task's stored state until it is terminal.

mod engine;
mod job;
mod runner;

pub use engine::TaskEngine;
pub use job::{
    BooleanResponseCombiner, Job, JobCompletionCallback, JobContext, JobExecutionResult,
    JobExecutor, JobTopology, JobTopologyBuilder, ResponseCombiner, TokioJobExecutor,
};
pub use runner::{TaskJobFactory, TaskRunner};
