//! Background tasks for the processing stage.
//!
//! Intake and trigger evaluation are concurrent activities sharing the
//! window store; drained batches travel over a bounded queue to the
//! classification worker pool so a slow classifier call never stalls the
//! windowing clock.

mod classify;
mod intake;
mod trigger;

pub(in crate::pipeline) use classify::ClassifyPool;
pub(in crate::pipeline) use intake::Intake;
pub(in crate::pipeline) use trigger::Trigger;
