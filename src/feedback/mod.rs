//! Operator feedback while an agent session is running.
//!
//! | Module      | Role                                                    |
//! |-------------|---------------------------------------------------------|
//! | `collector` | Splits raw input into blank-line-terminated blocks      |
//! | `mode`      | Holds progress output back while feedback is in flight  |
//! | `sequencer` | Submits blocks one at a time, in order                  |
//! | `submit`    | Submit targets: injected handlers and subprocesses      |
//! | `session`   | Binds the three together for one command                |

pub mod collector;
pub mod mode;
pub mod sequencer;
pub mod session;
pub mod submit;

pub use collector::{FeedbackBlock, LineBlockCollector};
pub use mode::{FeedbackMode, RedisplayCallback, prompt_redisplay};
pub use sequencer::{
    IdleNotifier, SequencerOptions, SequencerState, Submission, SubmissionOutcome,
    SubmissionSequencer,
};
pub use session::{FeedbackSession, FeedbackSummary, spawn_stdin_reader};
pub use submit::{FileAppendHandler, SubmitHandler, SubmitTarget, SubprocessCommand};
