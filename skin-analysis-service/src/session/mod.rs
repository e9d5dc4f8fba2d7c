//! Upload sessions: one per client screen.

pub mod state;
pub mod store;

pub use state::{
    AnalysisSession, AnalysisTicket, SessionError, SessionView, UploadRejection,
    ANALYSIS_FAILED_MESSAGE, INVALID_FILE_TYPE_MESSAGE,
};
pub use store::{AnalysisOutcome, SessionEntry, SessionStore};
