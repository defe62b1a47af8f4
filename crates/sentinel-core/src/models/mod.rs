pub mod breakglass;
pub mod credentials;
pub mod decision;
pub mod request;
pub mod session;

pub use breakglass::{BreakGlassEvent, BreakGlassStatus, ReasonCode};
pub use credentials::{CredentialProcessOutput, Credentials};
pub use decision::{Decision, Effect, EvalMode};
pub use request::{ApprovalRequest, RequestStatus};
pub use session::{ServerSession, SessionStatus};
