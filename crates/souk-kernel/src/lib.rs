//! Pure dialogue logic: structured-output parsing, entity resolution, the
//! bounded self-correcting generation loop, and turn routing. No I/O lives
//! here; everything is deterministic given its inputs.

pub mod correction;
pub mod extract;
pub mod prompts;
pub mod replies;
pub mod resolve;
pub mod routing;

pub use correction::{run_bounded, CorrectionStep, LoopOutcome, TerminalFailure, Verdict};
pub use extract::{extract_field, FieldKey, ParsedValue};
pub use resolve::{resolve, ResolvedMatch};
pub use routing::{route_turn, Route};
