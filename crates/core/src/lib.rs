pub mod feedback;
pub mod field;
pub mod record;

pub use feedback::{accuracy_of, FeedbackRecord, FieldAccuracy};
pub use field::{Direction, FieldKind, ParseError};
pub use record::{parse_amount, RawExtraction, ReconciledRecord};
