pub mod attempt;
pub mod contest;
pub mod contest_event;
pub mod participant_ids;
pub mod person;
pub mod record;
pub mod result;
pub mod round;

pub use attempt::Attempt;
pub use contest::{Contest, ContestState, ContestType};
pub use contest_event::{ContestEvent, EventDefinition};
pub use participant_ids::ParticipantIds;
pub use person::Person;
pub use record::{RecordCategory, RecordPair, RecordSnapshot, RecordType};
pub use result::ContestResult;
pub use round::{ProceedRule, ProceedType, Round, RoundFormat, RoundType};
