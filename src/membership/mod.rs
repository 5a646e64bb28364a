//! Local membership view: members, their terms and status, and the
//! suspicion timing that drives ALIVE -> SUSPECT -> removed.
pub mod event;
pub mod list;
pub mod math;
pub mod member;
pub mod member_id;
pub mod term;

pub use event::{MembershipEvent, MembershipEventType};
pub use list::{MembershipCursor, MembershipList, MembershipListener};
pub use member::{Member, MemberRecord, MembershipStatus};
pub use member_id::MemberId;
pub use term::GossipTerm;
