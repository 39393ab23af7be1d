pub mod error;
pub mod event;
pub mod traits;
pub mod types;

pub use error::LastSeenError;
pub use event::{ActivityEvent, HistoryCursor, HistoryPage};
pub use traits::{EventSource, MemberDirectory, SourceError};
pub use types::{from_millis, to_millis, ChannelId, CommunityId, MemberId, MemberInfo};
