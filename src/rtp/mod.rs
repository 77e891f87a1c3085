pub mod buffer;
pub mod error;
pub mod jitter;
pub mod multi;
pub mod packet;
pub mod receiver;
pub mod sequence;

pub use buffer::JitterBuffer;
pub use error::JitterError;
pub use jitter::{Admission, BufferState, JitterConfig, JitterStats};
pub use multi::{MultiWaitGroup, MAX_MULTI_WAIT};
pub use packet::{MediaPacket, Sequenced};
pub use receiver::RtpReceiver;
pub use sequence::SequenceTracker;
