mod dict;
mod sequence;

pub use dict::DictState;
pub use sequence::SequenceState;
