//! Small collection types shared by the consensus engines

mod bag;
mod bitset;
mod unique_bag;

pub use bag::Bag;
pub use bitset::BitSet64;
pub use unique_bag::UniqueBag;
