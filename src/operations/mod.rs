mod align;
mod compact;
mod diagonals;
mod join;
mod retag;

pub use align::{AlignInterface, DEFAULT_ALIGN_DECIMALS, DEFAULT_ALIGN_TOLERANCE};
pub use compact::RemoveDisconnectedNodes;
pub(crate) use compact::compact_in_place;
pub use diagonals::{peripheral_anchors, Diagonal, FindDiagonals};
pub use join::{JoinAndConnect, DEFAULT_JOIN_EPSILON};
pub use retag::{compact_bone_back, compact_bone_to_skin, retag_all, swap_skin_and_bone, Retag};
