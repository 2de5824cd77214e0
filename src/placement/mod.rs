//! Electrode and pad placement on the head surface.
//!
//! This module produces what the external placement tool needs: the pad
//! frame, the electrode centres and footprints, and the pad outline. It
//! also derives the extrusion directions of the mounted electrodes.

mod electrode;
mod extrusion;
mod frame;
pub mod outline;

pub use electrode::{anchor_layout, final_layout, ElectrodeShape, ElectrodeSpec, PAD_CHANNEL};
pub use extrusion::{electrode_normal, Extrusion};
pub use frame::{ElectrodeFrame, LocateFrame};
pub use outline::{normalize_outline, OutlineSource, PointListOutline, StaticOutline};

#[cfg(test)]
pub(crate) use frame::tests::cube_surface;
