//! Tag namespace shared with the segmentation, the electrode placement tool
//! and the solver.
//!
//! The table is the source of truth: surface tags are listed explicitly rather
//! than derived from the volume tag.

/// Head tissues and their volume/surface tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tissue {
    WhiteMatter,
    GreyMatter,
    Csf,
    Skin,
    Eyeballs,
    CompactBone,
    SpongyBone,
    Blood,
    Muscle,
}

impl Tissue {
    pub const ALL: [Self; 9] = [
        Self::WhiteMatter,
        Self::GreyMatter,
        Self::Csf,
        Self::Skin,
        Self::Eyeballs,
        Self::CompactBone,
        Self::SpongyBone,
        Self::Blood,
        Self::Muscle,
    ];

    /// Volume (tetrahedron) tag.
    #[must_use]
    pub fn volume_tag(self) -> i32 {
        match self {
            Self::WhiteMatter => 1,
            Self::GreyMatter => 2,
            Self::Csf => 3,
            Self::Skin => 5,
            Self::Eyeballs => 6,
            Self::CompactBone => 7,
            Self::SpongyBone => 8,
            Self::Blood => 9,
            Self::Muscle => 10,
        }
    }

    /// Surface (triangle) tag.
    #[must_use]
    pub fn surface_tag(self) -> i32 {
        match self {
            Self::WhiteMatter => 1001,
            Self::GreyMatter => 1002,
            Self::Csf => 1003,
            Self::Skin => 1005,
            Self::Eyeballs => 1006,
            Self::CompactBone => 1007,
            Self::SpongyBone => 1008,
            Self::Blood => 1009,
            Self::Muscle => 1010,
        }
    }

    /// Tissue owning a volume tag.
    #[must_use]
    pub fn from_volume_tag(tag: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.volume_tag() == tag)
    }
}

/// Highest electrode channel the tag ranges accommodate; channel 6 is the pad.
pub const MAX_ELECTRODES: usize = 5;

/// Isolation pad volume.
pub const ISOLATION_VOLUME: i32 = 506;
/// Isolation pad outer surface.
pub const ISOLATION_SURFACE: i32 = 1506;
/// Isolation pad contact surface.
pub const ISOLATION_CONTACT: i32 = 2106;

/// Base electrode rubber tag; the isolation is retagged to it for the solver.
pub const ELECTRODE_RUBBER: i32 = 100;

/// Unused volume tag, used as a parking slot while swapping two tags.
pub const SCRATCH_VOLUME: i32 = 4;
/// Unused surface tag, used for parking and for throw-away boundary surfaces.
pub const SCRATCH_SURFACE: i32 = 1004;

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn channel_tag(base: i32, channel: usize) -> i32 {
    base + channel as i32
}

/// Conductor volume of electrode channel `channel` (1-based).
#[must_use]
pub fn electrode_volume(channel: usize) -> i32 {
    channel_tag(500, channel)
}

/// Outer surface of electrode channel `channel`.
#[must_use]
pub fn electrode_surface(channel: usize) -> i32 {
    channel_tag(1500, channel)
}

/// Contact surface of electrode channel `channel`; currents are injected here.
#[must_use]
pub fn electrode_contact(channel: usize) -> i32 {
    channel_tag(2100, channel)
}

/// Rubber volume of electrode channel `channel`.
#[must_use]
pub fn electrode_rubber(channel: usize) -> i32 {
    channel_tag(ELECTRODE_RUBBER, channel)
}

/// All volume, surface and contact tags of channels `1..=count`.
#[must_use]
pub fn electrode_tags(count: usize) -> Vec<i32> {
    let channels = 1..=count;
    channels
        .clone()
        .map(electrode_volume)
        .chain(channels.clone().map(electrode_surface))
        .chain(channels.map(electrode_contact))
        .collect()
}

/// Tissue/device pairs whose shared-node counts are reported after assembly.
#[must_use]
pub fn interface_pairs(electrodes: usize) -> Vec<(i32, i32, String)> {
    let skin = Tissue::Skin.volume_tag();
    let bone = Tissue::CompactBone.volume_tag();
    let mut pairs = vec![
        (skin, bone, "skin_skull".to_owned()),
        (skin, Tissue::Csf.volume_tag(), "skin_csf".to_owned()),
        (skin, Tissue::Eyeballs.volume_tag(), "skin_eyes".to_owned()),
        (skin, ISOLATION_VOLUME, "skin_iso".to_owned()),
        (ISOLATION_VOLUME, bone, "iso_skull".to_owned()),
    ];
    for c in 1..=electrodes {
        pairs.push((ISOLATION_VOLUME, electrode_volume(c), format!("iso_elec{c}")));
    }
    for c in 1..=electrodes {
        pairs.push((electrode_volume(c), bone, format!("skull_elec{c}")));
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tissue_table_round_trips() {
        for t in Tissue::ALL {
            assert_eq!(Tissue::from_volume_tag(t.volume_tag()), Some(t));
            assert_eq!(t.surface_tag(), t.volume_tag() + 1000);
        }
        assert_eq!(Tissue::from_volume_tag(4), None);
    }

    #[test]
    fn channel_tags() {
        assert_eq!(electrode_volume(1), 501);
        assert_eq!(electrode_surface(5), 1505);
        assert_eq!(electrode_contact(3), 2103);
        assert_eq!(electrode_rubber(2), 102);
        assert_eq!(
            electrode_tags(2),
            vec![501, 502, 1501, 1502, 2101, 2102]
        );
    }

    #[test]
    fn interface_pairs_cover_every_electrode() {
        let pairs = interface_pairs(5);
        assert_eq!(pairs.len(), 15);
        assert_eq!(pairs[0].2, "skin_skull");
        assert_eq!(pairs[14], (505, 7, "skull_elec5".to_owned()));
    }
}
