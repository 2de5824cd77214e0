use crate::config::{ElectrodeConfig, GeometryConfig};
use crate::math::{Point2, Point3, Vector3};
use crate::mesh::tags::MAX_ELECTRODES;

use super::ElectrodeFrame;

/// Planar footprint of an electrode or pad.
#[derive(Debug, Clone, PartialEq)]
pub enum ElectrodeShape {
    Ellipse,
    Rect,
    /// Polygon in the local `(x, y)` frame, centred on the electrode centre.
    Custom(Vec<Point2>),
}

impl ElectrodeShape {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ellipse => "ellipse",
            Self::Rect => "rect",
            Self::Custom(_) => "custom",
        }
    }
}

/// One electrode (or the isolation pad) as handed to the placement tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectrodeSpec {
    pub name: String,
    /// 1-based channel; selects the 500/1500/2100 tag triple.
    pub channel: usize,
    pub centre: Point3,
    pub shape: ElectrodeShape,
    /// Extent along the local x and y axes; unused for custom shapes.
    pub dimensions: [f64; 2],
    pub thickness: f64,
    /// In-plane y direction; the tool picks one when unset.
    pub y_dir: Option<Vector3>,
}

/// Channel the isolation pad is mounted on in the final layout.
pub const PAD_CHANNEL: usize = MAX_ELECTRODES + 1;

fn pad(frame: &ElectrodeFrame, outline: &[Point2], geometry: &GeometryConfig, channel: usize) -> ElectrodeSpec {
    ElectrodeSpec {
        name: "isolation".to_owned(),
        channel,
        centre: frame.centre,
        shape: ElectrodeShape::Custom(outline.to_vec()),
        dimensions: [0.0, 0.0],
        thickness: geometry.h_silicon,
        y_dir: Some(frame.y_dir),
    }
}

/// Square probe electrode plus pad, whose footprint yields the peripheral
/// anchors.
///
/// The probe sits on channel 1 and the pad on channel 2; both are removed
/// again once the anchors are known.
#[must_use]
pub fn anchor_layout(frame: &ElectrodeFrame, outline: &[Point2], geometry: &GeometryConfig) -> Vec<ElectrodeSpec> {
    vec![
        ElectrodeSpec {
            name: "probe".to_owned(),
            channel: 1,
            centre: frame.centre,
            shape: ElectrodeShape::Rect,
            dimensions: [geometry.d_rect, geometry.d_rect],
            thickness: geometry.h_electrode,
            y_dir: Some(frame.y_dir),
        },
        pad(frame, outline, geometry, 2),
    ]
}

/// Central electrode at the frame centre, peripheral electrodes at the
/// anchors, and the pad on [`PAD_CHANNEL`].
#[must_use]
pub fn final_layout(
    frame: &ElectrodeFrame,
    anchors: &[Point3; 4],
    outline: &[Point2],
    electrodes: &ElectrodeConfig,
    geometry: &GeometryConfig,
) -> Vec<ElectrodeSpec> {
    let centres = std::iter::once(frame.centre).chain(anchors.iter().copied());
    let mut specs: Vec<ElectrodeSpec> = electrodes
        .names
        .iter()
        .zip(centres)
        .enumerate()
        .map(|(i, (name, centre))| {
            let d = if i == 0 {
                geometry.d_center_act
            } else {
                geometry.d_outer_act
            };
            ElectrodeSpec {
                name: name.clone(),
                channel: i + 1,
                centre,
                shape: ElectrodeShape::Ellipse,
                dimensions: [d, d],
                thickness: geometry.h_electrode,
                y_dir: None,
            }
        })
        .collect();
    specs.push(pad(frame, outline, geometry, PAD_CHANNEL));
    specs
}
