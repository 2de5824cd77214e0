//! Input contract of the external FEM solver.
//!
//! A [`SolverRequest`] can only be built from inputs the solver accepts:
//! one current per electrode surface, currents summing to zero and a
//! conductivity for every volume tag in the mesh.

use std::collections::BTreeMap;

use crate::config::ConductivityConfig;
use crate::error::{Result, SolverError};
use crate::mesh::tags::{electrode_rubber, electrode_volume, Tissue, ELECTRODE_RUBBER};
use crate::mesh::TaggedMesh;

/// Largest accepted absolute sum of the electrode currents.
pub const CURRENT_SUM_TOLERANCE: f64 = 1e-8;

/// Volume tag to conductivity (S/m).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConductivityMap {
    values: BTreeMap<i32, f64>,
}

impl ConductivityMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Conductivities for the assembled head in solver tags.
    ///
    /// Skin and compact bone have swapped tags by then: tag 5 is compact
    /// bone and tag 7 is skin. Channels `1..=electrodes` get the electrode
    /// value on `500 + c` and the rubber value on `100 + c`; the isolation
    /// pad (tag 100) is rubber as well.
    #[must_use]
    pub fn for_solver(conductivity: &ConductivityConfig, electrodes: usize) -> Self {
        let mut map = Self::new();
        for tissue in Tissue::ALL {
            map.insert(tissue.volume_tag(), conductivity.tissue(tissue));
        }
        map.insert(Tissue::Skin.volume_tag(), conductivity.compact_bone);
        map.insert(Tissue::CompactBone.volume_tag(), conductivity.skin);

        map.insert(ELECTRODE_RUBBER, conductivity.electrode_rubber);
        for c in 1..=electrodes {
            map.insert(electrode_volume(c), conductivity.electrode);
            map.insert(electrode_rubber(c), conductivity.electrode_rubber);
        }
        map
    }

    pub fn insert(&mut self, tag: i32, value: f64) {
        self.values.insert(tag, value);
    }

    #[must_use]
    pub fn get(&self, tag: i32) -> Option<f64> {
        self.values.get(&tag).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.values.iter().map(|(&t, &v)| (t, v))
    }

    /// Conductivity of every tetrahedron, in element order.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::MissingConductivity`] for the first volume tag
    /// without a value.
    pub fn volume_conductivities(&self, mesh: &TaggedMesh) -> Result<Vec<f64>> {
        mesh.tetrahedra()
            .iter()
            .map(|e| {
                self.get(e.tag1)
                    .ok_or_else(|| SolverError::MissingConductivity(e.tag1).into())
            })
            .collect()
    }
}

/// Checks the electrode currents against the electrode surfaces.
///
/// # Errors
///
/// Returns [`SolverError::CurrentCountMismatch`] or
/// [`SolverError::CurrentSumNonZero`].
pub fn validate_currents(currents: &[f64], electrode_surfaces: &[i32]) -> Result<()> {
    if currents.len() != electrode_surfaces.len() {
        return Err(SolverError::CurrentCountMismatch {
            currents: currents.len(),
            electrodes: electrode_surfaces.len(),
        }
        .into());
    }
    let sum: f64 = currents.iter().sum();
    if sum.abs() > CURRENT_SUM_TOLERANCE || sum.is_nan() {
        return Err(SolverError::CurrentSumNonZero { sum }.into());
    }
    Ok(())
}

/// Validated input of one solver run.
#[derive(Debug, Clone)]
pub struct SolverRequest {
    mesh: TaggedMesh,
    conductivities: ConductivityMap,
    electrode_surfaces: Vec<i32>,
    currents: Vec<f64>,
    fields: String,
}

impl SolverRequest {
    /// Builds a request after checking the input contract.
    ///
    /// The first surface is the reference electrode; `currents[i]` is
    /// injected on `electrode_surfaces[i]`.
    ///
    /// # Errors
    ///
    /// Returns a [`SolverError`] if the currents do not match the surfaces,
    /// do not sum to zero, or a volume tag has no conductivity.
    pub fn new(
        mesh: TaggedMesh,
        conductivities: ConductivityMap,
        electrode_surfaces: Vec<i32>,
        currents: Vec<f64>,
    ) -> Result<Self> {
        validate_currents(&currents, &electrode_surfaces)?;
        conductivities.volume_conductivities(&mesh)?;
        Ok(Self {
            mesh,
            conductivities,
            electrode_surfaces,
            currents,
            fields: "v".to_owned(),
        })
    }

    /// Sets the fields the solver should derive from the potential.
    #[must_use]
    pub fn with_fields(mut self, fields: impl Into<String>) -> Self {
        self.fields = fields.into();
        self
    }

    #[must_use]
    pub fn mesh(&self) -> &TaggedMesh {
        &self.mesh
    }

    #[must_use]
    pub fn conductivities(&self) -> &ConductivityMap {
        &self.conductivities
    }

    #[must_use]
    pub fn electrode_surfaces(&self) -> &[i32] {
        &self.electrode_surfaces
    }

    #[must_use]
    pub fn currents(&self) -> &[f64] {
        &self.currents
    }

    #[must_use]
    pub fn fields(&self) -> &str {
        &self.fields
    }
}

/// Scalar potential (V) at every node of the solved mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct PotentialField {
    values: Vec<f64>,
}

impl PotentialField {
    /// Wraps solver output for `mesh`.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::FieldSize`] if there is not one value per node.
    pub fn new(mesh: &TaggedMesh, values: Vec<f64>) -> Result<Self> {
        if values.len() != mesh.node_count() {
            return Err(SolverError::FieldSize {
                expected: mesh.node_count(),
                got: values.len(),
            }
            .into());
        }
        Ok(Self { values })
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Smallest and largest value, `None` for an empty field.
    #[must_use]
    pub fn range(&self) -> Option<(f64, f64)> {
        self.values.iter().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::PlannerError;
    use crate::mesh::tests::two_tets;

    fn request(currents: Vec<f64>) -> Result<SolverRequest> {
        let conductivities = ConductivityMap::for_solver(&ConductivityConfig::default(), 3);
        SolverRequest::new(two_tets(5, 7), conductivities, vec![2101, 2102, 2103], currents)
    }

    #[test]
    fn balanced_currents_are_accepted() {
        let req = request(vec![0.001, -0.0005, -0.0005]).unwrap();
        assert_eq!(req.currents().len(), 3);
        assert_eq!(req.electrode_surfaces(), &[2101, 2102, 2103]);
    }

    #[test]
    fn unbalanced_currents_are_rejected() {
        let err = request(vec![0.001, -0.0004, -0.0005]).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::Solver(SolverError::CurrentSumNonZero { .. })
        ));
    }

    #[test]
    fn current_count_must_match_surfaces() {
        let err = request(vec![0.001, -0.001]).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::Solver(SolverError::CurrentCountMismatch {
                currents: 2,
                electrodes: 3
            })
        ));
    }

    #[test]
    fn default_currents_balance() {
        let currents = crate::config::ElectrodeConfig::default().currents;
        validate_currents(&currents, &[2101, 2102, 2103, 2104, 2105]).unwrap();
    }

    #[test]
    fn solver_tags_follow_the_swap() {
        let config = ConductivityConfig::default();
        let map = ConductivityMap::for_solver(&config, 5);
        assert_eq!(map.get(5), Some(config.compact_bone));
        assert_eq!(map.get(7), Some(config.skin));
        assert_eq!(map.get(2), Some(config.grey_matter));
        assert_eq!(map.get(100), Some(config.electrode_rubber));
        assert_eq!(map.get(105), Some(config.electrode_rubber));
        assert_eq!(map.get(501), Some(config.electrode));
        assert_eq!(map.get(505), Some(config.electrode));
        assert_eq!(map.get(506), None);
    }

    #[test]
    fn missing_conductivity_is_rejected() {
        let map = ConductivityMap::for_solver(&ConductivityConfig::default(), 1);
        let err = map.volume_conductivities(&two_tets(5, 506)).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::Solver(SolverError::MissingConductivity(506))
        ));
        assert_eq!(map.volume_conductivities(&two_tets(5, 7)).unwrap().len(), 2);
    }

    #[test]
    fn field_size_is_checked() {
        let mesh = two_tets(5, 7);
        assert!(PotentialField::new(&mesh, vec![0.0; 4]).is_err());
        let field = PotentialField::new(&mesh, vec![0.5, -1.0, 0.0, 2.0, 1.0]).unwrap();
        assert_eq!(field.range(), Some((-1.0, 2.0)));
    }
}
