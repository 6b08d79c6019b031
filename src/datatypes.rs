use serde::{Deserialize, Serialize};

use crate::error::BeamSolverError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub vertex: Vertex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub nodes: [usize; 3],
}

/// A triangulated rectangle with its two load-bearing boundaries tagged.
///
/// The "left" node set always sits at the minimum X coordinate and the
/// "right" set at the maximum X coordinate. `right_segments` lists the
/// boundary edges of the right side as node index pairs so tractions can
/// be integrated over the edge's length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub nodes: Vec<Node>,
    pub elements: Vec<Element>,
    pub left_nodes: Vec<usize>,
    pub right_nodes: Vec<usize>,
    pub right_segments: Vec<[usize; 2]>,
}

impl Mesh {
    /// Total length of the right boundary edge.
    pub fn right_edge_length(&self) -> f64 {
        self.right_segments
            .iter()
            .map(|seg| {
                let a = &self.nodes[seg[0]].vertex;
                let b = &self.nodes[seg[1]].vertex;
                f64::sqrt(f64::powi(b.x - a.x, 2) + f64::powi(b.y - a.y, 2))
            })
            .sum()
    }
}

/// User-configurable beam dimensions in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamParameters {
    pub length: f64,
    pub width: f64,
}

impl Default for BeamParameters {
    fn default() -> Self {
        BeamParameters {
            length: 5.0,
            width: 3.0,
        }
    }
}

impl BeamParameters {
    /// Parses raw input-field text into validated beam dimensions.
    ///
    /// # Arguments
    /// * `length` - The raw length field text
    /// * `width` - The raw width field text
    ///
    /// # Returns
    /// Validated parameters, or an Input error describing the offending field
    pub fn parse(length: &str, width: &str) -> Result<BeamParameters, BeamSolverError> {
        let length: f64 = length.trim().parse().map_err(|_| {
            BeamSolverError::Input(format!("length is not a number: '{}'", length.trim()))
        })?;
        let width: f64 = width.trim().parse().map_err(|_| {
            BeamSolverError::Input(format!("width is not a number: '{}'", width.trim()))
        })?;

        let params = BeamParameters { length, width };
        params.validate()?;

        Ok(params)
    }

    /// Checks that both dimensions are positive and finite.
    pub fn validate(&self) -> Result<(), BeamSolverError> {
        if !self.length.is_finite() || self.length <= 0.0 {
            return Err(BeamSolverError::Input(format!(
                "length must be positive and finite, got {}",
                self.length
            )));
        }
        if !self.width.is_finite() || self.width <= 0.0 {
            return Err(BeamSolverError::Input(format!(
                "width must be positive and finite, got {}",
                self.width
            )));
        }

        Ok(())
    }
}

/// Linear elastic material constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialModel {
    pub youngs_modulus: f64,
    pub poisson_ratio: f64,
}

impl MaterialModel {
    /// The fixed structural steel model used for every solve.
    pub fn structural_steel() -> MaterialModel {
        MaterialModel {
            youngs_modulus: 210e9,
            poisson_ratio: 0.3,
        }
    }

    /// Shear modulus mu = E / (2 (1 + nu))
    pub fn shear_modulus(&self) -> f64 {
        self.youngs_modulus / (2.0 * (1.0 + self.poisson_ratio))
    }

    /// First Lame parameter lambda = E nu / ((1 + nu)(1 - 2 nu))
    pub fn lame_lambda(&self) -> f64 {
        self.youngs_modulus * self.poisson_ratio
            / ((1.0 + self.poisson_ratio) * (1.0 - 2.0 * self.poisson_ratio))
    }
}

/// Everything one solve produces: the mesh it ran on, a per-node
/// deformation field (zero-extended to three components for the viewer),
/// and a per-element von Mises stress field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResult {
    pub mesh: Mesh,
    pub deformation: Vec<[f64; 3]>,
    pub von_mises: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn parse_accepts_valid_dimensions() {
        let params = BeamParameters::parse("5", "3").unwrap();
        assert_relative_eq!(params.length, 5.0);
        assert_relative_eq!(params.width, 3.0);
    }

    #[test]
    fn parse_accepts_padded_decimal_input() {
        let params = BeamParameters::parse(" 2.5 ", "0.75").unwrap();
        assert_relative_eq!(params.length, 2.5);
        assert_relative_eq!(params.width, 0.75);
    }

    #[test]
    fn parse_rejects_non_numeric_input() {
        assert!(matches!(
            BeamParameters::parse("five", "3"),
            Err(BeamSolverError::Input(_))
        ));
        assert!(matches!(
            BeamParameters::parse("5", ""),
            Err(BeamSolverError::Input(_))
        ));
    }

    #[test]
    fn validate_rejects_degenerate_dimensions() {
        for (length, width) in [(0.0, 3.0), (-1.0, 3.0), (5.0, 0.0), (5.0, -1.0)] {
            let params = BeamParameters { length, width };
            assert!(matches!(
                params.validate(),
                Err(BeamSolverError::Input(_))
            ));
        }
    }

    #[test]
    fn validate_rejects_non_finite_dimensions() {
        for (length, width) in [
            (f64::NAN, 3.0),
            (f64::INFINITY, 3.0),
            (5.0, f64::NAN),
            (5.0, f64::NEG_INFINITY),
        ] {
            let params = BeamParameters { length, width };
            assert!(params.validate().is_err());
        }
    }

    #[test]
    fn material_derives_lame_parameters() {
        let material = MaterialModel::structural_steel();

        // mu = 210e9 / 2.6, lambda = 210e9 * 0.3 / (1.3 * 0.4)
        assert_relative_eq!(material.shear_modulus(), 8.076923076923077e10, max_relative = 1e-12);
        assert_relative_eq!(material.lame_lambda(), 1.2115384615384615e11, max_relative = 1e-12);
    }
}
