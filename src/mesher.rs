use log::info;

use crate::{
    datatypes::{BeamParameters, Element, Mesh, Node, Vertex},
    error::BeamSolverError,
};

/// Target element size as a fraction of the smaller beam dimension.
pub const TARGET_ELEMENT_FACTOR: f64 = 0.2;

/// Upper bound on generated elements. Extreme aspect ratios would
/// otherwise blow the grid up before the solver ever sees it.
pub const MAX_ELEMENTS: usize = 200_000;

/// Computes the number of grid divisions along one axis
///
/// # Arguments
/// * `dimension` - The beam dimension along this axis
/// * `target_size` - The target element edge length
///
/// # Returns
/// The division count, at least 1
fn divisions(dimension: f64, target_size: f64) -> usize {
    usize::max((dimension / target_size).ceil() as usize, 1)
}

/// Builds the node grid for a rectangle
///
/// Nodes are laid out row-major, bottom row first, so the node at grid
/// position (i, j) has index `j * (nx + 1) + i`.
fn build_nodes(length: f64, width: f64, nx: usize, ny: usize) -> Vec<Node> {
    let mut nodes: Vec<Node> = Vec::with_capacity((nx + 1) * (ny + 1));

    for j in 0..=ny {
        for i in 0..=nx {
            nodes.push(Node {
                vertex: Vertex {
                    x: length * (i as f64) / (nx as f64),
                    y: width * (j as f64) / (ny as f64),
                },
            });
        }
    }

    nodes
}

/// Splits every grid cell into two counter-clockwise triangles
fn build_elements(nx: usize, ny: usize) -> Vec<Element> {
    let mut elements: Vec<Element> = Vec::with_capacity(2 * nx * ny);
    let stride = nx + 1;

    for j in 0..ny {
        for i in 0..nx {
            let n00 = j * stride + i;
            let n10 = j * stride + i + 1;
            let n01 = (j + 1) * stride + i;
            let n11 = (j + 1) * stride + i + 1;

            elements.push(Element {
                nodes: [n00, n10, n11],
            });
            elements.push(Element {
                nodes: [n00, n11, n01],
            });
        }
    }

    elements
}

/// Runs the mesher
///
/// Triangulates the rectangle [0, length] x [0, width] on a structured
/// grid with a target element size of 0.2 x min(length, width), and tags
/// the minimum-X boundary as "left" and the maximum-X boundary as
/// "right". Meshing is deterministic for valid input.
///
/// # Arguments
/// * `params` - Validated beam dimensions
///
/// # Returns
/// The generated mesh, or a Mesher error for degenerate geometry
pub fn run(params: &BeamParameters) -> Result<Mesh, BeamSolverError> {
    if let Err(err) = params.validate() {
        return Err(BeamSolverError::Mesher(format!(
            "degenerate geometry: {err}"
        )));
    }

    let target_size = TARGET_ELEMENT_FACTOR * f64::min(params.length, params.width);
    let nx = divisions(params.length, target_size);
    let ny = divisions(params.width, target_size);

    if 2 * nx * ny > MAX_ELEMENTS {
        return Err(BeamSolverError::Mesher(format!(
            "aspect ratio too extreme: {} elements exceeds the {} element budget",
            2 * nx * ny,
            MAX_ELEMENTS
        )));
    }

    let nodes = build_nodes(params.length, params.width, nx, ny);
    let elements = build_elements(nx, ny);

    let stride = nx + 1;
    let left_nodes: Vec<usize> = (0..=ny).map(|j| j * stride).collect();
    let right_nodes: Vec<usize> = (0..=ny).map(|j| j * stride + nx).collect();
    let right_segments: Vec<[usize; 2]> = (0..ny)
        .map(|j| [j * stride + nx, (j + 1) * stride + nx])
        .collect();

    info!(
        "meshed {}x{} beam into {} nodes and {} elements (target size {:.3})",
        params.length,
        params.width,
        nodes.len(),
        elements.len(),
        target_size
    );

    Ok(Mesh {
        nodes,
        elements,
        left_nodes,
        right_nodes,
        right_segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_beam_matches_target_element_size() {
        // 5 x 3 beam: target size 0.2 * 3 = 0.6, so 9 x 5 cells
        let mesh = run(&BeamParameters::default()).unwrap();

        assert_eq!(mesh.nodes.len(), 10 * 6);
        assert_eq!(mesh.elements.len(), 2 * 9 * 5);
    }

    #[test]
    fn right_nodes_lie_strictly_right_of_left_nodes() {
        for (length, width) in [(5.0, 3.0), (3.0, 5.0), (0.5, 0.5), (100.0, 1.0)] {
            let mesh = run(&BeamParameters { length, width }).unwrap();

            let max_left = mesh
                .left_nodes
                .iter()
                .map(|&i| mesh.nodes[i].vertex.x)
                .fold(f64::MIN, f64::max);
            let min_right = mesh
                .right_nodes
                .iter()
                .map(|&i| mesh.nodes[i].vertex.x)
                .fold(f64::MAX, f64::min);

            assert!(
                max_left < min_right,
                "left/right boundary ordering violated for {length}x{width}"
            );
        }
    }

    #[test]
    fn right_edge_spans_the_full_width() {
        let mesh = run(&BeamParameters::default()).unwrap();

        assert_relative_eq!(mesh.right_edge_length(), 3.0, max_relative = 1e-12);
        for seg in &mesh.right_segments {
            assert_relative_eq!(mesh.nodes[seg[0]].vertex.x, 5.0);
            assert_relative_eq!(mesh.nodes[seg[1]].vertex.x, 5.0);
        }
    }

    #[test]
    fn element_winding_is_counter_clockwise() {
        let mesh = run(&BeamParameters::default()).unwrap();

        for element in &mesh.elements {
            let v0 = &mesh.nodes[element.nodes[0]].vertex;
            let v1 = &mesh.nodes[element.nodes[1]].vertex;
            let v2 = &mesh.nodes[element.nodes[2]].vertex;

            let doubled_area =
                v0.x * (v1.y - v2.y) + v1.x * (v2.y - v0.y) + v2.x * (v0.y - v1.y);
            assert!(doubled_area > 0.0, "clockwise element {:?}", element.nodes);
        }
    }

    #[test]
    fn meshing_is_deterministic() {
        let params = BeamParameters {
            length: 7.3,
            width: 2.1,
        };

        assert_eq!(run(&params).unwrap(), run(&params).unwrap());
    }

    #[test]
    fn degenerate_geometry_is_a_mesher_error() {
        let params = BeamParameters {
            length: 0.0,
            width: 3.0,
        };

        assert!(matches!(run(&params), Err(BeamSolverError::Mesher(_))));
    }

    #[test]
    fn extreme_aspect_ratio_is_a_mesher_error() {
        let params = BeamParameters {
            length: 1e6,
            width: 1.0,
        };

        assert!(matches!(run(&params), Err(BeamSolverError::Mesher(_))));
    }
}
