use crate::{
    datatypes::{Element, MaterialModel, Mesh, Node, SolveResult},
    error::BeamSolverError,
};
use indicatif::ProgressBar;
use log::info;
use nalgebra::{matrix, DVector, SMatrix};
use nalgebra_sparse::{coo::CooMatrix, csr::CsrMatrix};

use argmin::{
    core::{
        observers::{Observe, ObserverMode},
        ArgminFloat, Error, Executor, Operator, State, KV,
    },
    solver::conjugategradient::ConjugateGradient,
};

pub const DOF: usize = 2;
pub const MAX_CG_ITER: u64 = 1e7 as u64;
pub const TARGET_CG_COST: f64 = 1e-4 as f64;

/// Total magnitude of the downward traction applied over the right edge.
pub const EDGE_LOAD_MAGNITUDE: f64 = 1e5;

/// Runs sparse multiplication for the Conjugate Gradient solver
struct StiffnessOperator<'a> {
    a: &'a CsrMatrix<f64>,
}

impl<'a> Operator for StiffnessOperator<'a> {
    type Param = Vec<f64>;
    type Output = Vec<f64>;

    fn apply(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let mut product = vec![0.0; self.a.nrows()];

        for (row_idx, row) in self.a.row_iter().enumerate() {
            let mut sum = 0.0;
            for (col, value) in row.col_indices().iter().zip(row.values()) {
                sum += value * x[*col];
            }
            product[row_idx] = sum;
        }

        Ok(product)
    }
}

/// Observer bar for the argmin solver
struct CgObserverBar {
    bar: ProgressBar,
}

impl CgObserverBar {
    fn new() -> CgObserverBar {
        CgObserverBar {
            bar: ProgressBar::new_spinner(),
        }
    }

    fn argmin_float_to_f64<F: ArgminFloat>(&self, value: F) -> Option<f64> {
        // TODO: There absolutely should be a way to extract the value
        // from a ArgminFloat instance that doesn't need this
        match format!("{:?}", value).parse() {
            Ok(n) => Some(n),
            Err(_) => None,
        }
    }
}

impl<I> Observe<I> for CgObserverBar
where
    I: State,
{
    fn observe_init(&mut self, _name: &str, _state: &I, _kv: &KV) -> Result<(), Error> {
        Ok(())
    }

    fn observe_iter(&mut self, state: &I, _kv: &KV) -> Result<(), Error> {
        self.bar.inc(1);
        if let Some(cost) = self.argmin_float_to_f64(state.get_cost()) {
            self.bar.set_message(format!("residual: {:.3e}", cost));
        }

        Ok(())
    }

    fn observe_final(&mut self, _state: &I) -> Result<(), Error> {
        self.bar.finish();
        Ok(())
    }
}

/// Solves a system of equations using the conjugate gradient method.
///
/// This function returns an approximation for x in `Ax=b`
///
/// # Arguments
/// * `a` - A square positive definite sparse matrix
/// * `b` - A vector of the solutions to the system
///
/// # Returns
/// A DVector that represents `x` from the system
fn run_conjugate_gradient(
    a: &CsrMatrix<f64>,
    b: &DVector<f64>,
) -> Result<DVector<f64>, BeamSolverError> {
    let b_flat: Vec<f64> = b.iter().map(|f| *f).collect();
    let solver: ConjugateGradient<_, f64> = ConjugateGradient::new(b_flat);
    let initial_guess: Vec<f64> = vec![0.0; b.nrows()];

    let operator = StiffnessOperator { a };
    let observer = CgObserverBar::new();

    // Run solver
    let res = match Executor::new(operator, solver)
        .configure(|state| {
            state
                .param(initial_guess)
                .max_iters(MAX_CG_ITER)
                .target_cost(TARGET_CG_COST)
        })
        .add_observer(observer, ObserverMode::NewBest)
        .run()
    {
        Ok(r) => r,
        Err(err) => {
            return Err(BeamSolverError::Solver(format!(
                "Conjugate Gradient error: {err}"
            )))
        }
    };

    let best_param = match &res.state().best_param {
        Some(vec) => DVector::from_vec(vec.clone()),
        None => {
            return Err(BeamSolverError::Solver(
                "Conjugate Gradient could not produce best parameter".to_owned(),
            ))
        }
    };

    if best_param.iter().any(|u| !u.is_finite()) {
        return Err(BeamSolverError::Solver(
            "non-finite displacement in solution; system is likely singular".to_owned(),
        ));
    }

    Ok(best_param)
}

/// Calculates the area of the element
///
/// # Arguments
/// * `element` - The Element to target
/// * `nodes` - A reference to the vector of nodes
///
/// # Returns
/// The area of the element
pub fn compute_element_area(element: &Element, nodes: &[Node]) -> f64 {
    let v0 = &nodes[element.nodes[0]].vertex;
    let v1 = &nodes[element.nodes[1]].vertex;
    let v2 = &nodes[element.nodes[2]].vertex;

    0.5 * (v0.x * (v1.y - v2.y) + v1.x * (v2.y - v0.y) + v2.x * (v0.y - v1.y))
}

/// Calculates the strain-displacement matrix of the element
///
/// # Arguments
/// * `element` - The Element to target
/// * `nodes` - A reference to the vector of nodes
/// * `element_area` - The area of the element
///
/// # Returns
/// A 3x6 strain-displacement matrix
pub fn compute_strain_displacement_matrix(
    element: &Element,
    nodes: &[Node],
    element_area: f64,
) -> SMatrix<f64, 3, 6> {
    let v0 = &nodes[element.nodes[0]].vertex;
    let v1 = &nodes[element.nodes[1]].vertex;
    let v2 = &nodes[element.nodes[2]].vertex;

    let beta_1 = v1.y - v2.y;
    let beta_2 = v2.y - v0.y;
    let beta_3 = v0.y - v1.y;

    let gamma_1 = v2.x - v1.x;
    let gamma_2 = v0.x - v2.x;
    let gamma_3 = v1.x - v0.x;

    let mut strain_displacement_mat: SMatrix<f64, 3, 6> = matrix![
        beta_1, 0., beta_2, 0., beta_3, 0.;
        0., gamma_1, 0., gamma_2, 0., gamma_3;
        gamma_1, beta_1, gamma_2, beta_2, gamma_3, beta_3;
    ];

    strain_displacement_mat /= 2.0 * element_area;

    strain_displacement_mat
}

/// Calculates the constitutive matrix from the Lame form of the
/// stress-strain relation, sigma = lambda tr(eps) I + 2 mu eps
///
/// # Arguments
/// * `material` - The material model
///
/// # Returns
/// A 3x3 constitutive matrix acting on engineering strain [exx, eyy, gxy]
pub fn compute_constitutive_matrix(material: &MaterialModel) -> SMatrix<f64, 3, 3> {
    let lambda = material.lame_lambda();
    let mu = material.shear_modulus();

    matrix![
        lambda + 2.0 * mu, lambda, 0.0;
        lambda, lambda + 2.0 * mu, 0.0;
        0.0, 0.0, mu;
    ]
}

/// Computes the stiffness matrix for a given element
///
/// # Arguments
/// * `element` - The element to target
/// * `nodes` - A reference to the vector of nodes
/// * `constitutive_mat` - The material constitutive matrix
///
/// # Returns
/// A 6x6 stiffness matrix for the element
fn compute_element_stiffness_matrix(
    element: &Element,
    nodes: &[Node],
    constitutive_mat: &SMatrix<f64, 3, 3>,
) -> SMatrix<f64, 6, 6> {
    let element_area = compute_element_area(element, nodes);
    let strain_displacement_mat = compute_strain_displacement_matrix(element, nodes, element_area);

    (strain_displacement_mat.transpose() * constitutive_mat)
        * strain_displacement_mat
        * element_area
}

/// Compiles element stiffness matrices into the global stiffness matrix
///
/// # Arguments
/// * `mesh` - The mesh to assemble
/// * `material` - The material model
///
/// # Returns
/// The global sparse stiffness matrix in CSR form
fn assemble_stiffness_matrix(mesh: &Mesh, material: &MaterialModel) -> CsrMatrix<f64> {
    let n_dofs = DOF * mesh.nodes.len();
    let mut triplets: CooMatrix<f64> = CooMatrix::new(n_dofs, n_dofs);
    let constitutive_mat = compute_constitutive_matrix(material);

    let bar = ProgressBar::new(mesh.elements.len() as u64);
    for element in &mesh.elements {
        bar.inc(1);

        let stiffness_mat =
            compute_element_stiffness_matrix(element, &mesh.nodes, &constitutive_mat);

        for (local_row, node_row) in element.nodes.iter().enumerate() {
            for (local_col, node_col) in element.nodes.iter().enumerate() {
                let global_row = node_row * DOF;
                let global_col = node_col * DOF;
                let local_row = local_row * DOF;
                let local_col = local_col * DOF;

                // Add RowX ColX
                triplets.push(
                    global_row,
                    global_col,
                    stiffness_mat[(local_row, local_col)],
                );
                // Add RowX ColY
                triplets.push(
                    global_row,
                    global_col + 1,
                    stiffness_mat[(local_row, local_col + 1)],
                );
                // Add RowY ColX
                triplets.push(
                    global_row + 1,
                    global_col,
                    stiffness_mat[(local_row + 1, local_col)],
                );
                // Add RowY ColY
                triplets.push(
                    global_row + 1,
                    global_col + 1,
                    stiffness_mat[(local_row + 1, local_col + 1)],
                );
            }
        }
    }
    bar.finish_with_message("assembled global stiffness matrix");

    CsrMatrix::from(&triplets)
}

/// Builds the nodal load vector from a uniform traction over the right
/// edge. The total force is distributed over the edge's length (traction
/// density = magnitude / edge length, direction (0, -1)), with each
/// boundary segment lumping half its share onto each end node.
///
/// # Arguments
/// * `mesh` - The mesh to load
/// * `magnitude` - The total force magnitude
///
/// # Returns
/// A nodal load vector of size DOF x node count
pub fn assemble_traction_loads(
    mesh: &Mesh,
    magnitude: f64,
) -> Result<DVector<f64>, BeamSolverError> {
    let edge_length = mesh.right_edge_length();

    if mesh.right_segments.is_empty() || edge_length <= 0.0 {
        return Err(BeamSolverError::Solver(
            "right edge has no surface to carry the traction".to_owned(),
        ));
    }

    let density = magnitude / edge_length;
    let mut loads: DVector<f64> = DVector::zeros(DOF * mesh.nodes.len());

    for seg in &mesh.right_segments {
        let a = &mesh.nodes[seg[0]].vertex;
        let b = &mesh.nodes[seg[1]].vertex;
        let seg_length = f64::sqrt(f64::powi(b.x - a.x, 2) + f64::powi(b.y - a.y, 2));

        // direction (0, -1): only the y components pick up load
        loads[seg[0] * DOF + 1] += -density * seg_length / 2.0;
        loads[seg[1] * DOF + 1] += -density * seg_length / 2.0;
    }

    Ok(loads)
}

/// Solves for nodal displacements under a fixed left edge
///
/// Rows and columns belonging to the pinned left-edge nodes are removed,
/// the reduced system is solved with conjugate gradients, and the free
/// solution is scattered back over the full DOF vector with zeros at the
/// pinned entries.
///
/// # Arguments
/// * `mesh` - The mesh being solved
/// * `stiffness` - The global stiffness matrix
/// * `loads` - The nodal load vector
///
/// # Returns
/// The full displacement vector, including the pinned zeros
fn solve_displacements(
    mesh: &Mesh,
    stiffness: &CsrMatrix<f64>,
    loads: &DVector<f64>,
) -> Result<DVector<f64>, BeamSolverError> {
    let n_dofs = DOF * mesh.nodes.len();

    let mut fixed = vec![false; n_dofs];
    for &node in &mesh.left_nodes {
        fixed[node * DOF] = true;
        fixed[node * DOF + 1] = true;
    }

    // Map full DOF indices onto the reduced system
    let mut free_index = vec![usize::MAX; n_dofs];
    let mut n_free = 0;
    for (dof, &is_fixed) in fixed.iter().enumerate() {
        if !is_fixed {
            free_index[dof] = n_free;
            n_free += 1;
        }
    }

    if n_free == 0 {
        return Err(BeamSolverError::Solver(
            "every degree of freedom is constrained".to_owned(),
        ));
    }

    let mut reduced_triplets: CooMatrix<f64> = CooMatrix::new(n_free, n_free);
    for (row, col, value) in stiffness.triplet_iter() {
        if !fixed[row] && !fixed[col] {
            reduced_triplets.push(free_index[row], free_index[col], *value);
        }
    }
    let reduced_stiffness = CsrMatrix::from(&reduced_triplets);

    let mut reduced_loads: DVector<f64> = DVector::zeros(n_free);
    for dof in 0..n_dofs {
        if !fixed[dof] {
            reduced_loads[free_index[dof]] = loads[dof];
        }
    }

    info!("solving reduced system with {} degrees of freedom", n_free);
    let start = std::time::Instant::now();

    let free_solution = run_conjugate_gradient(&reduced_stiffness, &reduced_loads)?;

    let elapsed = (std::time::Instant::now() - start).as_secs_f32();
    info!("solved system in {:.3} seconds", elapsed);

    let mut displacements: DVector<f64> = DVector::zeros(n_dofs);
    for dof in 0..n_dofs {
        if !fixed[dof] {
            displacements[dof] = free_solution[free_index[dof]];
        }
    }

    Ok(displacements)
}

/// Calculates the per-element equivalent stress from the displacement
/// solution. The scalar is sqrt(3 (sxx^2 + syy^2 + 2 sxy^2)), the inner
/// product of the stress tensor with itself scaled by 3.
///
/// # Arguments
/// * `mesh` - The solved mesh
/// * `displacements` - The full nodal displacement vector
/// * `material` - The material model
///
/// # Returns
/// One equivalent stress value per element
fn compute_stress(
    mesh: &Mesh,
    displacements: &DVector<f64>,
    material: &MaterialModel,
) -> Vec<f64> {
    let constitutive_mat = compute_constitutive_matrix(material);
    let mut von_mises: Vec<f64> = Vec::with_capacity(mesh.elements.len());

    for element in &mesh.elements {
        let [n0, n1, n2] = element.nodes;
        let nodal_displacements: SMatrix<f64, { DOF * 3 }, 1> = SMatrix::from([
            displacements[n0 * DOF],
            displacements[n0 * DOF + 1],
            displacements[n1 * DOF],
            displacements[n1 * DOF + 1],
            displacements[n2 * DOF],
            displacements[n2 * DOF + 1],
        ]);

        let element_area = compute_element_area(element, &mesh.nodes);
        let stress = constitutive_mat
            * compute_strain_displacement_matrix(element, &mesh.nodes, element_area)
            * nodal_displacements;

        let inner_product =
            f64::powi(stress[0], 2) + f64::powi(stress[1], 2) + 2.0 * f64::powi(stress[2], 2);
        von_mises.push(f64::sqrt(3.0 * inner_product));
    }

    von_mises
}

/// Runs the solver
///
/// Assembles the linear-elastic stiffness operator, pins the left edge,
/// applies the right-edge traction, solves the reduced sparse system, and
/// recovers the deformation and equivalent stress fields.
///
/// # Arguments
/// * `mesh` - The mesh to solve; the result takes ownership of it
/// * `material` - The material model
/// * `load_magnitude` - Total traction magnitude over the right edge
///
/// # Returns
/// The solve result, or a Solver error if the system could not be solved
pub fn run(
    mesh: Mesh,
    material: &MaterialModel,
    load_magnitude: f64,
) -> Result<SolveResult, BeamSolverError> {
    info!("building global stiffness matrix...");
    let stiffness = assemble_stiffness_matrix(&mesh, material);

    let loads = assemble_traction_loads(&mesh, load_magnitude)?;

    let displacements = solve_displacements(&mesh, &stiffness, &loads)?;

    let von_mises = compute_stress(&mesh, &displacements, material);

    let deformation: Vec<[f64; 3]> = (0..mesh.nodes.len())
        .map(|i| [displacements[i * DOF], displacements[i * DOF + 1], 0.0])
        .collect();

    info!("solve complete");

    Ok(SolveResult {
        mesh,
        deformation,
        von_mises,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::BeamParameters;
    use crate::mesher;
    use approx::assert_relative_eq;

    fn solve_default_beam(load_magnitude: f64) -> SolveResult {
        let mesh = mesher::run(&BeamParameters::default()).unwrap();
        run(mesh, &MaterialModel::structural_steel(), load_magnitude).unwrap()
    }

    #[test]
    fn traction_loads_sum_to_the_total_force() {
        let mesh = mesher::run(&BeamParameters::default()).unwrap();
        let loads = assemble_traction_loads(&mesh, EDGE_LOAD_MAGNITUDE).unwrap();

        let total_fy: f64 = (0..mesh.nodes.len()).map(|i| loads[i * DOF + 1]).sum();
        let total_fx: f64 = (0..mesh.nodes.len()).map(|i| loads[i * DOF]).sum();

        assert_relative_eq!(total_fy, -EDGE_LOAD_MAGNITUDE, max_relative = 1e-12);
        assert_relative_eq!(total_fx, 0.0);
    }

    #[test]
    fn traction_loads_only_touch_right_edge_nodes() {
        let mesh = mesher::run(&BeamParameters::default()).unwrap();
        let loads = assemble_traction_loads(&mesh, EDGE_LOAD_MAGNITUDE).unwrap();

        for (i, _node) in mesh.nodes.iter().enumerate() {
            if !mesh.right_nodes.contains(&i) {
                assert_eq!(loads[i * DOF], 0.0);
                assert_eq!(loads[i * DOF + 1], 0.0);
            }
        }
    }

    #[test]
    fn left_edge_stays_pinned() {
        let result = solve_default_beam(EDGE_LOAD_MAGNITUDE);

        for &node in &result.mesh.left_nodes {
            assert_eq!(result.deformation[node], [0.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn beam_tip_deflects_downward() {
        let result = solve_default_beam(EDGE_LOAD_MAGNITUDE);

        let mean_tip_uy: f64 = result
            .mesh
            .right_nodes
            .iter()
            .map(|&node| result.deformation[node][1])
            .sum::<f64>()
            / result.mesh.right_nodes.len() as f64;

        assert!(mean_tip_uy < 0.0, "tip moved up: {mean_tip_uy}");
    }

    #[test]
    fn deformation_is_zero_extended_to_three_components() {
        let result = solve_default_beam(EDGE_LOAD_MAGNITUDE);

        assert_eq!(result.deformation.len(), result.mesh.nodes.len());
        for deformation in &result.deformation {
            assert_eq!(deformation[2], 0.0);
        }
    }

    #[test]
    fn equivalent_stress_is_finite_and_non_negative() {
        let result = solve_default_beam(EDGE_LOAD_MAGNITUDE);

        assert_eq!(result.von_mises.len(), result.mesh.elements.len());
        for &stress in &result.von_mises {
            assert!(stress.is_finite());
            assert!(stress >= 0.0);
        }
    }

    #[test]
    fn solve_is_deterministic() {
        let first = solve_default_beam(EDGE_LOAD_MAGNITUDE);
        let second = solve_default_beam(EDGE_LOAD_MAGNITUDE);

        assert_eq!(first, second);
    }

    #[test]
    fn doubling_the_load_doubles_the_displacement() {
        let single = solve_default_beam(EDGE_LOAD_MAGNITUDE);
        let double = solve_default_beam(2.0 * EDGE_LOAD_MAGNITUDE);

        let max_magnitude = |result: &SolveResult| {
            result
                .deformation
                .iter()
                .map(|u| f64::sqrt(u[0] * u[0] + u[1] * u[1]))
                .fold(0.0, f64::max)
        };

        let single_max = max_magnitude(&single);
        let double_max = max_magnitude(&double);

        assert!(single_max > 0.0);
        assert_relative_eq!(double_max, 2.0 * single_max, max_relative = 1e-6);
    }

    #[test]
    fn constitutive_matrix_matches_the_lame_form() {
        let material = MaterialModel::structural_steel();
        let d = compute_constitutive_matrix(&material);
        let lambda = material.lame_lambda();
        let mu = material.shear_modulus();

        assert_relative_eq!(d[(0, 0)], lambda + 2.0 * mu);
        assert_relative_eq!(d[(0, 1)], lambda);
        assert_relative_eq!(d[(2, 2)], mu);
        assert_relative_eq!(d[(0, 2)], 0.0);
    }
}
