use iced::widget::canvas::{self, Frame, Geometry, Path, Stroke, Text};
use iced::{mouse, Color, Point, Rectangle, Renderer, Theme};
use log::warn;

use crate::{datatypes::SolveResult, error::BeamSolverError};

pub const DEFORMATION_SCALE_MIN: f64 = 0.0;
pub const DEFORMATION_SCALE_MAX: f64 = 1e5;
pub const DEFORMATION_SCALE_STEP: f64 = 1e3;
pub const DEFORMATION_SCALE_DEFAULT: f64 = 1e5;

/// Five-anchor approximation of the viridis colormap.
const VIRIDIS: [[f32; 3]; 5] = [
    [0.267, 0.005, 0.329], // #440154
    [0.231, 0.322, 0.545], // #3B528B
    [0.129, 0.569, 0.549], // #21918C
    [0.369, 0.788, 0.384], // #5EC962
    [0.993, 0.906, 0.145], // #FDE725
];

/// Maps a normalized value in [0, 1] onto the viridis colormap
pub fn viridis(t: f64) -> Color {
    let t = t.clamp(0.0, 1.0) as f32;
    let scaled = t * (VIRIDIS.len() - 1) as f32;
    let idx = usize::min(scaled.floor() as usize, VIRIDIS.len() - 2);
    let frac = scaled - idx as f32;

    let low = VIRIDIS[idx];
    let high = VIRIDIS[idx + 1];

    Color::from_rgb(
        low[0] + frac * (high[0] - low[0]),
        low[1] + frac * (high[1] - low[1]),
        low[2] + frac * (high[2] - low[2]),
    )
}

/// The drawable snapshot of one solve: vertex positions, deformation
/// vectors, per-element stress values, and the current visual
/// deformation scale. Rebuilt in full on every solve; a slider move only
/// mutates `deformation_scale`.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    positions: Vec<[f64; 2]>,
    deformation: Vec<[f64; 3]>,
    triangles: Vec<[usize; 3]>,
    stress: Vec<f64>,
    stress_min: f64,
    stress_max: f64,
    deformation_scale: f64,
}

impl RenderState {
    /// Builds render data from a solve result
    ///
    /// # Arguments
    /// * `result` - The solve result to visualize
    /// * `deformation_scale` - The visual deformation multiplier
    ///
    /// # Returns
    /// The render state, or a Render error for malformed field data
    pub fn build(
        result: &SolveResult,
        deformation_scale: f64,
    ) -> Result<RenderState, BeamSolverError> {
        if result.deformation.len() != result.mesh.nodes.len() {
            return Err(BeamSolverError::Render(format!(
                "deformation field has {} entries for {} nodes",
                result.deformation.len(),
                result.mesh.nodes.len()
            )));
        }
        if result.von_mises.len() != result.mesh.elements.len() {
            return Err(BeamSolverError::Render(format!(
                "stress field has {} entries for {} elements",
                result.von_mises.len(),
                result.mesh.elements.len()
            )));
        }
        if result.mesh.elements.is_empty() {
            return Err(BeamSolverError::Render("mesh has no elements".to_owned()));
        }

        let mut stress_min = f64::MAX;
        let mut stress_max = f64::MIN;
        for &stress in &result.von_mises {
            if !stress.is_finite() {
                return Err(BeamSolverError::Render(format!(
                    "non-finite stress value {stress}"
                )));
            }
            stress_min = stress_min.min(stress);
            stress_max = stress_max.max(stress);
        }

        Ok(RenderState {
            positions: result
                .mesh
                .nodes
                .iter()
                .map(|n| [n.vertex.x, n.vertex.y])
                .collect(),
            deformation: result.deformation.clone(),
            triangles: result.mesh.elements.iter().map(|e| e.nodes).collect(),
            stress: result.von_mises.clone(),
            stress_min,
            stress_max,
            deformation_scale,
        })
    }

    /// The fast path for slider moves: no field data is rebuilt.
    pub fn set_deformation_scale(&mut self, scale: f64) {
        self.deformation_scale = scale;
    }

    pub fn deformation_scale(&self) -> f64 {
        self.deformation_scale
    }

    pub fn stress(&self) -> &[f64] {
        &self.stress
    }

    pub fn stress_range(&self) -> (f64, f64) {
        (self.stress_min, self.stress_max)
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Vertex positions displaced by deformation x scale, projected onto
    /// the XY plane.
    fn deformed_positions(&self) -> Vec<[f64; 2]> {
        self.positions
            .iter()
            .zip(&self.deformation)
            .map(|(p, u)| {
                [
                    p[0] + self.deformation_scale * u[0],
                    p[1] + self.deformation_scale * u[1],
                ]
            })
            .collect()
    }

    fn normalized_stress(&self, element: usize) -> f64 {
        let span = self.stress_max - self.stress_min;
        if span <= 0.0 {
            return 0.5;
        }
        (self.stress[element] - self.stress_min) / span
    }
}

/// Canvas program composing the colored surface, the wireframe overlay,
/// and the colorbar into one scene.
pub struct StressScene<'a> {
    pub state: &'a RenderState,
    pub cache: &'a canvas::Cache,
}

impl<'a, Message> canvas::Program<Message> for StressScene<'a> {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let geometry = self.cache.draw(renderer, bounds.size(), |frame| {
            draw_scene(self.state, frame);
        });

        vec![geometry]
    }
}

const MARGIN: f32 = 24.0;
const COLORBAR_WIDTH: f32 = 16.0;
const COLORBAR_GUTTER: f32 = 88.0;
const COLORBAR_STRIPS: usize = 48;

fn draw_scene(state: &RenderState, frame: &mut Frame) {
    let plot_width = frame.width() - 2.0 * MARGIN - COLORBAR_GUTTER;
    let plot_height = frame.height() - 2.0 * MARGIN;
    if plot_width <= 0.0 || plot_height <= 0.0 {
        warn!("viewport too small to draw the scene");
        return;
    }

    let deformed = state.deformed_positions();

    let mut min_x = f64::MAX;
    let mut max_x = f64::MIN;
    let mut min_y = f64::MAX;
    let mut max_y = f64::MIN;
    for p in &deformed {
        min_x = min_x.min(p[0]);
        max_x = max_x.max(p[0]);
        min_y = min_y.min(p[1]);
        max_y = max_y.max(p[1]);
    }

    let span_x = f64::max(max_x - min_x, 1e-12);
    let span_y = f64::max(max_y - min_y, 1e-12);
    let scale = f64::min(plot_width as f64 / span_x, plot_height as f64 / span_y);

    // center the deformed mesh in the plot area, y axis up
    let offset_x = MARGIN as f64 + (plot_width as f64 - span_x * scale) / 2.0;
    let offset_y = MARGIN as f64 + (plot_height as f64 - span_y * scale) / 2.0;
    let to_screen = |p: &[f64; 2]| {
        Point::new(
            (offset_x + (p[0] - min_x) * scale) as f32,
            (offset_y + (max_y - p[1]) * scale) as f32,
        )
    };

    let wire_color = Color::from_rgba(0.129, 0.129, 0.129, 0.6); // #212121

    // Colored surface
    for (element, tri) in state.triangles.iter().enumerate() {
        let color = viridis(state.normalized_stress(element));
        let p0 = to_screen(&deformed[tri[0]]);
        let p1 = to_screen(&deformed[tri[1]]);
        let p2 = to_screen(&deformed[tri[2]]);

        let surface = Path::new(|builder| {
            builder.move_to(p0);
            builder.line_to(p1);
            builder.line_to(p2);
            builder.close();
        });
        frame.fill(&surface, color);
    }

    // Wireframe overlay
    for tri in &state.triangles {
        let p0 = to_screen(&deformed[tri[0]]);
        let p1 = to_screen(&deformed[tri[1]]);
        let p2 = to_screen(&deformed[tri[2]]);

        let outline = Path::new(|builder| {
            builder.move_to(p0);
            builder.line_to(p1);
            builder.line_to(p2);
            builder.close();
        });
        frame.stroke(
            &outline,
            Stroke::default().with_color(wire_color).with_width(0.5),
        );
    }

    draw_colorbar(state, frame);
}

fn draw_colorbar(state: &RenderState, frame: &mut Frame) {
    let bar_x = frame.width() - MARGIN - COLORBAR_GUTTER + 8.0;
    let bar_top = MARGIN;
    let bar_height = frame.height() - 2.0 * MARGIN;
    let strip_height = bar_height / COLORBAR_STRIPS as f32;
    let (stress_min, stress_max) = state.stress_range();

    // highest stress at the top
    for strip in 0..COLORBAR_STRIPS {
        let t = 1.0 - (strip as f64 + 0.5) / COLORBAR_STRIPS as f64;
        let y = bar_top + strip as f32 * strip_height;

        let swatch = Path::rectangle(
            Point::new(bar_x, y),
            iced::Size::new(COLORBAR_WIDTH, strip_height + 0.5),
        );
        frame.fill(&swatch, viridis(t));
    }

    let outline = Path::rectangle(
        Point::new(bar_x, bar_top),
        iced::Size::new(COLORBAR_WIDTH, bar_height),
    );
    frame.stroke(
        &outline,
        Stroke::default()
            .with_color(Color::from_rgb(0.129, 0.129, 0.129))
            .with_width(1.0),
    );

    let label_color = Color::from_rgb(0.129, 0.129, 0.129);
    frame.fill_text(Text {
        content: format!("{:.2e}", stress_max),
        position: Point::new(bar_x + COLORBAR_WIDTH + 4.0, bar_top),
        color: label_color,
        size: iced::Pixels(10.0),
        ..Text::default()
    });
    frame.fill_text(Text {
        content: format!("{:.2e}", stress_min),
        position: Point::new(bar_x + COLORBAR_WIDTH + 4.0, bar_top + bar_height - 10.0),
        color: label_color,
        size: iced::Pixels(10.0),
        ..Text::default()
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::BeamParameters;
    use crate::{mesher, solver};
    use approx::assert_relative_eq;

    fn solved_beam() -> SolveResult {
        let mesh = mesher::run(&BeamParameters::default()).unwrap();
        solver::run(
            mesh,
            &crate::datatypes::MaterialModel::structural_steel(),
            solver::EDGE_LOAD_MAGNITUDE,
        )
        .unwrap()
    }

    #[test]
    fn build_mirrors_the_solve_result() {
        let result = solved_beam();
        let state = RenderState::build(&result, DEFORMATION_SCALE_DEFAULT).unwrap();

        assert_eq!(state.vertex_count(), result.mesh.nodes.len());
        assert_eq!(state.triangle_count(), result.mesh.elements.len());
        assert_eq!(state.stress(), result.von_mises.as_slice());
    }

    #[test]
    fn build_rejects_mismatched_fields() {
        let mut result = solved_beam();
        result.deformation.pop();

        assert!(matches!(
            RenderState::build(&result, DEFORMATION_SCALE_DEFAULT),
            Err(BeamSolverError::Render(_))
        ));
    }

    #[test]
    fn build_rejects_non_finite_stress() {
        let mut result = solved_beam();
        result.von_mises[0] = f64::NAN;

        assert!(matches!(
            RenderState::build(&result, DEFORMATION_SCALE_DEFAULT),
            Err(BeamSolverError::Render(_))
        ));
    }

    #[test]
    fn scale_change_leaves_field_data_untouched() {
        let result = solved_beam();
        let mut state = RenderState::build(&result, DEFORMATION_SCALE_DEFAULT).unwrap();

        let stress_before = state.stress().to_vec();
        let range_before = state.stress_range();
        let triangles_before = state.triangle_count();

        state.set_deformation_scale(5e3);

        assert_eq!(state.deformation_scale(), 5e3);
        assert_eq!(state.stress(), stress_before.as_slice());
        assert_eq!(state.stress_range(), range_before);
        assert_eq!(state.triangle_count(), triangles_before);
    }

    #[test]
    fn scale_change_moves_deformed_positions_only() {
        let result = solved_beam();
        let mut state = RenderState::build(&result, 0.0).unwrap();

        // scale zero draws the undeformed shape
        let undeformed = state.deformed_positions();
        for (p, n) in undeformed.iter().zip(&result.mesh.nodes) {
            assert_relative_eq!(p[0], n.vertex.x);
            assert_relative_eq!(p[1], n.vertex.y);
        }

        state.set_deformation_scale(DEFORMATION_SCALE_MAX);
        let deformed = state.deformed_positions();
        let moved = deformed
            .iter()
            .zip(&undeformed)
            .any(|(a, b)| a[0] != b[0] || a[1] != b[1]);
        assert!(moved);
    }

    #[test]
    fn viridis_spans_dark_purple_to_yellow() {
        let low = viridis(0.0);
        let high = viridis(1.0);

        assert_relative_eq!(low.r, 0.267, max_relative = 1e-3);
        assert_relative_eq!(low.b, 0.329, max_relative = 1e-3);
        assert_relative_eq!(high.r, 0.993, max_relative = 1e-3);
        assert_relative_eq!(high.g, 0.906, max_relative = 1e-3);

        // out-of-range values clamp
        assert_eq!(viridis(-1.0), viridis(0.0));
        assert_eq!(viridis(2.0), viridis(1.0));
    }

    #[test]
    fn uniform_stress_normalizes_to_midscale() {
        let mut result = solved_beam();
        for stress in result.von_mises.iter_mut() {
            *stress = 42.0;
        }

        let state = RenderState::build(&result, DEFORMATION_SCALE_DEFAULT).unwrap();
        assert_relative_eq!(state.normalized_stress(0), 0.5);
    }
}
