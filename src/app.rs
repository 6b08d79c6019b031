use std::path::PathBuf;

use iced::widget::canvas::{self, Canvas};
use iced::widget::{button, column, container, row, slider, text, text_input, Space};
use iced::{Alignment, Color, Element, Length, Padding, Task, Theme};
use log::{error, warn};

use crate::datatypes::{BeamParameters, MaterialModel, SolveResult};
use crate::error::BeamSolverError;
use crate::session::{self, AppState};
use crate::viewer::{
    RenderState, StressScene, DEFORMATION_SCALE_DEFAULT, DEFORMATION_SCALE_MAX,
    DEFORMATION_SCALE_MIN, DEFORMATION_SCALE_STEP,
};
use crate::{mesher, solver};

// Fixed application palette
const PRIMARY: Color = Color { r: 0.051, g: 0.278, b: 0.631, a: 1.0 }; // #0D47A1
const SECONDARY: Color = Color { r: 0.565, g: 0.792, b: 0.976, a: 1.0 }; // #90CAF9
const ACCENT: Color = Color { r: 1.0, g: 0.596, b: 0.0, a: 1.0 }; // #FF9800
const DARK: Color = Color { r: 0.129, g: 0.129, b: 0.129, a: 1.0 }; // #212121
const POSITIVE: Color = Color { r: 0.180, g: 0.490, b: 0.196, a: 1.0 }; // #2E7D32
const NEGATIVE: Color = Color { r: 0.776, g: 0.157, b: 0.157, a: 1.0 }; // #C62828
const INFO: Color = Color { r: 0.008, g: 0.533, b: 0.820, a: 1.0 }; // #0288D1
const WARNING: Color = Color { r: 0.961, g: 0.486, b: 0.0, a: 1.0 }; // #F57C00

pub struct App {
    // Input fields
    length_input: String,
    width_input: String,
    input_error: Option<String>,

    // Visualization
    deformation_scale: f64,
    render_state: Option<RenderState>,
    scene_cache: canvas::Cache,

    // Solve lifecycle
    solving: bool,
    solution: Option<SolveResult>,
    snapshot_path: PathBuf,

    // Status line
    status: String,
    status_color: Color,
}

#[derive(Debug, Clone)]
pub enum Message {
    LengthChanged(String),
    WidthChanged(String),
    RunSolve,
    SolveFinished(Result<SolveResult, BeamSolverError>),
    DeformationScaleChanged(f64),
    SaveState,
    LoadState,
}

impl App {
    fn bare(initial: BeamParameters) -> App {
        App {
            length_input: format!("{}", initial.length),
            width_input: format!("{}", initial.width),
            input_error: None,
            deformation_scale: DEFORMATION_SCALE_DEFAULT,
            render_state: None,
            scene_cache: canvas::Cache::default(),
            solving: false,
            solution: None,
            snapshot_path: PathBuf::from(session::SOLUTION_SNAPSHOT_FILE),
            status: "Ready".to_string(),
            status_color: INFO,
        }
    }

    /// Builds the initial application state, restoring the cached
    /// solution from the previous session if one exists.
    pub fn boot(initial: BeamParameters) -> (App, Task<Message>) {
        let mut app = App::bare(initial);

        match session::load_solution(&app.snapshot_path) {
            Ok(Some(result)) => match RenderState::build(&result, app.deformation_scale) {
                Ok(state) => {
                    app.status = format!(
                        "Restored cached solution ({} nodes, {} elements)",
                        result.mesh.nodes.len(),
                        result.mesh.elements.len()
                    );
                    app.render_state = Some(state);
                    app.solution = Some(result);
                }
                Err(err) => {
                    error!("could not draw cached solution: {err}");
                    app.status = format!("Cached solution could not be drawn: {err}");
                    app.status_color = WARNING;
                }
            },
            Ok(None) => {}
            Err(err) => {
                warn!("ignoring solution snapshot: {err}");
            }
        }

        (app, Task::none())
    }

    pub fn window_title(&self) -> String {
        if self.solving {
            "Beam Solver - solving...".to_string()
        } else {
            "Beam Solver".to_string()
        }
    }

    pub fn theme(&self) -> Theme {
        Theme::custom(
            "Beam Solver".to_string(),
            iced::theme::Palette {
                primary: PRIMARY,
                success: POSITIVE,
                danger: NEGATIVE,
                text: DARK,
                ..Theme::Light.palette()
            },
        )
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::LengthChanged(value) => {
                self.length_input = value;
                self.input_error = None;
            }
            Message::WidthChanged(value) => {
                self.width_input = value;
                self.input_error = None;
            }

            Message::RunSolve => {
                // one solve at a time; further clicks are dropped
                if self.solving {
                    return Task::none();
                }

                match BeamParameters::parse(&self.length_input, &self.width_input) {
                    Err(err) => {
                        self.input_error = Some(err.to_string());
                    }
                    Ok(params) => {
                        self.input_error = None;
                        self.solving = true;
                        self.status =
                            format!("Solving {} x {} beam...", params.length, params.width);
                        self.status_color = INFO;

                        let material = MaterialModel::structural_steel();
                        return Task::perform(
                            async move {
                                mesher::run(&params).and_then(|mesh| {
                                    solver::run(mesh, &material, solver::EDGE_LOAD_MAGNITUDE)
                                })
                            },
                            Message::SolveFinished,
                        );
                    }
                }
            }

            Message::SolveFinished(Ok(result)) => {
                self.solving = false;

                if let Err(err) = session::store_solution(&result, &self.snapshot_path) {
                    warn!("could not persist solution: {err}");
                }

                match RenderState::build(&result, self.deformation_scale) {
                    Ok(state) => {
                        self.status = format!(
                            "Solved: {} nodes, {} elements",
                            result.mesh.nodes.len(),
                            result.mesh.elements.len()
                        );
                        self.status_color = POSITIVE;
                        self.render_state = Some(state);
                    }
                    Err(err) => {
                        error!("could not draw solution: {err}");
                        self.status = format!("Solve finished but could not be drawn: {err}");
                        self.status_color = WARNING;
                        self.render_state = None;
                    }
                }

                self.solution = Some(result);
                self.scene_cache.clear();
            }

            Message::SolveFinished(Err(err)) => {
                // the previously cached solution and its rendering stay up
                self.solving = false;
                self.status = err.to_string();
                self.status_color = NEGATIVE;
            }

            Message::DeformationScaleChanged(value) => {
                self.deformation_scale = value;
                if let Some(state) = &mut self.render_state {
                    state.set_deformation_scale(value);
                    self.scene_cache.clear();
                }
            }

            Message::SaveState => {
                if let Some(path) = rfd::FileDialog::new()
                    .set_title("Save Application State")
                    .set_file_name("beam_solver_state.json")
                    .add_filter("Beam Solver State", &["json"])
                    .save_file()
                {
                    let state = AppState {
                        length: self.length_input.clone(),
                        width: self.width_input.clone(),
                        deformation_scale: self.deformation_scale,
                    };
                    match session::save_app_state(&state, &path) {
                        Ok(()) => {
                            self.status = format!("Saved state to {}", path.display());
                            self.status_color = POSITIVE;
                        }
                        Err(err) => {
                            self.status = err.to_string();
                            self.status_color = NEGATIVE;
                        }
                    }
                }
            }

            Message::LoadState => {
                if let Some(path) = rfd::FileDialog::new()
                    .set_title("Open Application State")
                    .add_filter("Beam Solver State", &["json"])
                    .pick_file()
                {
                    match session::load_app_state(&path) {
                        Ok(state) => {
                            self.length_input = state.length;
                            self.width_input = state.width;
                            self.deformation_scale = state.deformation_scale;
                            self.input_error = None;
                            if let Some(render) = &mut self.render_state {
                                render.set_deformation_scale(state.deformation_scale);
                                self.scene_cache.clear();
                            }
                            self.status = format!("Loaded state from {}", path.display());
                            self.status_color = POSITIVE;
                        }
                        Err(err) => {
                            self.status = err.to_string();
                            self.status_color = NEGATIVE;
                        }
                    }
                }
            }
        }

        Task::none()
    }

    pub fn view(&self) -> Element<'_, Message> {
        let toolbar = container(
            row![
                text("Beam Solver").size(22).color(Color::WHITE),
                Space::new().width(Length::Fill),
                button(text("Save").size(12))
                    .on_press(Message::SaveState)
                    .style(button::secondary)
                    .padding(Padding::from([4, 8])),
                button(text("Open").size(12))
                    .on_press(Message::LoadState)
                    .style(button::secondary)
                    .padding(Padding::from([4, 8])),
            ]
            .spacing(8)
            .align_y(Alignment::Center),
        )
        .style(|_theme| container::Style {
            background: Some(PRIMARY.into()),
            ..container::Style::default()
        })
        .padding(Padding::from([8, 12]))
        .width(Length::Fill);

        let mut inputs = column![
            column![
                text("Length (m)").size(11).color(DARK),
                text_input("5", &self.length_input)
                    .on_input(Message::LengthChanged)
                    .width(Length::Fixed(200.0)),
            ]
            .spacing(2),
            column![
                text("Width (m)").size(11).color(DARK),
                text_input("3", &self.width_input)
                    .on_input(Message::WidthChanged)
                    .width(Length::Fixed(200.0)),
            ]
            .spacing(2),
        ]
        .spacing(8);

        if let Some(error) = &self.input_error {
            inputs = inputs.push(text(error.clone()).size(11).color(NEGATIVE));
        }

        let run_button = button(
            text(if self.solving { "Solving..." } else { "Run" }).size(14),
        )
        .on_press_maybe((!self.solving).then_some(Message::RunSolve))
        .style(button::success)
        .padding(Padding::from([6, 18]));

        let controls = column![
            run_button,
            text(format!("Deformation Scale: {:.1e}", self.deformation_scale))
                .size(11)
                .color(ACCENT),
            slider(
                DEFORMATION_SCALE_MIN..=DEFORMATION_SCALE_MAX,
                self.deformation_scale,
                Message::DeformationScaleChanged,
            )
            .step(DEFORMATION_SCALE_STEP)
            .width(Length::Fixed(300.0)),
        ]
        .spacing(8);

        let card = container(
            row![inputs, Space::new().width(Length::Fill), controls]
                .spacing(16)
                .align_y(Alignment::Center),
        )
        .padding(12)
        .width(Length::Fill);

        let scene: Element<'_, Message> = match &self.render_state {
            Some(state) => Canvas::new(StressScene {
                state,
                cache: &self.scene_cache,
            })
            .width(Length::Fill)
            .height(Length::Fill)
            .into(),
            None => container(
                text("Run a solve to see the deformed beam")
                    .size(14)
                    .color(DARK),
            )
            .width(Length::Fill)
            .height(Length::Fill)
            .padding(40)
            .into(),
        };

        let viewport = container(scene)
            .style(|_theme| container::Style {
                border: iced::Border {
                    color: SECONDARY,
                    width: 1.0,
                    radius: 5.0.into(),
                },
                ..container::Style::default()
            })
            .width(Length::Fill)
            .height(Length::Fill)
            .padding(4);

        let status_bar = container(
            text(self.status.clone())
                .size(11)
                .color(self.status_color),
        )
        .padding(Padding::from([4, 12]));

        column![toolbar, card, viewport, status_bar]
            .spacing(4)
            .into()
    }
}
