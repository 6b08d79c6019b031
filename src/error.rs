use std::fmt::Display;

#[derive(Debug, Clone, PartialEq)]
pub enum BeamSolverError {
    Input(String),
    Mesher(String),
    Solver(String),
    Render(String),
}

impl Display for BeamSolverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (err_name, value) = match self {
            BeamSolverError::Input(v) => ("Input", v),
            BeamSolverError::Mesher(v) => ("Mesher", v),
            BeamSolverError::Solver(v) => ("Solver", v),
            BeamSolverError::Render(v) => ("Render", v),
        };

        write!(f, "{} error: {}", err_name, value)
    }
}
