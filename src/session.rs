use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use log::info;

use crate::{datatypes::SolveResult, error::BeamSolverError};

/// Default location of the automatic solution cache, next to the process
/// working directory like the solver's other artifacts.
pub const SOLUTION_SNAPSHOT_FILE: &str = "beam_solver.solution";

const SNAPSHOT_MAGIC: [u8; 4] = *b"BSOL";
const SNAPSHOT_VERSION: u32 = 1;

/// Persists a solve result as the session's current solution
///
/// The snapshot is a binary container: a 4-byte magic, a format version,
/// and the bincode-encoded result. It is written to a temporary sibling
/// and renamed over the target so a reader never observes a partial
/// write.
///
/// # Arguments
/// * `result` - The solve result to persist
/// * `path` - The snapshot file location
pub fn store_solution(result: &SolveResult, path: &Path) -> Result<(), BeamSolverError> {
    let tmp_path = path.with_extension("tmp");

    let mut file = match File::create(&tmp_path) {
        Ok(f) => f,
        Err(err) => {
            return Err(BeamSolverError::Input(format!(
                "unable to create snapshot file {}: {err}",
                tmp_path.display()
            )))
        }
    };

    file.write_all(&SNAPSHOT_MAGIC)
        .and_then(|_| file.write_all(&SNAPSHOT_VERSION.to_le_bytes()))
        .map_err(|err| {
            BeamSolverError::Input(format!("unable to write snapshot header: {err}"))
        })?;

    bincode::serialize_into(&mut file, result)
        .map_err(|err| BeamSolverError::Input(format!("unable to encode solution: {err}")))?;

    std::fs::rename(&tmp_path, path).map_err(|err| {
        BeamSolverError::Input(format!(
            "unable to move snapshot into place at {}: {err}",
            path.display()
        ))
    })?;

    info!("stored solution snapshot at {}", path.display());

    Ok(())
}

/// Restores the persisted solution, if one exists
///
/// # Arguments
/// * `path` - The snapshot file location
///
/// # Returns
/// The cached solve result, `None` if no snapshot exists, or an Input
/// error for a corrupt or incompatible snapshot
pub fn load_solution(path: &Path) -> Result<Option<SolveResult>, BeamSolverError> {
    if !path.exists() {
        return Ok(None);
    }

    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(err) => {
            return Err(BeamSolverError::Input(format!(
                "unable to open snapshot file {}: {err}",
                path.display()
            )))
        }
    };

    let mut magic = [0u8; 4];
    let mut version_bytes = [0u8; 4];
    file.read_exact(&mut magic)
        .and_then(|_| file.read_exact(&mut version_bytes))
        .map_err(|err| BeamSolverError::Input(format!("truncated snapshot header: {err}")))?;

    if magic != SNAPSHOT_MAGIC {
        return Err(BeamSolverError::Input(
            "file is not a solution snapshot".to_owned(),
        ));
    }

    let version = u32::from_le_bytes(version_bytes);
    if version != SNAPSHOT_VERSION {
        return Err(BeamSolverError::Input(format!(
            "unsupported snapshot version {version}, expected {SNAPSHOT_VERSION}"
        )));
    }

    let result: SolveResult = bincode::deserialize_from(file)
        .map_err(|err| BeamSolverError::Input(format!("unable to decode solution: {err}")))?;

    info!("restored solution snapshot from {}", path.display());

    Ok(Some(result))
}

/// The explicitly saved application state: the raw input fields and the
/// slider value, enough to reproduce the same inputs in a new session.
#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub length: String,
    pub width: String,
    pub deformation_scale: f64,
}

/// Writes the application state as a JSON document
///
/// # Arguments
/// * `state` - The state to save
/// * `path` - The output file location
pub fn save_app_state(state: &AppState, path: &Path) -> Result<(), BeamSolverError> {
    let mut doc = json::JsonValue::new_object();
    doc["length"] = state.length.clone().into();
    doc["width"] = state.width.clone().into();
    doc["deformation_scale"] = state.deformation_scale.into();

    std::fs::write(path, doc.dump()).map_err(|err| {
        BeamSolverError::Input(format!(
            "unable to write state file {}: {err}",
            path.display()
        ))
    })?;

    info!("saved application state to {}", path.display());

    Ok(())
}

/// Parses an application state JSON document
///
/// # Arguments
/// * `path` - The state file to load
///
/// # Returns
/// The restored state, or an Input error describing what is missing
pub fn load_app_state(path: &Path) -> Result<AppState, BeamSolverError> {
    let file_string = match std::fs::read_to_string(path) {
        Ok(f) => f,
        Err(_err) => {
            return Err(BeamSolverError::Input(format!(
                "unable to open state file {}",
                path.display()
            )))
        }
    };

    let doc = match json::parse(&file_string) {
        Ok(f) => f,
        Err(err) => {
            return Err(BeamSolverError::Input(format!(
                "error in state file json: {err}"
            )))
        }
    };

    if !doc.has_key("length") {
        return Err(BeamSolverError::Input(
            "state file missing length field".to_string(),
        ));
    }
    if !doc.has_key("width") {
        return Err(BeamSolverError::Input(
            "state file missing width field".to_string(),
        ));
    }
    if !doc.has_key("deformation_scale") {
        return Err(BeamSolverError::Input(
            "state file missing deformation_scale field".to_string(),
        ));
    }

    let length = doc["length"]
        .as_str()
        .ok_or_else(|| BeamSolverError::Input("bad value for length field".to_string()))?
        .to_owned();
    let width = doc["width"]
        .as_str()
        .ok_or_else(|| BeamSolverError::Input("bad value for width field".to_string()))?
        .to_owned();
    let deformation_scale = doc["deformation_scale"].as_f64().ok_or_else(|| {
        BeamSolverError::Input("bad value for deformation_scale field".to_string())
    })?;

    Ok(AppState {
        length,
        width,
        deformation_scale,
    })
}
