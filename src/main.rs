use clap::Parser;

mod app;
mod datatypes;
mod error;
mod mesher;
mod session;
mod solver;
mod viewer;

use datatypes::{BeamParameters, MaterialModel};

#[derive(Parser)]
#[command(name = "beam-solver", about = "Interactive 2D beam elasticity solver")]
struct Cli {
    /// Initial beam length in meters
    #[arg(long)]
    length: Option<f64>,

    /// Initial beam width in meters
    #[arg(long)]
    width: Option<f64>,

    /// Mesh, solve, and snapshot the solution without opening a window
    #[arg(long)]
    headless: bool,
}

fn main() -> iced::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let defaults = BeamParameters::default();
    let initial = BeamParameters {
        length: cli.length.unwrap_or(defaults.length),
        width: cli.width.unwrap_or(defaults.width),
    };

    if cli.headless {
        run_headless(&initial);
        return Ok(());
    }

    iced::application(
        move || app::App::boot(initial),
        app::App::update,
        app::App::view,
    )
    .title(app::App::window_title)
    .theme(app::App::theme)
    .window_size((1100.0, 760.0))
    .run()
}

/// Runs mesh -> solve -> snapshot as a plain pipeline, for scripting.
fn run_headless(params: &BeamParameters) {
    let outcome = params
        .validate()
        .and_then(|_| mesher::run(params))
        .and_then(|mesh| {
            solver::run(
                mesh,
                &MaterialModel::structural_steel(),
                solver::EDGE_LOAD_MAGNITUDE,
            )
        })
        .and_then(|result| {
            session::store_solution(
                &result,
                std::path::Path::new(session::SOLUTION_SNAPSHOT_FILE),
            )
            .map(|_| result)
        });

    match outcome {
        Ok(result) => {
            let max_displacement = result
                .deformation
                .iter()
                .map(|u| f64::sqrt(u[0] * u[0] + u[1] * u[1]))
                .fold(0.0, f64::max);
            let max_stress = result.von_mises.iter().copied().fold(0.0, f64::max);
            log::info!(
                "max displacement {:.3e} m, max equivalent stress {:.3e} Pa",
                max_displacement,
                max_stress
            );
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
