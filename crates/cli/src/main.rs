use std::env;
use std::error::Error;
use std::fs;
use std::process::ExitCode;

use engine::{Command, TimelineDocument, apply, interchange};
use tracing::info;

fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let [timeline_path, commands_path, output_path] = args.as_slice() else {
        eprintln!("usage: cli <timeline.json|new> <commands.json> <output.json>");
        return ExitCode::FAILURE;
    };

    match run(timeline_path, commands_path, output_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(timeline_path: &str, commands_path: &str, output_path: &str) -> Result<(), Box<dyn Error>> {
    let mut doc = if timeline_path == "new" {
        TimelineDocument::default_document()
    } else {
        interchange::parse_document(&fs::read_to_string(timeline_path)?)
    };

    let commands: Vec<Command> = serde_json::from_str(&fs::read_to_string(commands_path)?)?;
    info!(command_count = commands.len(), "applying command batch");
    for (index, command) in commands.iter().enumerate() {
        doc = apply(&doc, command).map_err(|error| format!("command {index}: {error}"))?;
    }

    fs::write(output_path, interchange::to_json(&doc))?;
    info!(output_path, "timeline written");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}
